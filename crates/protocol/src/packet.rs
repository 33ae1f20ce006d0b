//! Packet envelope and line-delimited JSON codec

use crate::message::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Payload failed schema validation during decode
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Unrecognized tag or broken envelope
    #[error("Invalid packet: {0}")]
    InvalidPacket(String),
}

/// Wire tag identifying the message kind.
///
/// The numeric values are fixed protocol constants; the tag is
/// redundant with the enum variant but is written on the wire and
/// re-validated on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageTag {
    Response = 0,
    Register = 1,
    Authenticate = 2,
    FrequencyUpdate = 3,
    ScreenFrame = 4,
    EncryptedEnvelope = 5,
    RsaPublicKey = 6,
    KeyTransport = 7,
}

impl MessageTag {
    pub fn from_wire(tag: u8) -> Result<Self, ProtocolError> {
        Ok(match tag {
            0 => MessageTag::Response,
            1 => MessageTag::Register,
            2 => MessageTag::Authenticate,
            3 => MessageTag::FrequencyUpdate,
            4 => MessageTag::ScreenFrame,
            5 => MessageTag::EncryptedEnvelope,
            6 => MessageTag::RsaPublicKey,
            7 => MessageTag::KeyTransport,
            other => {
                return Err(ProtocolError::InvalidPacket(format!(
                    "unknown tag: {other}"
                )));
            }
        })
    }
}

/// JSON shape of one wire unit: `{"tag":<int>,"message":{...}}`
#[derive(Serialize)]
struct EnvelopeRef<'a, T: Serialize> {
    tag: u8,
    message: &'a T,
}

#[derive(Deserialize)]
struct Envelope {
    tag: u8,
    message: serde_json::Value,
}

/// The outermost unit exchanged over the transport.
///
/// Built only through [`Packet::new`], which derives the tag from the
/// message variant, so a packet can never carry a mismatched pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    tag: MessageTag,
    message: Message,
}

impl Packet {
    pub fn new(message: Message) -> Self {
        let tag = match &message {
            Message::Response(_) => MessageTag::Response,
            Message::Register(_) => MessageTag::Register,
            Message::Authenticate(_) => MessageTag::Authenticate,
            Message::FrequencyUpdate(_) => MessageTag::FrequencyUpdate,
            Message::ScreenFrame(_) => MessageTag::ScreenFrame,
            Message::EncryptedEnvelope(_) => MessageTag::EncryptedEnvelope,
            Message::RsaPublicKey(_) => MessageTag::RsaPublicKey,
            Message::KeyTransport(_) => MessageTag::KeyTransport,
        };
        Self { tag, message }
    }

    pub fn tag(&self) -> MessageTag {
        self.tag
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn into_message(self) -> Message {
        self.message
    }

    /// Serialize to one self-describing JSON object.
    ///
    /// The result contains no newline; the framing layer appends the
    /// line delimiter.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        fn write<T: Serialize>(tag: MessageTag, message: &T) -> Result<String, ProtocolError> {
            serde_json::to_string(&EnvelopeRef {
                tag: tag as u8,
                message,
            })
            .map_err(|e| ProtocolError::MalformedMessage(e.to_string()))
        }

        match &self.message {
            Message::Response(m) => write(self.tag, m),
            Message::Register(m) => write(self.tag, m),
            Message::Authenticate(m) => write(self.tag, m),
            Message::FrequencyUpdate(m) => write(self.tag, m),
            Message::ScreenFrame(m) => write(self.tag, m),
            Message::EncryptedEnvelope(m) => write(self.tag, m),
            Message::RsaPublicKey(m) => write(self.tag, m),
            Message::KeyTransport(m) => write(self.tag, m),
        }
    }

    /// Decode exactly one delimited unit (the line, without its
    /// terminator).
    ///
    /// The tag resolves the payload schema; unknown tags fail with
    /// `InvalidPacket`, schema mismatches with `MalformedMessage`.
    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(line.trim_end())
            .map_err(|e| ProtocolError::InvalidPacket(e.to_string()))?;

        let tag = MessageTag::from_wire(envelope.tag)?;

        fn read<T: for<'de> Deserialize<'de>>(
            value: serde_json::Value,
        ) -> Result<T, ProtocolError> {
            serde_json::from_value(value).map_err(|e| ProtocolError::MalformedMessage(e.to_string()))
        }

        let message = match tag {
            MessageTag::Response => Message::Response(read(envelope.message)?),
            MessageTag::Register => Message::Register(read(envelope.message)?),
            MessageTag::Authenticate => Message::Authenticate(read(envelope.message)?),
            MessageTag::FrequencyUpdate => Message::FrequencyUpdate(read(envelope.message)?),
            MessageTag::ScreenFrame => Message::ScreenFrame(read(envelope.message)?),
            MessageTag::EncryptedEnvelope => Message::EncryptedEnvelope(read(envelope.message)?),
            MessageTag::RsaPublicKey => Message::RsaPublicKey(read(envelope.message)?),
            MessageTag::KeyTransport => Message::KeyTransport(read(envelope.message)?),
        };

        let packet = Packet::new(message);

        // Envelope/payload mismatch cannot survive construction, but
        // the wire tag is still re-checked against the derived one.
        if packet.tag != tag {
            return Err(ProtocolError::InvalidPacket(format!(
                "tag {} does not match payload kind {}",
                envelope.tag,
                packet.message.kind()
            )));
        }

        Ok(packet)
    }
}

impl From<Message> for Packet {
    fn from(message: Message) -> Self {
        Packet::new(message)
    }
}
