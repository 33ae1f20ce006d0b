//! Message payloads carried by a [`Packet`](crate::Packet)

use serde::{Deserialize, Serialize};

/// Base64 encoding for binary payload fields.
///
/// Keys, IVs, ciphertext and image bytes travel as standard base64
/// strings inside the JSON payload object.
pub(crate) mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

/// Success/failure reply to a client request
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub success: bool,
    pub message: String,
}

/// Account creation request
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Register {
    pub username: String,
    pub password: String,
}

/// Login request
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Authenticate {
    pub username: String,
    pub password: String,

    /// Opaque client identifier (the original protocol carried a MAC
    /// address here)
    pub client_id: String,
}

/// Capture interval change, pushed by the supervising side
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrequencyUpdate {
    /// New capture period in seconds
    pub seconds: u32,
}

/// One captured screen image
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ScreenFrame {
    #[serde(with = "base64_bytes")]
    pub image: Vec<u8>,

    /// Capture timestamp in milliseconds since Unix epoch
    pub captured_at: u64,
}

/// Opaque wrapper around an encrypted, compressed inner packet.
///
/// During the handshake the ciphertext is RSA-encrypted; afterwards it
/// is the AES-CFB output of the secure channel.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EncryptedEnvelope {
    #[serde(with = "base64_bytes")]
    pub ciphertext: Vec<u8>,
}

/// The accepting side's long-lived RSA public key
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RsaPublicKey {
    /// PKCS#1 RSAPublicKey DER (modulus + exponent)
    #[serde(with = "base64_bytes")]
    pub der: Vec<u8>,
}

/// Fresh symmetric key material, sent RSA-encrypted by the initiator
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct KeyTransport {
    #[serde(with = "base64_bytes")]
    pub key: Vec<u8>,

    #[serde(with = "base64_bytes")]
    pub iv: Vec<u8>,
}

/// The closed set of wire messages.
///
/// Each variant maps to exactly one wire tag; adding a kind means
/// extending this enum and the codec match, never open-ended dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Response(Response),
    Register(Register),
    Authenticate(Authenticate),
    FrequencyUpdate(FrequencyUpdate),
    ScreenFrame(ScreenFrame),
    EncryptedEnvelope(EncryptedEnvelope),
    RsaPublicKey(RsaPublicKey),
    KeyTransport(KeyTransport),
}

impl Message {
    /// Short name for logs and error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Response(_) => "Response",
            Message::Register(_) => "Register",
            Message::Authenticate(_) => "Authenticate",
            Message::FrequencyUpdate(_) => "FrequencyUpdate",
            Message::ScreenFrame(_) => "ScreenFrame",
            Message::EncryptedEnvelope(_) => "EncryptedEnvelope",
            Message::RsaPublicKey(_) => "RsaPublicKey",
            Message::KeyTransport(_) => "KeyTransport",
        }
    }
}
