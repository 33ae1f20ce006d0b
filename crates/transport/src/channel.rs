//! Line-framed packet channel with plain and encrypted modes

use crate::compress::{compress, decompress};
use crate::ChannelError;
use std::sync::Arc;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf,
};
use vigil_crypto::{AesCfbCipher, SessionKeys};
use vigil_protocol::{EncryptedEnvelope, Message, Packet};

/// One live transport endpoint.
///
/// Starts in plain mode, which only the handshake may use. After
/// `enable_encryption` every packet in either direction travels
/// compressed and encrypted inside an `EncryptedEnvelope`; a bare
/// packet of any other tag fails the connection.
pub struct SecureChannel<S> {
    reader: BufReader<ReadHalf<S>>,
    writer: WriteHalf<S>,
    cipher: Option<Arc<AesCfbCipher>>,
}

impl<S: AsyncRead + AsyncWrite> SecureChannel<S> {
    pub fn new(stream: S) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            cipher: None,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }

    /// Switch to encrypted mode. Irreversible for the connection's
    /// lifetime; the key material is dropped (and wiped) with the
    /// channel.
    pub fn enable_encryption(&mut self, keys: SessionKeys) {
        self.cipher = Some(Arc::new(AesCfbCipher::new(keys)));
    }

    /// Handshake-only: write one packet without encryption
    pub(crate) async fn send_plain(&mut self, packet: &Packet) -> Result<(), ChannelError> {
        let mut line = packet.encode()?;
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Handshake-only: read one packet without decryption
    pub(crate) async fn recv_plain(&mut self) -> Result<Packet, ChannelError> {
        let line = read_line(&mut self.reader).await?;
        Ok(Packet::decode(&line)?)
    }

    /// Encrypt, compress, and write one packet.
    /// Fails with `NotEncrypted` before the handshake.
    pub async fn send(&mut self, packet: &Packet) -> Result<(), ChannelError> {
        let cipher = self.cipher.as_ref().ok_or(ChannelError::NotEncrypted)?;
        let line = seal(cipher, packet)?;
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Read, decrypt, and decompress one packet.
    /// Fails with `NotEncrypted` before the handshake.
    pub async fn recv(&mut self) -> Result<Packet, ChannelError> {
        let cipher = self.cipher.as_ref().ok_or(ChannelError::NotEncrypted)?;
        let line = read_line(&mut self.reader).await?;
        open(cipher, &line)
    }

    /// Split an encrypted channel so reads and writes can run from
    /// independent tasks. The halves share the session cipher.
    pub fn split(self) -> Result<(ChannelReader<S>, ChannelWriter<S>), ChannelError> {
        let cipher = self.cipher.ok_or(ChannelError::NotEncrypted)?;
        Ok((
            ChannelReader {
                reader: self.reader,
                cipher: cipher.clone(),
            },
            ChannelWriter {
                writer: self.writer,
                cipher,
            },
        ))
    }
}

/// Receiving half of a split [`SecureChannel`]
pub struct ChannelReader<S> {
    reader: BufReader<ReadHalf<S>>,
    cipher: Arc<AesCfbCipher>,
}

impl<S: AsyncRead> ChannelReader<S> {
    pub async fn recv(&mut self) -> Result<Packet, ChannelError> {
        let line = read_line(&mut self.reader).await?;
        open(&self.cipher, &line)
    }
}

/// Sending half of a split [`SecureChannel`]
pub struct ChannelWriter<S> {
    writer: WriteHalf<S>,
    cipher: Arc<AesCfbCipher>,
}

impl<S: AsyncWrite> ChannelWriter<S> {
    pub async fn send(&mut self, packet: &Packet) -> Result<(), ChannelError> {
        let line = seal(&self.cipher, packet)?;
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

async fn read_line<R: AsyncRead>(reader: &mut BufReader<ReadHalf<R>>) -> Result<String, ChannelError> {
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Err(ChannelError::Closed);
    }
    Ok(line)
}

/// Inner packet -> JSON -> gzip -> AES-CFB -> envelope packet line
fn seal(cipher: &AesCfbCipher, packet: &Packet) -> Result<String, ChannelError> {
    let plaintext = packet.encode()?;
    let compressed = compress(plaintext.as_bytes())?;
    let ciphertext = cipher.encrypt(&compressed);

    let envelope = Packet::new(Message::EncryptedEnvelope(EncryptedEnvelope { ciphertext }));
    let mut line = envelope.encode()?;
    line.push('\n');
    Ok(line)
}

/// The exact inverse of [`seal`].
///
/// Everything that can go wrong past the outer decode - decrypt
/// garbage, truncated gzip, unparseable inner packet - is an integrity
/// failure that must terminate the connection.
fn open(cipher: &AesCfbCipher, line: &str) -> Result<Packet, ChannelError> {
    let outer = Packet::decode(line)?;

    let envelope = match outer.into_message() {
        Message::EncryptedEnvelope(envelope) => envelope,
        other => return Err(ChannelError::PlainPacketInEncryptedMode(other.kind())),
    };

    let compressed = cipher.decrypt(&envelope.ciphertext);
    let plaintext = decompress(&compressed)
        .map_err(|e| ChannelError::Integrity(format!("decompression failed: {e}")))?;
    let text = String::from_utf8(plaintext)
        .map_err(|_| ChannelError::Integrity("inner packet is not UTF-8".into()))?;
    let inner = Packet::decode(&text)
        .map_err(|e| ChannelError::Integrity(format!("inner packet decode failed: {e}")))?;

    // Real traffic never nests envelopes; a second level is treated as
    // a corrupt stream rather than recursed into.
    if matches!(inner.message(), Message::EncryptedEnvelope(_)) {
        return Err(ChannelError::Integrity("nested encrypted envelope".into()));
    }

    Ok(inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_protocol::{FrequencyUpdate, Response, ScreenFrame};

    fn encrypted_pair() -> (SecureChannel<tokio::io::DuplexStream>, SecureChannel<tokio::io::DuplexStream>) {
        let (left, right) = tokio::io::duplex(64 * 1024);
        let keys = SessionKeys::generate();
        let copy = SessionKeys::from_parts(keys.key_bytes(), keys.iv_bytes()).unwrap();

        let mut a = SecureChannel::new(left);
        let mut b = SecureChannel::new(right);
        a.enable_encryption(keys);
        b.enable_encryption(copy);
        (a, b)
    }

    #[tokio::test]
    async fn test_encrypted_roundtrip() {
        let (mut a, mut b) = encrypted_pair();

        let packet = Packet::new(Message::ScreenFrame(ScreenFrame {
            image: vec![0xAB; 2048],
            captured_at: 1_700_000_000_000,
        }));
        a.send(&packet).await.unwrap();

        let received = b.recv().await.unwrap();
        assert_eq!(received, packet);
    }

    #[tokio::test]
    async fn test_wire_is_opaque() {
        let (mut a, mut b) = encrypted_pair();

        a.send(&Packet::new(Message::Response(Response {
            success: true,
            message: "secret".into(),
        })))
        .await
        .unwrap();

        // Peek at the raw outer packet before decryption.
        let outer = b.recv_plain().await.unwrap();
        match outer.into_message() {
            Message::EncryptedEnvelope(env) => {
                let text = String::from_utf8_lossy(&env.ciphertext);
                assert!(!text.contains("secret"));
            }
            other => panic!("expected envelope, got {}", other.kind()),
        }
    }

    #[tokio::test]
    async fn test_plain_packet_in_encrypted_mode_is_fatal() {
        let (mut a, mut b) = encrypted_pair();

        // Emulate a peer that drops back to plaintext mid-session.
        a.send_plain(&Packet::new(Message::FrequencyUpdate(FrequencyUpdate {
            seconds: 5,
        })))
        .await
        .unwrap();

        let err = b.recv().await.unwrap_err();
        assert!(matches!(
            err,
            ChannelError::PlainPacketInEncryptedMode("FrequencyUpdate")
        ));
    }

    #[tokio::test]
    async fn test_tampered_ciphertext_is_integrity_error() {
        let (mut a, mut b) = encrypted_pair();

        // Capture a sealed line, flip ciphertext bits, replay it.
        let line = {
            let packet = Packet::new(Message::Response(Response {
                success: true,
                message: "ok".into(),
            }));
            seal(a.cipher.as_ref().unwrap(), &packet).unwrap()
        };
        let outer = Packet::decode(&line).unwrap();
        let mut envelope = match outer.into_message() {
            Message::EncryptedEnvelope(env) => env,
            _ => unreachable!(),
        };
        envelope.ciphertext[0] ^= 0xFF;
        a.send_plain(&Packet::new(Message::EncryptedEnvelope(envelope)))
            .await
            .unwrap();

        let err = b.recv().await.unwrap_err();
        assert!(matches!(err, ChannelError::Integrity(_)));
    }

    #[tokio::test]
    async fn test_nested_envelope_rejected() {
        let (mut a, mut b) = encrypted_pair();

        // An envelope legitimately sealed inside the encrypted path is
        // still depth 2 on the receiving side.
        a.send(&Packet::new(Message::EncryptedEnvelope(EncryptedEnvelope {
            ciphertext: vec![1, 2, 3],
        })))
        .await
        .unwrap();

        let err = b.recv().await.unwrap_err();
        assert!(matches!(err, ChannelError::Integrity(_)));
    }

    #[tokio::test]
    async fn test_eof_is_closed() {
        let (a, mut b) = encrypted_pair();
        drop(a);
        assert!(matches!(b.recv().await.unwrap_err(), ChannelError::Closed));
    }

    #[tokio::test]
    async fn test_split_halves_share_cipher() {
        let (a, mut b) = encrypted_pair();
        let (_reader, mut writer) = a.split().unwrap();

        let packet = Packet::new(Message::FrequencyUpdate(FrequencyUpdate { seconds: 10 }));
        writer.send(&packet).await.unwrap();
        assert_eq!(b.recv().await.unwrap(), packet);
    }

    #[tokio::test]
    async fn test_plain_channel_refuses_encrypted_ops() {
        let (left, _right) = tokio::io::duplex(1024);
        let mut channel = SecureChannel::new(left);
        assert!(!channel.is_encrypted());

        let packet = Packet::new(Message::FrequencyUpdate(FrequencyUpdate { seconds: 1 }));
        assert!(matches!(
            channel.send(&packet).await,
            Err(ChannelError::NotEncrypted)
        ));
        assert!(matches!(
            channel.recv().await,
            Err(ChannelError::NotEncrypted)
        ));
        assert!(matches!(
            channel.split(),
            Err(ChannelError::NotEncrypted)
        ));
    }
}
