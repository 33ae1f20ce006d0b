//! One-shot key exchange run at connection start
//!
//! The accepting side offers its long-lived RSA public key in plain
//! mode; the initiating side answers with fresh AES key material,
//! RSA-encrypted. Both sides then switch to encrypted mode for the
//! rest of the connection. The asymmetric operation runs exactly once
//! per connection; every connection gets independent symmetric keys.

use crate::{ChannelError, SecureChannel};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;
use vigil_crypto::{RsaKeyPair, RsaPeerKey, SessionKeys};
use vigil_protocol::{
    EncryptedEnvelope, KeyTransport, Message, Packet, RsaPublicKey as RsaPublicKeyMessage,
};

/// Accepting role: offer the public key, adopt the peer's session keys.
///
/// Blocks for exactly one reply. Any unexpected message kind or RSA
/// failure aborts the handshake; the caller closes the connection and
/// never retries.
pub async fn accept<S: AsyncRead + AsyncWrite>(
    channel: &mut SecureChannel<S>,
    keypair: &RsaKeyPair,
) -> Result<(), ChannelError> {
    let der = keypair
        .public_key_der()
        .map_err(|e| ChannelError::Handshake(e.to_string()))?;
    channel
        .send_plain(&Packet::new(Message::RsaPublicKey(RsaPublicKeyMessage {
            der,
        })))
        .await?;

    let reply = channel.recv_plain().await?;
    let envelope = match reply.into_message() {
        Message::EncryptedEnvelope(envelope) => envelope,
        other => {
            return Err(ChannelError::Handshake(format!(
                "expected EncryptedEnvelope, peer sent {}",
                other.kind()
            )));
        }
    };

    let plaintext = keypair
        .decrypt(&envelope.ciphertext)
        .map_err(|_| ChannelError::Handshake("RSA decryption failed".into()))?;
    let text = String::from_utf8(plaintext)
        .map_err(|_| ChannelError::Handshake("key transport is not UTF-8".into()))?;
    let inner = Packet::decode(&text)
        .map_err(|e| ChannelError::Handshake(format!("key transport decode failed: {e}")))?;

    let transport = match inner.into_message() {
        Message::KeyTransport(transport) => transport,
        other => {
            return Err(ChannelError::Handshake(format!(
                "expected KeyTransport, peer sent {}",
                other.kind()
            )));
        }
    };

    let keys = SessionKeys::from_parts(&transport.key, &transport.iv)
        .map_err(|e| ChannelError::Handshake(e.to_string()))?;
    channel.enable_encryption(keys);
    debug!("accepting-role handshake complete");
    Ok(())
}

/// Initiating role: receive the public key, send fresh session keys.
pub async fn initiate<S: AsyncRead + AsyncWrite>(
    channel: &mut SecureChannel<S>,
) -> Result<(), ChannelError> {
    let offer = channel.recv_plain().await?;
    let public_key = match offer.into_message() {
        Message::RsaPublicKey(key) => key,
        other => {
            return Err(ChannelError::Handshake(format!(
                "expected RsaPublicKey, peer sent {}",
                other.kind()
            )));
        }
    };
    let peer = RsaPeerKey::from_der(&public_key.der)
        .map_err(|e| ChannelError::Handshake(e.to_string()))?;

    let keys = SessionKeys::generate();
    let transport = Packet::new(Message::KeyTransport(KeyTransport {
        key: keys.key_bytes().to_vec(),
        iv: keys.iv_bytes().to_vec(),
    }));
    let ciphertext = peer
        .encrypt(transport.encode()?.as_bytes())
        .map_err(|e| ChannelError::Handshake(e.to_string()))?;

    channel
        .send_plain(&Packet::new(Message::EncryptedEnvelope(EncryptedEnvelope {
            ciphertext,
        })))
        .await?;

    channel.enable_encryption(keys);
    debug!("initiating-role handshake complete");
    Ok(())
}
