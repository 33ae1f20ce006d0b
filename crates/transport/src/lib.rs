//! Vigil Transport - secure channel and connection intake
//!
//! This crate provides:
//! - `SecureChannel`: line-framed packet transport with a plain
//!   handshake mode and a mandatory encrypted mode afterwards
//! - `handshake`: the one-shot RSA-to-AES key exchange
//! - `Acceptor`: listener that handshakes connections in isolation and
//!   publishes only the successful ones

mod acceptor;
mod channel;
mod compress;
pub mod handshake;

pub use acceptor::*;
pub use channel::*;

use thiserror::Error;
use vigil_protocol::ProtocolError;

#[derive(Error, Debug)]
pub enum ChannelError {
    /// Wrong message order or asymmetric-crypto failure during the
    /// handshake; the connection is closed without retry
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Decrypt/decompress/decode failure after the handshake; the
    /// stream is corrupt, tampered with, or keyed wrongly
    #[error("Channel integrity failure: {0}")]
    Integrity(String),

    /// A plain-mode packet of a non-envelope tag arrived after the
    /// channel entered encrypted mode
    #[error("Plain {0} packet received in encrypted mode")]
    PlainPacketInEncryptedMode(&'static str),

    /// Encrypted-mode operation attempted before the handshake
    /// installed a session cipher
    #[error("Channel is not in encrypted mode")]
    NotEncrypted,

    /// Peer EOF
    #[error("Transport closed by peer")]
    Closed,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
