//! Vigil Crypto - key transport and session encryption
//!
//! This crate provides:
//! - RSA-2048 keypair with PKCS#1 v1.5 encryption (handshake key transport)
//! - AES-256-CFB session cipher keyed by per-connection key/IV
//! - Session key material generation, zeroized on drop

mod rsa_transport;
mod session;

pub use rsa_transport::*;
pub use session::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("Invalid RSA public key: {0}")]
    InvalidPublicKey(String),

    #[error("RSA encryption failed")]
    AsymmetricEncrypt,

    #[error("RSA decryption failed")]
    AsymmetricDecrypt,

    #[error("Invalid key material: expected {expected} bytes, got {actual}")]
    InvalidKeyMaterial { expected: usize, actual: usize },
}
