//! Per-connection symmetric session cipher

use crate::CryptoError;
use aes::Aes256;
use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};
use rand::RngCore;
use rand::rngs::OsRng;
use zeroize::{Zeroize, ZeroizeOnDrop};

type Aes256CfbEnc = cfb_mode::Encryptor<Aes256>;
type Aes256CfbDec = cfb_mode::Decryptor<Aes256>;

pub const SESSION_KEY_LEN: usize = 32;
pub const SESSION_IV_LEN: usize = 16;

/// Symmetric key material negotiated during the handshake.
///
/// Owned exclusively by one connection; wiped from memory when the
/// connection is torn down.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SessionKeys {
    key: [u8; SESSION_KEY_LEN],
    iv: [u8; SESSION_IV_LEN],
}

impl SessionKeys {
    /// Generate fresh random key material for a new connection
    pub fn generate() -> Self {
        let mut key = [0u8; SESSION_KEY_LEN];
        let mut iv = [0u8; SESSION_IV_LEN];
        OsRng.fill_bytes(&mut key);
        OsRng.fill_bytes(&mut iv);
        Self { key, iv }
    }

    /// Adopt key material received from the peer
    pub fn from_parts(key: &[u8], iv: &[u8]) -> Result<Self, CryptoError> {
        let key: [u8; SESSION_KEY_LEN] =
            key.try_into().map_err(|_| CryptoError::InvalidKeyMaterial {
                expected: SESSION_KEY_LEN,
                actual: key.len(),
            })?;
        let iv: [u8; SESSION_IV_LEN] =
            iv.try_into().map_err(|_| CryptoError::InvalidKeyMaterial {
                expected: SESSION_IV_LEN,
                actual: iv.len(),
            })?;
        Ok(Self { key, iv })
    }

    pub fn key_bytes(&self) -> &[u8] {
        &self.key
    }

    pub fn iv_bytes(&self) -> &[u8] {
        &self.iv
    }
}

/// AES-256-CFB stream cipher bound to one connection's key/IV.
///
/// CFB carries no authentication tag; tampering surfaces as a
/// decompression or decode failure in the layer above.
pub struct AesCfbCipher {
    keys: SessionKeys,
}

impl AesCfbCipher {
    pub fn new(keys: SessionKeys) -> Self {
        Self { keys }
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        let mut buf = plaintext.to_vec();
        Aes256CfbEnc::new(&self.keys.key.into(), &self.keys.iv.into()).encrypt(&mut buf);
        buf
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> Vec<u8> {
        let mut buf = ciphertext.to_vec();
        Aes256CfbDec::new(&self.keys.key.into(), &self.keys.iv.into()).decrypt(&mut buf);
        buf
    }
}
