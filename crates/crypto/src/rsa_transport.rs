//! RSA key transport for the handshake

use crate::CryptoError;
use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPublicKey, EncodeRsaPublicKey};
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};

/// RSA modulus size in bits.
///
/// 2048-bit PKCS#1 v1.5 leaves 245 bytes of plaintext capacity, well
/// above the size of an encoded key-transport packet.
const RSA_BITS: usize = 2048;

/// Long-lived asymmetric keypair owned by the accepting endpoint.
///
/// The keypair lives as long as the listening endpoint; it is not
/// persisted across restarts (trust-on-first-use).
pub struct RsaKeyPair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl RsaKeyPair {
    /// Generate a fresh keypair. CPU-heavy; call once per listener.
    pub fn generate() -> Result<Self, CryptoError> {
        let private = RsaPrivateKey::new(&mut OsRng, RSA_BITS)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        let public = RsaPublicKey::from(&private);
        Ok(Self { private, public })
    }

    /// Export the public key as PKCS#1 RSAPublicKey DER
    /// (modulus + exponent), the form carried on the wire.
    pub fn public_key_der(&self) -> Result<Vec<u8>, CryptoError> {
        self.public
            .to_pkcs1_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))
    }

    /// Decrypt a PKCS#1 v1.5 ciphertext with the private key
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.private
            .decrypt(Pkcs1v15Encrypt, ciphertext)
            .map_err(|_| CryptoError::AsymmetricDecrypt)
    }
}

/// A peer's RSA public key, imported from its DER wire form
pub struct RsaPeerKey {
    public: RsaPublicKey,
}

impl RsaPeerKey {
    pub fn from_der(der: &[u8]) -> Result<Self, CryptoError> {
        let public = RsaPublicKey::from_pkcs1_der(der)
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
        Ok(Self { public })
    }

    /// Encrypt with PKCS#1 v1.5 padding
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.public
            .encrypt(&mut OsRng, Pkcs1v15Encrypt, plaintext)
            .map_err(|_| CryptoError::AsymmetricEncrypt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rsa_roundtrip_via_der() {
        let keypair = RsaKeyPair::generate().unwrap();
        let der = keypair.public_key_der().unwrap();

        let peer = RsaPeerKey::from_der(&der).unwrap();
        let plaintext = b"fresh session key material";
        let ciphertext = peer.encrypt(plaintext).unwrap();

        assert_ne!(ciphertext.as_slice(), plaintext.as_slice());
        assert_eq!(keypair.decrypt(&ciphertext).unwrap(), plaintext);
    }

    #[test]
    fn test_decrypt_garbage_fails() {
        let keypair = RsaKeyPair::generate().unwrap();
        let result = keypair.decrypt(&[0u8; 256]);
        assert!(matches!(result, Err(CryptoError::AsymmetricDecrypt)));
    }

    #[test]
    fn test_invalid_der_rejected() {
        assert!(matches!(
            RsaPeerKey::from_der(b"not a key"),
            Err(CryptoError::InvalidPublicKey(_))
        ));
    }
}
