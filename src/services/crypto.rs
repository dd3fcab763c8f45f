//! Secret cipher for cached credentials (AES-256-GCM).
//!
//! Stored form is `hex(nonce || ciphertext)`; the 12-byte nonce is random per call.
use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit, OsRng},
};
use rand::RngCore;
use thiserror::Error;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("encryption key must be {KEY_LEN} bytes, got {0}")]
    InvalidKeyLength(usize),
    #[error("encryption key is not valid hex")]
    InvalidKeyEncoding,
    #[error("encryption failed")]
    EncryptionFailed,
    #[error("decryption failed")]
    DecryptionFailed,
}

#[derive(Clone)]
pub struct SecretCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for SecretCipher {
    // Never print key material.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCipher").finish_non_exhaustive()
    }
}

impl SecretCipher {
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        if key.len() != KEY_LEN {
            return Err(CryptoError::InvalidKeyLength(key.len()));
        }
        let cipher =
            Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength(key.len()))?;
        Ok(Self { cipher })
    }

    /// Builds a cipher from the 64-char hex form used in configuration.
    pub fn from_hex(key_hex: &str) -> Result<Self, CryptoError> {
        let key = hex::decode(key_hex.trim()).map_err(|_| CryptoError::InvalidKeyEncoding)?;
        Self::new(&key)
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let mut out = nonce_bytes.to_vec();
        out.extend(ciphertext);
        Ok(hex::encode(out))
    }

    pub fn decrypt(&self, stored: &str) -> Result<String, CryptoError> {
        let raw = hex::decode(stored).map_err(|_| CryptoError::DecryptionFailed)?;
        if raw.len() <= NONCE_LEN {
            return Err(CryptoError::DecryptionFailed);
        }

        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)?;

        String::from_utf8(plaintext).map_err(|_| CryptoError::DecryptionFailed)
    }
}

/// Fresh random key in the hex form accepted by [`SecretCipher::from_hex`].
pub fn generate_key_hex() -> String {
    let mut key = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut key);
    hex::encode(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let cipher = SecretCipher::from_hex(&generate_key_hex()).unwrap();
        let stored = cipher.encrypt("s3cr3t-Passw0rd").unwrap();
        assert_eq!(cipher.decrypt(&stored).unwrap(), "s3cr3t-Passw0rd");
    }

    #[test]
    fn nonce_differs_per_call() {
        let cipher = SecretCipher::from_hex(&generate_key_hex()).unwrap();
        assert_ne!(cipher.encrypt("same").unwrap(), cipher.encrypt("same").unwrap());
    }

    #[test]
    fn wrong_key_fails() {
        let a = SecretCipher::from_hex(&generate_key_hex()).unwrap();
        let b = SecretCipher::from_hex(&generate_key_hex()).unwrap();
        let stored = a.encrypt("secret").unwrap();
        assert_eq!(b.decrypt(&stored), Err(CryptoError::DecryptionFailed));
    }

    #[test]
    fn tampered_data_fails() {
        let cipher = SecretCipher::from_hex(&generate_key_hex()).unwrap();
        let mut stored = cipher.encrypt("secret").unwrap().into_bytes();
        let last = stored.len() - 1;
        stored[last] = if stored[last] == b'0' { b'1' } else { b'0' };
        let stored = String::from_utf8(stored).unwrap();
        assert_eq!(cipher.decrypt(&stored), Err(CryptoError::DecryptionFailed));
        assert_eq!(cipher.decrypt("zz"), Err(CryptoError::DecryptionFailed));
    }

    #[test]
    fn key_length_is_enforced() {
        assert_eq!(
            SecretCipher::new(&[0u8; 16]).err(),
            Some(CryptoError::InvalidKeyLength(16))
        );
        assert_eq!(
            SecretCipher::from_hex("not-hex").err(),
            Some(CryptoError::InvalidKeyEncoding)
        );
        assert_eq!(generate_key_hex().len(), 64);
    }
}
