//! AES-256-GCM token cipher
//!
//! Tokens are stored as hex-encoded `nonce (12 bytes) || ciphertext || tag`.
//! The key is 32 bytes, supplied hex-encoded.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use std::fmt;

use crate::error::{Error, Result};
use crate::traits::{SecretToken, TokenDecryptor};

const NONCE_SIZE: usize = 12;
const KEY_SIZE: usize = 32;

/// Encrypts and decrypts provider tokens with a shared master key
pub struct AesGcmTokenCipher {
    cipher: Aes256Gcm,
}

impl fmt::Debug for AesGcmTokenCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AesGcmTokenCipher")
            .field("key", &"<REDACTED>")
            .finish()
    }
}

impl AesGcmTokenCipher {
    /// Build a cipher from a 64 character hex key
    pub fn from_hex_key(key_hex: &str) -> Result<Self> {
        let key_bytes = hex::decode(key_hex.trim())
            .map_err(|e| Error::settings(format!("Master key is not valid hex: {e}")))?;
        if key_bytes.len() != KEY_SIZE {
            return Err(Error::settings(format!(
                "Master key must be {KEY_SIZE} bytes (256 bits), got {}",
                key_bytes.len()
            )));
        }
        let cipher = Aes256Gcm::new_from_slice(&key_bytes)
            .map_err(|e| Error::settings(format!("Master key rejected: {e}")))?;
        Ok(Self { cipher })
    }

    /// Encrypt a token for storage in the configuration source
    pub fn encrypt(&self, plain_text: &str) -> Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plain_text.as_bytes())
            .map_err(|e| Error::decryption(format!("Encryption failed: {e}")))?;

        let mut result = nonce.to_vec();
        result.extend_from_slice(&ciphertext);
        Ok(hex::encode(result))
    }
}

impl TokenDecryptor for AesGcmTokenCipher {
    fn decrypt(&self, ciphertext: &str) -> Result<SecretToken> {
        let encrypted = hex::decode(ciphertext.trim())
            .map_err(|e| Error::decryption(format!("Invalid hex ciphertext: {e}")))?;
        if encrypted.len() <= NONCE_SIZE {
            return Err(Error::decryption("Ciphertext is too short to contain a nonce"));
        }

        let (nonce_bytes, sealed) = encrypted.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plain = self
            .cipher
            .decrypt(nonce, sealed)
            .map_err(|_| Error::decryption("ciphertext was tampered with or the key is wrong"))?;

        String::from_utf8(plain)
            .map(SecretToken::new)
            .map_err(|_| Error::decryption("token is not valid UTF-8"))
    }
}
