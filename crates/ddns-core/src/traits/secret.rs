// # Token Decryption
//
// Provider tokens are stored encrypted in the configuration source and are
// decrypted only for the duration of a single update call.
//
// Implementations: `crypto::AesGcmTokenCipher`.

use std::fmt;

/// A decrypted provider token
///
/// The plaintext is reachable only through [`SecretToken::expose`]. `Debug`
/// never prints it and the buffer is zeroed when the token is dropped.
pub struct SecretToken(String);

impl SecretToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Replace every occurrence of the token in `text`
    pub fn scrub(&self, text: &str) -> String {
        if self.0.is_empty() {
            return text.to_string();
        }
        text.replace(self.0.as_str(), "[REDACTED]")
    }
}

impl fmt::Debug for SecretToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretToken(<REDACTED>)")
    }
}

impl Drop for SecretToken {
    fn drop(&mut self) {
        let mut bytes = std::mem::take(&mut self.0).into_bytes();
        bytes.fill(0);
        std::hint::black_box(&bytes);
    }
}

/// Trait for token decryption implementations
///
/// Wrong-key or tampered ciphertext fails with
/// [`crate::Error::DecryptionFailed`].
pub trait TokenDecryptor: Send + Sync {
    fn decrypt(&self, ciphertext: &str) -> Result<SecretToken, crate::Error>;
}
