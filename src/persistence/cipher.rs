//! Per-share authenticated encryption (ChaCha20-Poly1305).
//!
//! A sealed share is `nonce (12 bytes) || ciphertext+tag`, base64 encoded.

use base64::{
    engine::general_purpose::{STANDARD as BASE64, URL_SAFE},
    Engine,
};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;
use zeroize::{Zeroize, Zeroizing};

const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum CipherError {
    #[error("Invalid base64 encoding: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Key must decode to 32 bytes")]
    InvalidKeyLength,

    #[error("Sealed share is too short")]
    Truncated,

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed - record corrupted or wrong key")]
    DecryptionFailed,

    #[error("Decrypted share is not valid UTF-8")]
    InvalidPlaintext,
}

pub type CipherResult<T> = Result<T, CipherError>;

/// Symmetric key for sealing shares at rest.
pub struct ShareCipher {
    key: [u8; KEY_LEN],
}

impl ShareCipher {
    pub fn from_bytes(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }

    /// Parse a key given as standard or URL-safe base64 of 32 bytes.
    pub fn from_base64(encoded: &str) -> CipherResult<Self> {
        let encoded = encoded.trim();
        let bytes = Zeroizing::new(
            BASE64
                .decode(encoded)
                .or_else(|_| URL_SAFE.decode(encoded))?,
        );
        if bytes.len() != KEY_LEN {
            return Err(CipherError::InvalidKeyLength);
        }
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&bytes);
        Ok(Self { key })
    }

    /// Generate a random key (used by tests and for operators bootstrapping one).
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        Self { key }
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(&self.key))
    }

    /// Encrypt one share under a fresh random nonce.
    pub fn seal(&self, share: &str) -> CipherResult<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher()
            .encrypt(nonce, share.as_bytes())
            .map_err(|_| CipherError::EncryptionFailed)?;

        let mut record = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        record.extend_from_slice(&nonce_bytes);
        record.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(record))
    }

    /// Decrypt one sealed share, verifying its tag.
    pub fn open(&self, sealed: &str) -> CipherResult<Zeroizing<String>> {
        let record = BASE64.decode(sealed.trim())?;
        if record.len() <= NONCE_LEN {
            return Err(CipherError::Truncated);
        }
        let (nonce_bytes, ciphertext) = record.split_at(NONCE_LEN);

        let plaintext = self
            .cipher()
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| CipherError::DecryptionFailed)?;

        String::from_utf8(plaintext)
            .map(Zeroizing::new)
            .map_err(|e| {
                let mut bytes = e.into_bytes();
                bytes.zeroize();
                CipherError::InvalidPlaintext
            })
    }
}

impl Drop for ShareCipher {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl std::fmt::Debug for ShareCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ShareCipher(<redacted>)")
    }
}
