use crate::model::HeaderValue;
use crate::{Result, RuntimeError};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use rand::RngCore;

const NONCE_LEN: usize = 12;

/// Symmetric AEAD wrapper for tool header values (§4.5 Security, §9). A
/// single process-wide key derived from `encryption_key` configuration;
/// decrypted values must never be logged.
#[derive(Clone)]
pub struct HeaderCipher {
    cipher: Aes256Gcm,
}

impl HeaderCipher {
    /// Derives a 256-bit key from the configured secret by hashing it with
    /// SHA-256, so operators can supply a passphrase of any length.
    pub fn from_key_material(key_material: &str) -> Self {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(key_material.as_bytes());
        let key_bytes = hasher.finalize();
        let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<HeaderValue> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| RuntimeError::Encryption(e.to_string()))?;

        let b64 = base64::engine::general_purpose::STANDARD;
        Ok(HeaderValue::Encrypted {
            nonce_b64: b64.encode(nonce_bytes),
            ciphertext_b64: b64.encode(ciphertext),
        })
    }

    /// Decrypts immediately before the outbound HTTP call; the caller must
    /// not retain or log the returned string any longer than that call.
    pub fn decrypt(&self, value: &HeaderValue) -> Result<String> {
        match value {
            HeaderValue::Plain(s) => Ok(s.clone()),
            HeaderValue::Encrypted {
                nonce_b64,
                ciphertext_b64,
            } => {
                let b64 = base64::engine::general_purpose::STANDARD;
                let nonce_bytes = b64
                    .decode(nonce_b64)
                    .map_err(|e| RuntimeError::Encryption(e.to_string()))?;
                let ciphertext = b64
                    .decode(ciphertext_b64)
                    .map_err(|e| RuntimeError::Encryption(e.to_string()))?;
                let nonce = Nonce::from_slice(&nonce_bytes);
                let plaintext = self
                    .cipher
                    .decrypt(nonce, ciphertext.as_ref())
                    .map_err(|e| RuntimeError::Encryption(e.to_string()))?;
                String::from_utf8(plaintext).map_err(|e| RuntimeError::Encryption(e.to_string()))
            }
        }
    }
}
