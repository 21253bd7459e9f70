//! Envelope encryption
//!
//! Key material comes from a `KeyProvider` so the shared placeholder key can
//! be swapped for real per-peer key agreement without touching callers.
//! Envelopes are sealed with AES-256-GCM under a fresh 96-bit IV.

use crate::error::{ClientError, Result};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose, Engine as _};
use rand::RngCore;
use std::sync::Arc;

/// Shared demo key used by every session until key exchange exists
pub const PLACEHOLDER_KEY_HEX: &str =
    "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

const IV_LEN: usize = 12;

/// Source of symmetric key material for a conversation
pub trait KeyProvider: Send + Sync {
    fn key_for(&self, peer: &str) -> Result<[u8; 32]>;
}

/// Same key for every peer
#[derive(Clone)]
pub struct StaticKeyProvider {
    key: [u8; 32],
}

impl StaticKeyProvider {
    pub fn from_hex(key_hex: &str) -> Result<Self> {
        let bytes = hex::decode(key_hex.trim())
            .map_err(|e| ClientError::ConfigError(format!("Key is not valid hex: {}", e)))?;
        let key: [u8; 32] = bytes.try_into().map_err(|bytes: Vec<u8>| {
            ClientError::ConfigError(format!("Key must be 32 bytes, got {}", bytes.len()))
        })?;
        Ok(StaticKeyProvider { key })
    }

    /// The shared demo key. Fails rather than substituting another key.
    pub fn placeholder() -> Result<Self> {
        Self::from_hex(PLACEHOLDER_KEY_HEX)
    }
}

impl KeyProvider for StaticKeyProvider {
    fn key_for(&self, _peer: &str) -> Result<[u8; 32]> {
        Ok(self.key)
    }
}

/// Seals and opens envelope payloads
#[derive(Clone)]
pub struct Sealer {
    keys: Arc<dyn KeyProvider>,
}

impl Sealer {
    pub fn new(keys: Arc<dyn KeyProvider>) -> Self {
        Sealer { keys }
    }

    /// Encrypt `plaintext` for `peer`, returning (base64 ciphertext, hex IV)
    pub fn seal(&self, peer: &str, plaintext: &str) -> Result<(String, String)> {
        let cipher = self.cipher(peer)?;

        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&iv), plaintext.as_bytes())
            .map_err(|_| ClientError::CryptoError("Encryption failed".to_string()))?;

        Ok((general_purpose::STANDARD.encode(ciphertext), hex::encode(iv)))
    }

    /// Decrypt an envelope exchanged with `peer`
    pub fn open(&self, peer: &str, ciphertext: &str, iv: &str) -> Result<String> {
        let cipher = self.cipher(peer)?;

        let iv = hex::decode(iv)
            .map_err(|_| ClientError::CryptoError("IV is not valid hex".to_string()))?;
        if iv.len() != IV_LEN {
            return Err(ClientError::CryptoError(format!(
                "IV must be {} bytes, got {}",
                IV_LEN,
                iv.len()
            )));
        }
        let ciphertext = general_purpose::STANDARD
            .decode(ciphertext)
            .map_err(|_| ClientError::CryptoError("Ciphertext is not valid base64".to_string()))?;

        let plaintext = cipher
            .decrypt(Nonce::from_slice(&iv), ciphertext.as_ref())
            .map_err(|_| ClientError::CryptoError("Decryption failed".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|_| ClientError::CryptoError("Plaintext is not UTF-8".to_string()))
    }

    fn cipher(&self, peer: &str) -> Result<Aes256Gcm> {
        let key = self.keys.key_for(peer)?;
        Aes256Gcm::new_from_slice(&key)
            .map_err(|_| ClientError::CryptoError("Invalid key length".to_string()))
    }
}
