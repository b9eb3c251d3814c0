//! Authenticated encryption of credential payloads
//!
//! Ciphertext format: `v1:` followed by base64 of `nonce (24 bytes) || sealed payload`.
//! The nonce travels with the ciphertext so only the key is needed to decrypt.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use thiserror::Error;

const FORMAT_PREFIX: &str = "v1:";
const NONCE_LEN: usize = 24;
const KEY_CONTEXT: &str = "price-sentinel 2024 credential vault v1";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CipherError {
    #[error("unsupported ciphertext format")]
    UnknownFormat,
    #[error("ciphertext is not valid base64")]
    Encoding,
    #[error("ciphertext is truncated")]
    Truncated,
    #[error("authentication tag mismatch (wrong key or tampered data)")]
    Authentication,
    #[error("encryption failed")]
    Encryption,
}

/// Symmetric cipher keyed from configured key material
pub struct VaultCipher {
    aead: XChaCha20Poly1305,
}

impl VaultCipher {
    /// Derive a 256-bit key from arbitrary key material
    pub fn from_key_material(material: &str) -> Self {
        let key = blake3::derive_key(KEY_CONTEXT, material.as_bytes());
        Self {
            aead: XChaCha20Poly1305::new(&key.into()),
        }
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, CipherError> {
        let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
        let sealed = self
            .aead
            .encrypt(&nonce, plaintext)
            .map_err(|_| CipherError::Encryption)?;

        let mut framed = Vec::with_capacity(NONCE_LEN + sealed.len());
        framed.extend_from_slice(&nonce);
        framed.extend_from_slice(&sealed);
        Ok(format!("{FORMAT_PREFIX}{}", STANDARD.encode(framed)))
    }

    pub fn decrypt(&self, ciphertext: &str) -> Result<Vec<u8>, CipherError> {
        let encoded = ciphertext
            .trim()
            .strip_prefix(FORMAT_PREFIX)
            .ok_or(CipherError::UnknownFormat)?;
        let framed = STANDARD.decode(encoded).map_err(|_| CipherError::Encoding)?;
        if framed.len() <= NONCE_LEN {
            return Err(CipherError::Truncated);
        }

        let (nonce, sealed) = framed.split_at(NONCE_LEN);
        self.aead
            .decrypt(XNonce::from_slice(nonce), sealed)
            .map_err(|_| CipherError::Authentication)
    }
}
