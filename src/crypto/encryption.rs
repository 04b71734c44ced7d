//! Authenticated encryption for national IDs
//!
//! ChaCha20-Poly1305 with a random 96-bit nonce per message. Blob layout:
//!
//! ```text
//! version (1) | nonce (12) | ciphertext || tag (16)
//! ```
//!
//! The version byte is also bound as associated data. Any modified byte, a
//! truncated blob, or the wrong key all fail with the same
//! [`Error::Integrity`], so callers get no oracle telling the cases apart.

use crate::crypto::{KeyRing, SecretKey, SecureMemory};
use crate::{Error, Result, key_error};
use base64::Engine;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use serde::{Deserialize, Serialize};

/// Current blob format version
pub const BLOB_VERSION: u8 = 1;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const HEADER_LEN: usize = 1 + NONCE_LEN;

/// Longest plaintext accepted for encryption
pub const MAX_PLAINTEXT_LEN: usize = 256;

const AAD_PREFIX: &[u8] = b"attendance-trust/national-id";

/// Opaque encrypted field as stored alongside an employee record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedSecret {
    #[serde(with = "serde_bytes")]
    blob: Vec<u8>,
}

impl EncryptedSecret {
    pub fn from_bytes(blob: Vec<u8>) -> Self {
        Self { blob }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.blob
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.blob
    }

    /// Text form for a string column (URL-safe base64, no padding)
    pub fn to_encoded(&self) -> String {
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&self.blob)
    }

    /// Parse the text form. Undecodable text is an integrity failure.
    pub fn from_encoded(encoded: &str) -> Result<Self> {
        base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(encoded.trim())
            .map(Self::from_bytes)
            .map_err(|_| Error::Integrity)
    }
}

/// Field encryption engine bound to one key
pub struct EncryptionEngine {
    cipher: ChaCha20Poly1305,
}

impl EncryptionEngine {
    /// Create an engine from the key ring's encryption key
    pub fn new(keys: &KeyRing) -> Result<Self> {
        Self::with_key(&keys.encryption_key)
    }

    /// Create an engine from an explicit 32-byte key
    pub fn with_key(key: &SecretKey) -> Result<Self> {
        if key.len() != 32 {
            return Err(key_error!(
                "encryption key must be exactly 32 bytes, got {}",
                key.len()
            ));
        }
        let cipher = ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()));
        Ok(Self { cipher })
    }

    /// Encrypt a plaintext field. Each call uses a fresh nonce.
    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedSecret> {
        if plaintext.len() > MAX_PLAINTEXT_LEN {
            return Err(Error::encoding(
                "plaintext",
                format!("longer than {MAX_PLAINTEXT_LEN} bytes"),
            ));
        }

        let nonce_bytes = SecureMemory::secure_random_bytes::<NONCE_LEN>();
        let aad = associated_data(BLOB_VERSION);
        let ciphertext = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: plaintext.as_bytes(),
                    aad: &aad,
                },
            )
            .map_err(|_| Error::crypto("encryption failed"))?;

        let mut blob = Vec::with_capacity(HEADER_LEN + ciphertext.len());
        blob.push(BLOB_VERSION);
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(EncryptedSecret::from_bytes(blob))
    }

    /// Decrypt a blob, failing closed on any tampering or key mismatch
    pub fn decrypt(&self, secret: &EncryptedSecret) -> Result<String> {
        let blob = secret.as_bytes();
        if blob.len() < HEADER_LEN + TAG_LEN {
            return Err(Error::Integrity);
        }

        let (header, ciphertext) = blob.split_at(HEADER_LEN);
        let version = header[0];
        let nonce = Nonce::from_slice(&header[1..]);

        // Unknown versions still go through the AEAD so the failure path is uniform
        let aad = associated_data(version);
        let plaintext = self
            .cipher
            .decrypt(
                nonce,
                Payload {
                    msg: ciphertext,
                    aad: &aad,
                },
            )
            .map_err(|_| Error::Integrity)?;

        if version != BLOB_VERSION {
            return Err(Error::Integrity);
        }

        String::from_utf8(plaintext).map_err(|_| Error::Integrity)
    }

    /// Encrypt straight to the stored text form
    pub fn encrypt_to_string(&self, plaintext: &str) -> Result<String> {
        Ok(self.encrypt(plaintext)?.to_encoded())
    }

    /// Decrypt from the stored text form
    pub fn decrypt_str(&self, stored: &str) -> Result<String> {
        self.decrypt(&EncryptedSecret::from_encoded(stored)?)
    }
}

fn associated_data(version: u8) -> Vec<u8> {
    let mut aad = Vec::with_capacity(AAD_PREFIX.len() + 1);
    aad.extend_from_slice(AAD_PREFIX);
    aad.push(version);
    aad
}
