//! Keyed integrity protection for attendance records
//!
//! Tags are HMAC-SHA256 over the canonical encoding. A secret key is required
//! because attendance tuples are low-entropy: with a plain hash anyone able to
//! read the table could forge tags for arbitrary rows.
//!
//! Verification accepts the current key and any retired keys, so a MAC key can
//! be rotated without flagging every historical row as tampered. Signing always
//! uses the current key.

use crate::crypto::{KeyRing, SecretKey, SecureMemory};
use crate::types::{IntegrityStatus, MAC_TAG_LEN, MacTag};
use crate::{Result, crypto_error};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Which key generation verified a tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyGeneration {
    Current,
    /// Index into the retired key list, most recent first
    Retired(usize),
}

/// HMAC signer/verifier bound to the process key ring
pub struct IntegrityEngine {
    current: SecretKey,
    retired: Vec<SecretKey>,
}

impl IntegrityEngine {
    /// Create an engine from the MAC keys of a key ring
    pub fn new(keys: &KeyRing) -> Self {
        Self {
            current: keys.mac_key.clone(),
            retired: keys.retired_mac_keys.clone(),
        }
    }

    /// Create an engine with a single key
    pub fn with_key(key: SecretKey) -> Self {
        Self {
            current: key,
            retired: Vec::new(),
        }
    }

    /// Compute the tag for canonical bytes under the current key
    pub fn sign(&self, canonical: &[u8]) -> MacTag {
        compute_tag(&self.current, canonical)
    }

    /// Recompute and compare in constant time
    ///
    /// Returns `false` on mismatch, never an error.
    pub fn verify(&self, canonical: &[u8], tag: &MacTag) -> bool {
        self.verify_detailed(canonical, tag).is_some()
    }

    /// Verify and report which key generation matched
    ///
    /// Every key is tried regardless of earlier matches, so timing does not
    /// reveal whether a row was signed under a retired key.
    pub fn verify_detailed(&self, canonical: &[u8], tag: &MacTag) -> Option<KeyGeneration> {
        let mut matched = None;

        let expected = compute_tag(&self.current, canonical);
        if SecureMemory::constant_time_eq(expected.as_bytes(), tag.as_bytes()) {
            matched = Some(KeyGeneration::Current);
        }

        for (index, key) in self.retired.iter().enumerate() {
            let expected = compute_tag(key, canonical);
            let hit = SecureMemory::constant_time_eq(expected.as_bytes(), tag.as_bytes());
            if hit && matched.is_none() {
                matched = Some(KeyGeneration::Retired(index));
            }
        }

        matched
    }

    /// Verify a tag as stored in the MAC column
    ///
    /// Fails with [`crate::Error::MalformedTag`] when the stored text is not a
    /// valid tag; returns `Ok(false)` on a well-formed mismatch.
    pub fn verify_encoded(&self, canonical: &[u8], stored: &str) -> Result<bool> {
        let tag = MacTag::from_hex(stored)?;
        Ok(self.verify(canonical, &tag))
    }

    /// Classify a stored record for reporting
    ///
    /// An absent or empty MAC column is `Unsigned`; a malformed one is treated
    /// as tampered since a signature is present but cannot be valid.
    pub fn check_stored(&self, canonical: &[u8], stored: Option<&str>) -> IntegrityStatus {
        let stored = match stored.map(str::trim) {
            None | Some("") => return IntegrityStatus::Unsigned,
            Some(stored) => stored,
        };

        match self.verify_encoded(canonical, stored) {
            Ok(true) => IntegrityStatus::Verified,
            Ok(false) => IntegrityStatus::Tampered,
            Err(e) => {
                tracing::debug!("Stored MAC rejected before comparison: {}", e);
                IntegrityStatus::Tampered
            }
        }
    }

    /// Number of retired keys still accepted
    pub fn retired_key_count(&self) -> usize {
        self.retired.len()
    }
}

fn compute_tag(key: &SecretKey, canonical: &[u8]) -> MacTag {
    // HMAC accepts keys of any length, so construction cannot fail
    let mut mac = match HmacSha256::new_from_slice(key.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC accepts any key length"),
    };
    mac.update(canonical);
    let mut bytes = [0u8; MAC_TAG_LEN];
    bytes.copy_from_slice(&mac.finalize().into_bytes());
    MacTag::from_bytes(bytes)
}

/// Sign canonical bytes with an explicit key
pub fn sign_with_key(canonical: &[u8], key: &[u8]) -> Result<MacTag> {
    if key.is_empty() {
        return Err(crypto_error!("MAC key must not be empty"));
    }
    Ok(compute_tag(&SecretKey::from_bytes(key.to_vec()), canonical))
}
