//! Secret key material and its lifecycle
//!
//! All keys are loaded once at startup and shared read-only afterwards:
//! 1. MAC key for attendance integrity, plus retired MAC keys that are still
//!    accepted for verification during a rotation window
//! 2. Encryption key for national IDs
//! 3. Identity key for deterministic duplicate-lookup hashes
//!
//! Missing keys are a [`crate::Error::KeyProvisioning`] failure. Only an explicit
//! development mode may generate a key on the fly. The encryption and identity
//! keys are then logged once so the operator can persist them; the MAC key is
//! never logged. Production keys come from [`KeyBootstrap`].

use crate::crypto::SecureMemory;
use crate::{Result, key_error};
use base64::Engine;
use std::fmt;
use zeroize::Zeroizing;

/// Environment variable holding the current MAC key
pub const MAC_KEY_VAR: &str = "ATTENDANCE_MAC_KEY";
/// Environment variable holding retired MAC keys (comma separated)
pub const RETIRED_MAC_KEYS_VAR: &str = "ATTENDANCE_MAC_RETIRED_KEYS";
/// Environment variable holding the national ID encryption key
pub const ENCRYPTION_KEY_VAR: &str = "ATTENDANCE_ENCRYPTION_KEY";
/// Environment variable holding the identity lookup key
pub const IDENTITY_KEY_VAR: &str = "ATTENDANCE_IDENTITY_KEY";

/// Length of generated keys and of fixed-size keys
pub const KEY_LEN: usize = 32;

/// Secret key bytes, wiped from memory on drop and redacted in `Debug`
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey {
    bytes: Zeroizing<Vec<u8>>,
}

impl SecretKey {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: Zeroizing::new(bytes.into()),
        }
    }

    /// Generate a fresh random 32-byte key
    pub fn generate() -> Self {
        Self::from_bytes(SecureMemory::secure_random_bytes::<KEY_LEN>().to_vec())
    }

    /// Decode a base64 key and check its length
    pub fn from_base64(encoded: &str, name: &str, min_len: usize, exact: bool) -> Result<Self> {
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|_| key_error!("{} must be valid base64", name))?;
        let key = Self::from_bytes(decoded);

        if exact && key.len() != min_len {
            return Err(key_error!("{} must be exactly {} bytes when decoded", name, min_len));
        }
        if key.len() < min_len {
            return Err(key_error!("{} must be at least {} bytes when decoded", name, min_len));
        }
        Ok(key)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Fixed 32-byte view for primitives that take an array key
    pub fn as_array(&self, name: &str) -> Result<[u8; KEY_LEN]> {
        self.as_bytes()
            .try_into()
            .map_err(|_| key_error!("{} must be exactly {} bytes", name, KEY_LEN))
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.as_bytes())
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey([REDACTED; {}])", self.len())
    }
}

/// Every key the core needs, provisioned once per process
#[derive(Debug, Clone)]
pub struct KeyRing {
    pub mac_key: SecretKey,
    pub retired_mac_keys: Vec<SecretKey>,
    pub encryption_key: SecretKey,
    pub identity_key: SecretKey,
}

impl KeyRing {
    /// Load keys through a variable lookup (environment in production)
    ///
    /// With `dev_mode` set, a missing key is generated. Generated encryption and
    /// identity keys are logged once; a generated MAC key is not.
    /// Keys that are present but invalid always fail.
    pub fn from_lookup<F>(lookup: F, dev_mode: bool) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mac_key =
            load_key(&lookup, MAC_KEY_VAR, KEY_LEN, false, dev_mode, DevKeyNotice::Withhold)?;
        let encryption_key =
            load_key(&lookup, ENCRYPTION_KEY_VAR, KEY_LEN, true, dev_mode, DevKeyNotice::Reveal)?;
        let identity_key =
            load_key(&lookup, IDENTITY_KEY_VAR, KEY_LEN, true, dev_mode, DevKeyNotice::Reveal)?;

        let retired_mac_keys = match lookup(RETIRED_MAC_KEYS_VAR) {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(|entry| SecretKey::from_base64(entry, RETIRED_MAC_KEYS_VAR, KEY_LEN, false))
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        tracing::info!(
            "🔑 Key ring loaded: retired_mac_keys={}, dev_mode={}",
            retired_mac_keys.len(),
            dev_mode
        );

        Ok(Self {
            mac_key,
            retired_mac_keys,
            encryption_key,
            identity_key,
        })
    }

    /// Create key ring for testing with random keys
    pub fn for_testing() -> Self {
        Self {
            mac_key: SecretKey::generate(),
            retired_mac_keys: Vec::new(),
            encryption_key: SecretKey::generate(),
            identity_key: SecretKey::generate(),
        }
    }

    /// Create a key ring from fixed bytes for reproducible vectors
    pub fn from_fixed(mac: [u8; KEY_LEN], encryption: [u8; KEY_LEN], identity: [u8; KEY_LEN]) -> Self {
        Self {
            mac_key: SecretKey::from_bytes(mac.to_vec()),
            retired_mac_keys: Vec::new(),
            encryption_key: SecretKey::from_bytes(encryption.to_vec()),
            identity_key: SecretKey::from_bytes(identity.to_vec()),
        }
    }

    /// Promote a new MAC key, keeping the old one for verification only
    pub fn rotate_mac_key(&mut self, new_key: SecretKey) {
        let old = std::mem::replace(&mut self.mac_key, new_key);
        self.retired_mac_keys.insert(0, old);
        tracing::info!(
            "🔑 MAC key rotated: retired_mac_keys={}",
            self.retired_mac_keys.len()
        );
    }
}

/// How a generated development key is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DevKeyNotice {
    /// Print the `.env` line so data encrypted under the key stays recoverable
    Reveal,
    /// Never print the key; the operator provisions one with attendance-keygen
    Withhold,
}

fn load_key<F>(
    lookup: &F,
    name: &str,
    min_len: usize,
    exact: bool,
    dev_mode: bool,
    notice: DevKeyNotice,
) -> Result<SecretKey>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name).filter(|value| !value.trim().is_empty()) {
        Some(encoded) => SecretKey::from_base64(&encoded, name, min_len, exact),
        None if dev_mode => {
            let key = SecretKey::generate();
            match notice {
                DevKeyNotice::Reveal => tracing::warn!(
                    "⚠️  {} not set; generated a development key. Data protected with it is lost on restart unless you persist it. Add this line to your .env: {}={}",
                    name,
                    name,
                    key.to_base64()
                ),
                DevKeyNotice::Withhold => tracing::warn!(
                    "⚠️  {} not set; using an ephemeral development key. Records signed now stop verifying after restart. Run attendance-keygen to provision one.",
                    name
                ),
            }
            Ok(key)
        }
        None => Err(key_error!(
            "{} environment variable required (run attendance-keygen to create one)",
            name
        )),
    }
}

/// Freshly generated key set for first-time provisioning
#[derive(Debug)]
pub struct GeneratedKeys {
    pub mac_key: SecretKey,
    pub encryption_key: SecretKey,
    pub identity_key: SecretKey,
}

impl GeneratedKeys {
    /// `.env` lines for all generated keys
    pub fn to_env_lines(&self) -> Vec<String> {
        vec![
            format!("{MAC_KEY_VAR}={}", self.mac_key.to_base64()),
            format!("{ENCRYPTION_KEY_VAR}={}", self.encryption_key.to_base64()),
            format!("{IDENTITY_KEY_VAR}={}", self.identity_key.to_base64()),
        ]
    }
}

/// Operator-invoked key generation
pub struct KeyBootstrap;

impl KeyBootstrap {
    /// Generate a complete key set
    pub fn generate() -> GeneratedKeys {
        GeneratedKeys {
            mac_key: SecretKey::generate(),
            encryption_key: SecretKey::generate(),
            identity_key: SecretKey::generate(),
        }
    }

    /// Produce `.env` lines for a MAC key rotation
    ///
    /// The current key moves to the front of the retired list so records
    /// signed with it keep verifying until they are re-signed.
    pub fn rotate_mac(current: &str, retired: Option<&str>) -> Result<Vec<String>> {
        let current = SecretKey::from_base64(current, MAC_KEY_VAR, KEY_LEN, false)?;
        let mut retired_list = vec![current.to_base64()];
        if let Some(retired) = retired {
            for entry in retired.split(',').map(str::trim).filter(|e| !e.is_empty()) {
                let key = SecretKey::from_base64(entry, RETIRED_MAC_KEYS_VAR, KEY_LEN, false)?;
                retired_list.push(key.to_base64());
            }
        }

        let new_key = SecretKey::generate();
        Ok(vec![
            format!("{MAC_KEY_VAR}={}", new_key.to_base64()),
            format!("{RETIRED_MAC_KEYS_VAR}={}", retired_list.join(",")),
        ])
    }
}
