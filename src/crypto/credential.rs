//! One-way hashing of credentials and identifiers
//!
//! Two primitives that must not be swapped:
//! - [`CredentialHasher`]: salted, deliberately slow Argon2id for passwords,
//!   security answers and OTP codes. Every call yields a different digest.
//! - [`IdentityHasher`]: fast keyed Blake3 for equality lookups (duplicate
//!   national ID detection). Same input and key always yield the same digest.

use crate::crypto::{KeyRing, SecretKey, SecureMemory};
use crate::{Result, crypto_error};
use argon2::password_hash::{PasswordHash, PasswordHasher, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};

/// Salt length for credential hashes
const SALT_LEN: usize = 16;

/// Domain tag mixed into identity hashes
const IDENTITY_DOMAIN: &[u8] = b"attendance-trust/national-id-lookup/v1";

/// Argon2id cost parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Argon2Config {
    /// Memory cost in KiB
    pub memory_kib: u32,
    /// Number of passes
    pub iterations: u32,
    /// Degree of parallelism
    pub parallelism: u32,
}

impl Default for Argon2Config {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

impl Argon2Config {
    /// Light parameters so test suites stay fast
    pub fn for_testing() -> Self {
        Self {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        }
    }

    fn params(&self) -> Result<Params> {
        Params::new(self.memory_kib, self.iterations, self.parallelism, None)
            .map_err(|e| crypto_error!("Invalid Argon2 parameters: {}", e))
    }
}

/// Salted Argon2id hasher producing PHC strings
pub struct CredentialHasher {
    argon2: Argon2<'static>,
}

impl CredentialHasher {
    pub fn new(config: &Argon2Config) -> Result<Self> {
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, config.params()?),
        })
    }

    pub fn for_testing() -> Self {
        Self {
            argon2: Argon2::new(
                Algorithm::Argon2id,
                Version::V0x13,
                Params::new(1024, 1, 1, None).unwrap_or_default(),
            ),
        }
    }

    /// Hash a secret with a fresh random salt
    pub fn hash_secret(&self, plaintext: &str) -> Result<String> {
        let salt = SaltString::encode_b64(&SecureMemory::secure_random_bytes::<SALT_LEN>())
            .map_err(|e| crypto_error!("Salt encoding failed: {}", e))?;
        let hash = self
            .argon2
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| crypto_error!("Credential hashing failed: {}", e))?;
        Ok(hash.to_string())
    }

    /// Check a candidate against a stored hash
    ///
    /// The candidate is re-derived with the stored salt and parameters and the
    /// digests are compared in constant time. Unparseable stored hashes never
    /// match.
    pub fn verify_secret(&self, plaintext: &str, stored: &str) -> bool {
        match self.rederive(plaintext, stored) {
            Ok(matches) => matches,
            Err(e) => {
                tracing::debug!("Credential verification failed before comparison: {}", e);
                false
            }
        }
    }

    fn rederive(&self, plaintext: &str, stored: &str) -> Result<bool> {
        let parsed = PasswordHash::new(stored)
            .map_err(|e| crypto_error!("Stored hash unreadable: {}", e))?;
        let params = Params::try_from(&parsed)
            .map_err(|e| crypto_error!("Stored hash parameters invalid: {}", e))?;
        let expected = parsed
            .hash
            .ok_or_else(|| crypto_error!("Stored hash has no digest"))?;
        let salt = parsed
            .salt
            .ok_or_else(|| crypto_error!("Stored hash has no salt"))?;

        let candidate = self
            .argon2
            .hash_password_customized(
                plaintext.as_bytes(),
                Some(parsed.algorithm),
                parsed.version,
                params,
                salt,
            )
            .map_err(|e| crypto_error!("Credential hashing failed: {}", e))?;
        let candidate = candidate
            .hash
            .ok_or_else(|| crypto_error!("Derived hash has no digest"))?;

        Ok(SecureMemory::constant_time_eq(
            candidate.as_bytes(),
            expected.as_bytes(),
        ))
    }
}

/// Deterministic keyed lookup hash of an identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityHash([u8; 32]);

impl IdentityHash {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex form for the uniqueness-indexed column
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// Keyed Blake3 hasher for equality lookups
pub struct IdentityHasher {
    key: [u8; 32],
}

impl IdentityHasher {
    pub fn new(keys: &KeyRing) -> Result<Self> {
        Self::with_key(&keys.identity_key)
    }

    pub fn with_key(key: &SecretKey) -> Result<Self> {
        Ok(Self {
            key: key.as_array("identity key")?,
        })
    }

    /// Hash a national ID for duplicate detection
    ///
    /// The bytes are hashed exactly as given. Distinct spellings of one ID
    /// hash differently, so callers store IDs in a single format.
    pub fn hash(&self, plaintext: &str) -> IdentityHash {
        let mut hasher = blake3::Hasher::new_keyed(&self.key);
        hasher.update(IDENTITY_DOMAIN);
        hasher.update(plaintext.as_bytes());
        IdentityHash(hasher.finalize().into())
    }
}

impl Drop for IdentityHasher {
    fn drop(&mut self) {
        use zeroize::Zeroize;
        self.key.zeroize();
    }
}
