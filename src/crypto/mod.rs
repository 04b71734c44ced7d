//! Cryptographic primitives for the attendance trust core

pub mod canonical;
pub mod credential;
pub mod encryption;
pub mod integrity;
pub mod keys;
pub mod otp;

use rand::RngCore;

pub use crate::types::MacTag;

pub use canonical::CanonicalEncoder;
pub use credential::{Argon2Config, CredentialHasher, IdentityHash, IdentityHasher};
pub use encryption::{EncryptedSecret, EncryptionEngine};
pub use integrity::{IntegrityEngine, KeyGeneration};
pub use keys::{GeneratedKeys, KeyBootstrap, KeyRing, SecretKey};
pub use otp::{
    IssuedOtp, OtpCleanupService, OtpCleanupStats, OtpConfig, OtpLifecycleManager, OtpRecord,
    OtpServiceStats, OtpState,
};

/// Secure memory utilities
pub struct SecureMemory;

impl SecureMemory {
    /// Securely compare two byte arrays in constant time
    ///
    /// Length is not secret: slices of different length compare unequal
    /// immediately.
    pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
        use subtle::ConstantTimeEq;
        if a.len() != b.len() {
            return false;
        }
        a.ct_eq(b).into()
    }

    /// Generate cryptographically secure random bytes
    pub fn secure_random_bytes<const N: usize>() -> [u8; N] {
        let mut bytes = [0u8; N];
        rand::thread_rng().fill_bytes(&mut bytes);
        bytes
    }
}
