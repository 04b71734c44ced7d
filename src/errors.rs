//! Error handling for the attendance trust core

/// Result type alias for the attendance trust core
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the attendance trust core
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A field handed to canonicalization was missing or malformed
    #[error("Encoding error in {field}: {reason}")]
    Encoding { field: String, reason: String },

    /// A stored MAC is present but has the wrong length or encoding
    #[error("Malformed MAC tag: {reason}")]
    MalformedTag { reason: String },

    /// Ciphertext or MAC failed authentication.
    ///
    /// Wrong-key and tampered-blob failures share this variant and message.
    #[error("Integrity check failed")]
    Integrity,

    /// Secret material is missing or invalid
    #[error("Key provisioning error: {message}")]
    KeyProvisioning { message: String },

    /// One-time code rejected. Wrong, used and expired codes are not distinguished.
    #[error("Invalid or expired OTP")]
    InvalidOrExpiredOtp,

    /// Cryptographic primitive errors
    #[error("Cryptographic error: {message}")]
    Crypto { message: String },

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Create a new encoding error
    pub fn encoding(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Encoding {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a new malformed tag error
    pub fn malformed_tag(reason: impl Into<String>) -> Self {
        Self::MalformedTag {
            reason: reason.into(),
        }
    }

    /// Create a new key provisioning error
    pub fn key_provisioning(message: impl Into<String>) -> Self {
        Self::KeyProvisioning {
            message: message.into(),
        }
    }

    /// Create a new crypto error
    pub fn crypto(message: impl Into<String>) -> Self {
        Self::Crypto {
            message: message.into(),
        }
    }

    /// Create a new internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// True for failures that mean "data did not authenticate"
    pub fn is_integrity_failure(&self) -> bool {
        matches!(self, Self::Integrity | Self::MalformedTag { .. })
    }
}

/// Convenience macros for creating specific error types
#[macro_export]
macro_rules! crypto_error {
    ($msg:expr) => {
        $crate::Error::crypto($msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::crypto(format!($fmt, $($arg)*))
    };
}

#[macro_export]
macro_rules! key_error {
    ($msg:expr) => {
        $crate::Error::key_provisioning($msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::key_provisioning(format!($fmt, $($arg)*))
    };
}
