//! Attendance trust core
//!
//! Tamper-evident attendance records, encrypted national IDs with a
//! deterministic lookup hash, salted credential hashing and one-time login
//! codes. Storage, HTTP and mail delivery live outside this crate.

pub mod config;
pub mod crypto;
pub mod errors;
pub mod trust;
pub mod types;

// Re-export commonly used types
pub use trust::{DECRYPT_FAILURE_PLACEHOLDER, ReviewedAttendance, TrustCore};
pub use config::{Config, LoggingConfig, SecurityConfig};
pub use errors::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize logging with the default configuration
pub fn init() -> Result<()> {
    init_with(&LoggingConfig::default())
}

/// Initialize logging
///
/// `RUST_LOG` takes precedence over `logging.level`. Calling this twice is not
/// an error; the first subscriber stays installed.
pub fn init_with(logging: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("attendance_trust={}", logging.level).into());

    let installed = match logging.format.as_str() {
        "pretty" => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .pretty()
            .try_init(),
        _ => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init(),
    };

    if installed.is_ok() {
        tracing::info!("🛡️  Attendance trust core v{} initialized", VERSION);
    }
    Ok(())
}
