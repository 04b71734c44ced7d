//! Secure configuration management for the attendance trust core
//!
//! Loads key material and tunables from environment variables with validation.
//! Key variables are documented in [`crate::crypto::keys`].

use crate::crypto::{Argon2Config, KeyRing, OtpConfig};
use crate::types::Geofence;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Enables development-only conveniences (generated keys, no geofence)
pub const DEV_MODE_VAR: &str = "ATTENDANCE_DEV_MODE";

/// Security configuration for cryptographic operations
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    /// Process-wide keys, read-only after startup
    pub keys: KeyRing,

    /// Development mode flag
    pub dev_mode: bool,

    /// OTP lifetime and cleanup settings
    pub otp: OtpConfig,

    /// Credential hashing cost
    pub argon2: Argon2Config,

    /// Area in which attendance may be marked
    pub geofence: Geofence,
}

impl SecurityConfig {
    /// Load security configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if present
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load security configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let dev_mode = lookup(DEV_MODE_VAR)
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        if dev_mode {
            tracing::warn!("⚠️  {} is enabled; do not use this configuration in production", DEV_MODE_VAR);
        }

        let keys = KeyRing::from_lookup(&lookup, dev_mode)?;

        let defaults = OtpConfig::default();
        let otp = OtpConfig {
            ttl_seconds: parse_or(&lookup, "ATTENDANCE_OTP_TTL_SECONDS", defaults.ttl_seconds)?,
            cleanup_interval_seconds: parse_or(
                &lookup,
                "ATTENDANCE_OTP_CLEANUP_INTERVAL_SECONDS",
                defaults.cleanup_interval_seconds,
            )?,
            used_retention_seconds: parse_or(
                &lookup,
                "ATTENDANCE_OTP_RETENTION_SECONDS",
                defaults.used_retention_seconds,
            )?,
        };
        otp.validate()?;

        let argon_defaults = Argon2Config::default();
        let argon2 = Argon2Config {
            memory_kib: parse_or(&lookup, "ATTENDANCE_ARGON2_MEMORY_KIB", argon_defaults.memory_kib)?,
            iterations: parse_or(&lookup, "ATTENDANCE_ARGON2_ITERATIONS", argon_defaults.iterations)?,
            parallelism: parse_or(&lookup, "ATTENDANCE_ARGON2_PARALLELISM", argon_defaults.parallelism)?,
        };

        let geofence = match lookup("ATTENDANCE_GEOFENCE") {
            Some(bounds) => parse_geofence(&bounds)?,
            None => Geofence::default(),
        };

        Ok(Self {
            keys,
            dev_mode,
            otp,
            argon2,
            geofence,
        })
    }

    /// Create configuration for testing
    pub fn for_testing() -> Self {
        Self {
            keys: KeyRing::for_testing(),
            dev_mode: false,
            otp: OtpConfig::for_testing(),
            argon2: Argon2Config::for_testing(),
            geofence: Geofence::default(),
        }
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| Error::internal(format!("Invalid {name}"))),
        None => Ok(default),
    }
}

/// `min_lat,max_lat,min_lon,max_lon`
fn parse_geofence(bounds: &str) -> Result<Geofence> {
    let parts: Vec<&str> = bounds.split(',').map(str::trim).collect();
    match parts.as_slice() {
        [min_lat, max_lat, min_lon, max_lon] => Geofence::new(min_lat, max_lat, min_lon, max_lon),
        _ => Err(Error::internal(
            "ATTENDANCE_GEOFENCE must be min_lat,max_lat,min_lon,max_lon",
        )),
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub security: SecurityConfig,
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment
    pub fn from_env() -> Result<Self> {
        let security = SecurityConfig::from_env()?;

        let logging = LoggingConfig {
            level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string()),
        };

        Ok(Self { security, logging })
    }

    /// Create configuration for testing
    pub fn for_testing() -> Self {
        Self {
            security: SecurityConfig::for_testing(),
            logging: LoggingConfig {
                level: "debug".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}
