//! Boundary facade over the trust engines
//!
//! [`TrustCore`] is what request handlers hold. It turns cryptographic
//! failures into flags and placeholders so listing and verification paths
//! keep serving; only malformed input and key provisioning problems come back
//! as errors.

use crate::config::SecurityConfig;
use crate::crypto::{
    CanonicalEncoder, CredentialHasher, EncryptionEngine, IdentityHasher, IntegrityEngine,
    IssuedOtp, KeyGeneration, OtpCleanupService, OtpLifecycleManager,
};
use crate::types::{AttendanceEvent, Coordinate, Geofence, IntegrityStatus, MacTag};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Shown in place of a national ID that fails to decrypt
pub const DECRYPT_FAILURE_PLACEHOLDER: &str = "Unable to decrypt";

/// Attendance row annotated with its integrity outcome, as returned to readers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewedAttendance {
    pub employee_id: i64,
    pub date: String,
    pub status: String,
    pub latitude: String,
    pub longitude: String,
    pub integrity: IntegrityStatus,
    pub integrity_verified: bool,
    pub tampered: bool,
}

impl ReviewedAttendance {
    fn new(event: &AttendanceEvent, integrity: IntegrityStatus) -> Self {
        Self {
            employee_id: event.employee_id,
            date: event.date_key(),
            status: event.status.to_string(),
            latitude: event.latitude.canonical(),
            longitude: event.longitude.canonical(),
            integrity,
            integrity_verified: integrity.is_verified(),
            tampered: integrity.tampered(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Process-wide trust core
///
/// Built once at startup from a [`SecurityConfig`] and shared behind an `Arc`.
/// Everything except the OTP store is read-only after construction.
pub struct TrustCore {
    integrity: IntegrityEngine,
    encryption: EncryptionEngine,
    identity: IdentityHasher,
    credentials: CredentialHasher,
    otp: Arc<OtpLifecycleManager>,
    geofence: Geofence,
    dev_mode: bool,
}

impl TrustCore {
    pub fn new(config: &SecurityConfig) -> Result<Self> {
        let core = Self {
            integrity: IntegrityEngine::new(&config.keys),
            encryption: EncryptionEngine::new(&config.keys)?,
            identity: IdentityHasher::new(&config.keys)?,
            credentials: CredentialHasher::new(&config.argon2)?,
            otp: Arc::new(OtpLifecycleManager::new(
                config.otp.clone(),
                CredentialHasher::new(&config.argon2)?,
            )?),
            geofence: config.geofence,
            dev_mode: config.dev_mode,
        };

        tracing::info!(
            "🛡️  Trust core ready: retired_mac_keys={}, otp_ttl={}s, dev_mode={}",
            core.integrity.retired_key_count(),
            config.otp.ttl_seconds,
            core.dev_mode
        );

        Ok(core)
    }

    /// Trust core with random keys and light hashing parameters
    pub fn for_testing() -> Result<Self> {
        Self::new(&SecurityConfig::for_testing())
    }

    // ---- attendance integrity ----

    /// MAC to persist alongside an attendance row (lowercase hex)
    pub fn sign_attendance(&self, event: &AttendanceEvent) -> String {
        let tag = self.integrity.sign(&CanonicalEncoder::encode(event));
        tracing::debug!(
            "✍️  Attendance signed: employee={}, date={}, tag={}",
            event.employee_id,
            event.date_key(),
            tag.log_prefix()
        );
        tag.to_hex()
    }

    /// Sign raw submitted fields, rejecting malformed input
    pub fn sign_attendance_fields(
        &self,
        employee_id: i64,
        date_key: &str,
        status: &str,
        latitude: &str,
        longitude: &str,
    ) -> Result<String> {
        let event = AttendanceEvent::parse(employee_id, date_key, status, latitude, longitude)?;
        Ok(self.sign_attendance(&event))
    }

    /// True when the stored MAC authenticates the row
    pub fn verify_attendance(&self, event: &AttendanceEvent, stored_mac: &str) -> bool {
        self.review_attendance(event, Some(stored_mac)).is_verified()
    }

    /// Classify a stored row as verified, tampered or unsigned
    pub fn review_attendance(
        &self,
        event: &AttendanceEvent,
        stored_mac: Option<&str>,
    ) -> IntegrityStatus {
        let status = self
            .integrity
            .check_stored(&CanonicalEncoder::encode(event), stored_mac);

        if status.tampered() {
            tracing::warn!(
                "🚨 Attendance tamper detected: employee={}, date={}",
                event.employee_id,
                event.date_key()
            );
        }

        status
    }

    /// Review many rows for a listing or report
    pub fn review_batch<'a, I>(&self, rows: I) -> Vec<ReviewedAttendance>
    where
        I: IntoIterator<Item = (&'a AttendanceEvent, Option<&'a str>)>,
    {
        let reviewed: Vec<ReviewedAttendance> = rows
            .into_iter()
            .map(|(event, stored_mac)| {
                ReviewedAttendance::new(event, self.review_attendance(event, stored_mac))
            })
            .collect();

        let tampered = reviewed.iter().filter(|row| row.tampered).count();
        let unsigned = reviewed
            .iter()
            .filter(|row| row.integrity == IntegrityStatus::Unsigned)
            .count();
        tracing::info!(
            "📋 Attendance review: rows={}, tampered={}, unsigned={}",
            reviewed.len(),
            tampered,
            unsigned
        );

        reviewed
    }

    /// MAC for a row whose MAC column is empty; `None` if it is already signed
    ///
    /// Signed rows are never re-signed here, even when their MAC does not
    /// verify, so backfilling cannot launder a tampered row.
    pub fn backfill_signature(
        &self,
        event: &AttendanceEvent,
        stored_mac: Option<&str>,
    ) -> Option<String> {
        match stored_mac.map(str::trim) {
            None | Some("") => Some(self.sign_attendance(event)),
            Some(_) => None,
        }
    }

    /// Fresh MAC for a row that only verifies under a retired key
    pub fn resign_if_retired(&self, event: &AttendanceEvent, stored_mac: &str) -> Option<String> {
        let tag = MacTag::from_hex(stored_mac.trim()).ok()?;
        let canonical = CanonicalEncoder::encode(event);
        match self.integrity.verify_detailed(&canonical, &tag) {
            Some(KeyGeneration::Retired(_)) => Some(self.integrity.sign(&canonical).to_hex()),
            _ => None,
        }
    }

    /// Whether a submitted location is inside the allowed area
    ///
    /// Always true in development mode.
    pub fn check_location(&self, latitude: &Coordinate, longitude: &Coordinate) -> bool {
        if self.dev_mode {
            return true;
        }
        let inside = self.geofence.contains(latitude, longitude);
        if !inside {
            tracing::info!("📍 Location outside geofence: {}, {}", latitude, longitude);
        }
        inside
    }

    // ---- national ID protection ----

    /// Encrypted text form for the employee's national ID column
    pub fn encrypt_national_id(&self, national_id: &str) -> Result<String> {
        self.encryption.encrypt_to_string(national_id)
    }

    /// Decrypt a stored national ID
    pub fn decrypt_national_id(&self, stored: &str) -> Result<String> {
        self.encryption.decrypt_str(stored)
    }

    /// Plaintext for authorized display, or [`DECRYPT_FAILURE_PLACEHOLDER`]
    pub fn display_national_id(&self, stored: &str) -> String {
        match self.decrypt_national_id(stored) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                tracing::warn!("⚠️  National ID decryption failed: {}", e);
                DECRYPT_FAILURE_PLACEHOLDER.to_string()
            }
        }
    }

    /// Deterministic hash for the uniqueness-indexed column
    pub fn national_id_lookup_hash(&self, national_id: &str) -> String {
        self.identity.hash(national_id).to_hex()
    }

    // ---- credentials ----

    pub fn hash_secret(&self, plaintext: &str) -> Result<String> {
        self.credentials.hash_secret(plaintext)
    }

    pub fn verify_secret(&self, candidate: &str, stored: &str) -> bool {
        self.credentials.verify_secret(candidate, stored)
    }

    // ---- one-time codes ----

    /// Issue a code; the plaintext is returned once for delivery
    pub fn issue_otp(&self, owner: &str) -> Result<IssuedOtp> {
        self.otp.issue(owner)
    }

    /// Consume a code. Every failure reads as `false`.
    pub fn consume_otp(&self, owner: &str, candidate: &str) -> bool {
        match self.otp.consume(owner, candidate) {
            Ok(()) => true,
            Err(Error::InvalidOrExpiredOtp) => false,
            Err(e) => {
                tracing::error!("❌ OTP consumption failed: {}", e);
                false
            }
        }
    }

    pub fn otp_manager(&self) -> Arc<OtpLifecycleManager> {
        Arc::clone(&self.otp)
    }

    /// Background purge of expired codes, stopped through `stop_signal`
    pub fn otp_cleanup_service(
        &self,
        stop_signal: tokio::sync::mpsc::Receiver<()>,
    ) -> OtpCleanupService {
        OtpCleanupService::new(self.otp_manager(), stop_signal)
    }

    pub fn is_dev_mode(&self) -> bool {
        self.dev_mode
    }
}
