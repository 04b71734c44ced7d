//! One-time login codes
//!
//! Lifecycle of a single record: `issued -> used`, or `issued -> expired`
//! implicitly once `expires_at` passes. Both end states are terminal.
//!
//! - Several outstanding codes may exist per owner; issuing a new one never
//!   invalidates older unexpired codes, so repeated "resend" requests work.
//! - Only the Argon2 hash of a code is stored.
//! - Match and consume happen under one per-owner lock, so a code cannot be
//!   consumed twice by concurrent requests.
//! - Every failure is the same [`Error::InvalidOrExpiredOtp`]. When there is
//!   nothing to compare against, a dummy hash is still verified so the empty
//!   case takes about as long as a wrong code.

use crate::crypto::CredentialHasher;
use crate::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};
use uuid::Uuid;

/// Default code lifetime in seconds (10 minutes)
const DEFAULT_OTP_TTL: u64 = 600;

/// Number of decimal digits in a code
pub const OTP_DIGITS: usize = 6;

const OTP_MODULUS: u32 = 1_000_000;

/// Upper bound on code lifetime (1 day)
const MAX_TTL_SECONDS: u64 = 86_400;

/// Upper bound on used-record retention (30 days)
const MAX_RETENTION_SECONDS: u64 = 30 * 86_400;

/// OTP configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpConfig {
    /// Code lifetime in seconds
    pub ttl_seconds: u64,
    /// How often the background cleanup runs (seconds)
    pub cleanup_interval_seconds: u64,
    /// How long used records are kept before removal (seconds)
    pub used_retention_seconds: u64,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: DEFAULT_OTP_TTL,
            cleanup_interval_seconds: 300, // 5 minutes
            used_retention_seconds: 3600,  // 1 hour
        }
    }
}

impl OtpConfig {
    /// Configuration for testing with shorter timeouts
    pub fn for_testing() -> Self {
        Self {
            ttl_seconds: 60,
            cleanup_interval_seconds: 1,
            used_retention_seconds: 120,
        }
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.ttl_seconds == 0 || self.ttl_seconds > MAX_TTL_SECONDS {
            return Err(Error::internal(format!(
                "OTP TTL must be between 1 and {MAX_TTL_SECONDS} seconds"
            )));
        }

        if self.used_retention_seconds > MAX_RETENTION_SECONDS {
            return Err(Error::internal(format!(
                "OTP retention must not exceed {MAX_RETENTION_SECONDS} seconds"
            )));
        }

        if self.cleanup_interval_seconds == 0 {
            return Err(Error::internal("OTP cleanup interval must be positive"));
        }

        Ok(())
    }

    // Bounded by validate(), so the casts cannot wrap
    fn ttl(&self) -> Duration {
        Duration::seconds(self.ttl_seconds as i64)
    }

    fn retention(&self) -> Duration {
        Duration::seconds(self.used_retention_seconds as i64)
    }
}

/// State of a stored code. Expiry is derived from time, not stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OtpState {
    Issued,
    Used { used_at: DateTime<Utc> },
}

/// Stored one-time code (hash only)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OtpRecord {
    pub record_id: Uuid,
    pub owner: String,
    pub code_hash: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub state: OtpState,
}

impl OtpRecord {
    fn new(owner: String, code_hash: String, issued_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            record_id: Uuid::new_v4(),
            owner,
            code_hash,
            issued_at,
            expires_at: issued_at + ttl,
            state: OtpState::Issued,
        }
    }

    pub fn is_used(&self) -> bool {
        matches!(self.state, OtpState::Used { .. })
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Unused and unexpired
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_used() && !self.is_expired_at(now)
    }

    fn mark_used(&mut self, now: DateTime<Utc>) -> Result<()> {
        match self.state {
            OtpState::Issued => {
                self.state = OtpState::Used { used_at: now };
                Ok(())
            }
            OtpState::Used { .. } => Err(Error::InvalidOrExpiredOtp),
        }
    }
}

/// A freshly issued code, returned once for out-of-band delivery
#[derive(Clone)]
pub struct IssuedOtp {
    pub record_id: Uuid,
    pub owner: String,
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for IssuedOtp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedOtp")
            .field("record_id", &self.record_id)
            .field("owner", &self.owner)
            .field("code", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

type OwnerSlot = Arc<Mutex<Vec<OtpRecord>>>;

/// In-memory OTP store with atomic match-and-consume
pub struct OtpLifecycleManager {
    config: OtpConfig,
    hasher: CredentialHasher,
    /// Verified when an owner has no candidates, to keep failure timing uniform
    dummy_hash: String,
    /// owner -> that owner's records, each behind its own lock
    records: RwLock<HashMap<String, OwnerSlot>>,
}

impl OtpLifecycleManager {
    /// Create new OTP manager
    pub fn new(config: OtpConfig, hasher: CredentialHasher) -> Result<Self> {
        config.validate()?;
        let dummy_hash = hasher.hash_secret(&generate_code())?;
        Ok(Self {
            config,
            hasher,
            dummy_hash,
            records: RwLock::new(HashMap::new()),
        })
    }

    /// Create OTP manager for testing
    pub fn for_testing() -> Result<Self> {
        Self::new(OtpConfig::for_testing(), CredentialHasher::for_testing())
    }

    pub fn config(&self) -> &OtpConfig {
        &self.config
    }

    /// Issue a new code for `owner`
    pub fn issue(&self, owner: &str) -> Result<IssuedOtp> {
        self.issue_at(owner, Utc::now())
    }

    /// Issue a new code as of `now`
    ///
    /// Existing codes for the owner stay valid.
    pub fn issue_at(&self, owner: &str, now: DateTime<Utc>) -> Result<IssuedOtp> {
        let owner = normalize_owner(owner)?;
        let code = generate_code();
        let code_hash = self.hasher.hash_secret(&code)?;
        let record = OtpRecord::new(owner.clone(), code_hash, now, self.config.ttl());

        let issued = IssuedOtp {
            record_id: record.record_id,
            owner: owner.clone(),
            code,
            expires_at: record.expires_at,
        };

        {
            let mut records = self
                .records
                .write()
                .map_err(|_| Error::internal("OTP store write error"))?;
            let slot = records
                .entry(owner.clone())
                .or_insert_with(|| Arc::new(Mutex::new(Vec::new())));
            slot.lock()
                .map_err(|_| Error::internal("OTP owner lock poisoned"))?
                .push(record);
        }

        tracing::info!(
            "🔐 OTP issued: owner={}, record={}, expires_at={}",
            owner,
            issued.record_id,
            issued.expires_at
        );

        Ok(issued)
    }

    /// Try to consume `candidate` for `owner`
    pub fn consume(&self, owner: &str, candidate: &str) -> Result<()> {
        self.consume_at(owner, candidate, Utc::now())
    }

    /// Try to consume `candidate` for `owner` as of `now`
    ///
    /// Searches every unused, unexpired record for the owner and marks the
    /// first match used. The search, comparison and state change run under the
    /// owner's lock.
    pub fn consume_at(&self, owner: &str, candidate: &str, now: DateTime<Utc>) -> Result<()> {
        let owner = normalize_owner(owner).unwrap_or_default();
        let candidate = candidate.trim();
        let well_formed =
            candidate.len() == OTP_DIGITS && candidate.bytes().all(|b| b.is_ascii_digit());

        let slot = {
            let records = self
                .records
                .read()
                .map_err(|_| Error::internal("OTP store read error"))?;
            records.get(&owner).cloned()
        };

        let mut compared = false;
        if let (Some(slot), true) = (slot, well_formed) {
            let mut records = slot
                .lock()
                .map_err(|_| Error::internal("OTP owner lock poisoned"))?;

            let mut matched = None;
            for (index, record) in records.iter().enumerate() {
                if !record.is_usable_at(now) {
                    continue;
                }
                compared = true;
                if self.hasher.verify_secret(candidate, &record.code_hash) {
                    matched = Some(index);
                    break;
                }
            }

            if let Some(index) = matched {
                let record = &mut records[index];
                record.mark_used(now)?;
                tracing::info!(
                    "🔐 OTP consumed: owner={}, record={}",
                    owner,
                    record.record_id
                );
                return Ok(());
            }
        }

        if !compared {
            let _ = self.hasher.verify_secret(candidate, &self.dummy_hash);
        }

        tracing::info!("🔐 OTP rejected: owner={}", owner);
        Err(Error::InvalidOrExpiredOtp)
    }

    /// All records held for an owner, newest last
    pub fn records_for(&self, owner: &str) -> Result<Vec<OtpRecord>> {
        let owner = normalize_owner(owner)?;
        let slot = {
            let records = self
                .records
                .read()
                .map_err(|_| Error::internal("OTP store read error"))?;
            records.get(&owner).cloned()
        };

        match slot {
            Some(slot) => Ok(slot
                .lock()
                .map_err(|_| Error::internal("OTP owner lock poisoned"))?
                .clone()),
            None => Ok(Vec::new()),
        }
    }

    /// Remove expired records and used records past retention
    pub fn purge_expired(&self) -> Result<OtpCleanupStats> {
        self.purge_expired_at(Utc::now())
    }

    /// Remove expired records and used records past retention, as of `now`
    ///
    /// Expired records are inert: they are only ever deleted, never revived.
    pub fn purge_expired_at(&self, now: DateTime<Utc>) -> Result<OtpCleanupStats> {
        let mut records = self
            .records
            .write()
            .map_err(|_| Error::internal("OTP store write error"))?;

        let retention = self.config.retention();
        let mut stats = OtpCleanupStats::default();

        for slot in records.values() {
            let mut owner_records = slot
                .lock()
                .map_err(|_| Error::internal("OTP owner lock poisoned"))?;
            stats.initial_records += owner_records.len();

            owner_records.retain(|record| match &record.state {
                OtpState::Used { used_at } => {
                    if now - *used_at > retention {
                        stats.used_removed += 1;
                        false
                    } else {
                        true
                    }
                }
                OtpState::Issued => {
                    if record.is_expired_at(now) {
                        stats.expired_removed += 1;
                        false
                    } else {
                        true
                    }
                }
            });

            stats.final_records += owner_records.len();
        }

        records.retain(|_, slot| match slot.lock() {
            Ok(owner_records) => !owner_records.is_empty(),
            Err(_) => true,
        });

        stats.total_removed = stats.initial_records - stats.final_records;
        if stats.total_removed > 0 {
            tracing::info!(
                "🧹 OTP cleanup: removed {} records (expired: {}, used: {})",
                stats.total_removed,
                stats.expired_removed,
                stats.used_removed
            );
        }

        Ok(stats)
    }

    /// Get OTP store statistics
    pub fn stats(&self) -> Result<OtpServiceStats> {
        self.stats_at(Utc::now())
    }

    pub fn stats_at(&self, now: DateTime<Utc>) -> Result<OtpServiceStats> {
        let records = self
            .records
            .read()
            .map_err(|_| Error::internal("OTP store read error"))?;

        let mut stats = OtpServiceStats {
            owners: records.len(),
            ..OtpServiceStats::default()
        };

        for slot in records.values() {
            let owner_records = slot
                .lock()
                .map_err(|_| Error::internal("OTP owner lock poisoned"))?;
            for record in owner_records.iter() {
                stats.total_records += 1;
                if record.is_used() {
                    stats.used_records += 1;
                } else if record.is_expired_at(now) {
                    stats.expired_records += 1;
                } else {
                    stats.outstanding_records += 1;
                }
            }
        }

        Ok(stats)
    }
}

/// Uniformly random zero-padded decimal code
fn generate_code() -> String {
    let value = rand::thread_rng().gen_range(0..OTP_MODULUS);
    format!("{value:0width$}", width = OTP_DIGITS)
}

fn normalize_owner(owner: &str) -> Result<String> {
    let owner = owner.trim().to_lowercase();
    if owner.is_empty() {
        return Err(Error::encoding("owner", "missing"));
    }
    Ok(owner)
}

/// OTP cleanup statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OtpCleanupStats {
    pub initial_records: usize,
    pub final_records: usize,
    pub total_removed: usize,
    pub expired_removed: usize,
    pub used_removed: usize,
}

/// OTP store statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OtpServiceStats {
    pub total_records: usize,
    pub outstanding_records: usize,
    pub used_records: usize,
    pub expired_records: usize,
    pub owners: usize,
}

/// Background service for periodic OTP cleanup
pub struct OtpCleanupService {
    manager: Arc<OtpLifecycleManager>,
    stop_signal: tokio::sync::mpsc::Receiver<()>,
    cleanup_interval: std::time::Duration,
}

impl OtpCleanupService {
    /// Create new cleanup service
    pub fn new(
        manager: Arc<OtpLifecycleManager>,
        stop_signal: tokio::sync::mpsc::Receiver<()>,
    ) -> Self {
        let cleanup_interval =
            std::time::Duration::from_secs(manager.config.cleanup_interval_seconds);

        Self {
            manager,
            stop_signal,
            cleanup_interval,
        }
    }

    /// Run until a stop signal arrives or the sender is dropped
    pub async fn run(mut self) {
        let mut interval = tokio::time::interval(self.cleanup_interval);

        tracing::info!(
            "🧹 OTP cleanup service started (interval: {:?})",
            self.cleanup_interval
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.manager.purge_expired() {
                        tracing::error!("❌ OTP cleanup failed: {}", e);
                    }
                }
                _ = self.stop_signal.recv() => {
                    tracing::info!("🛑 OTP cleanup service stopping");
                    break;
                }
            }
        }

        tracing::info!("✅ OTP cleanup service stopped");
    }
}
