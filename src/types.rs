//! # Core Types for the Attendance Trust Core
//!
//! This module defines the data structures that flow through the integrity,
//! encryption and OTP engines. Attendance fields are parsed into strict types
//! before they are canonicalized, so the bytes that get signed never depend on
//! how a caller happened to format a number or a date.
//!
//! ## Type Categories
//!
//! ### Attendance Fields
//! - [`AttendanceStatus`]: `present` or `absent`
//! - [`Coordinate`]: exact fixed-point latitude/longitude
//! - [`AttendanceEvent`]: the five fields bound by the MAC
//!
//! ### Integrity
//! - [`MacTag`]: 32-byte HMAC-SHA256 tag
//! - [`IntegrityStatus`]: verification outcome for a stored record
//!
//! ## Usage Examples
//!
//! ```rust
//! use attendance_trust::types::{AttendanceEvent, AttendanceStatus};
//!
//! let event = AttendanceEvent::parse(7, "2024-05-01", "present", "33.642", "73.012").unwrap();
//! assert_eq!(event.status, AttendanceStatus::Present);
//! assert_eq!(event.latitude.canonical(), "33.64200000");
//! ```

use crate::{Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Calendar date format used for the date key
pub const DATE_KEY_FORMAT: &str = "%Y-%m-%d";

/// Number of fractional digits kept for coordinates
pub const COORDINATE_FRACTION_DIGITS: usize = 8;

const COORDINATE_SCALE: i64 = 100_000_000;

/// Longest integer part, leading zeros aside, accepted before range checks (guards the i64 math)
const MAX_INTEGER_DIGITS: usize = 6;

/// Attendance status for a single day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
}

impl AttendanceStatus {
    /// Wire form used in canonical encoding and storage
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttendanceStatus {
    type Err = Error;

    /// Parse a status. Matching is case-sensitive so that `Present` and
    /// `present` cannot both verify against one MAC.
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "present" => Ok(Self::Present),
            "absent" => Ok(Self::Absent),
            "" => Err(Error::encoding("status", "missing")),
            other => Err(Error::encoding(
                "status",
                format!("unknown status '{other}'"),
            )),
        }
    }
}

/// Which coordinate axis a value belongs to (determines the valid range)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Latitude,
    Longitude,
}

impl Axis {
    fn field(&self) -> &'static str {
        match self {
            Self::Latitude => "latitude",
            Self::Longitude => "longitude",
        }
    }

    fn limit(&self) -> i64 {
        match self {
            Self::Latitude => 90 * COORDINATE_SCALE,
            Self::Longitude => 180 * COORDINATE_SCALE,
        }
    }
}

/// A latitude or longitude stored as an exact fixed-point decimal
///
/// Coordinates arrive as decimal strings. They are parsed digit by digit into
/// an integer count of 1e-8 degrees, never through a float, so the value that
/// is signed is exactly the value that is later verified.
///
/// # Examples
///
/// ```rust
/// use attendance_trust::types::Coordinate;
///
/// let lat = Coordinate::latitude("33.642").unwrap();
/// assert_eq!(lat.canonical(), "33.64200000");
///
/// // Same value, different spelling, same canonical form
/// let again = Coordinate::latitude("33.6420").unwrap();
/// assert_eq!(lat, again);
///
/// assert!(Coordinate::latitude("91").is_err());
/// assert!(Coordinate::longitude("1e3").is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Coordinate {
    scaled: i64,
}

impl Coordinate {
    /// Parse a latitude in degrees (-90 ..= 90)
    pub fn latitude(text: &str) -> Result<Self> {
        Self::parse(text, Axis::Latitude)
    }

    /// Parse a longitude in degrees (-180 ..= 180)
    pub fn longitude(text: &str) -> Result<Self> {
        Self::parse(text, Axis::Longitude)
    }

    /// Parse a decimal string for the given axis
    pub fn parse(text: &str, axis: Axis) -> Result<Self> {
        let field = axis.field();
        if text.is_empty() {
            return Err(Error::encoding(field, "missing"));
        }

        let (negative, digits) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text),
        };

        let (int_part, frac_part) = match digits.split_once('.') {
            Some((int_part, frac_part)) => {
                if frac_part.is_empty() {
                    return Err(Error::encoding(field, "trailing decimal point"));
                }
                (int_part, frac_part)
            }
            None => (digits, ""),
        };

        if int_part.is_empty()
            || !int_part.bytes().all(|b| b.is_ascii_digit())
            || !frac_part.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(Error::encoding(field, "not a plain decimal number"));
        }

        if frac_part.len() > COORDINATE_FRACTION_DIGITS {
            return Err(Error::encoding(
                field,
                format!("more than {COORDINATE_FRACTION_DIGITS} fractional digits"),
            ));
        }

        let significant = int_part.trim_start_matches('0');
        if significant.len() > MAX_INTEGER_DIGITS {
            return Err(Error::encoding(field, "out of range"));
        }

        let int_value: i64 = if significant.is_empty() {
            0
        } else {
            significant
                .parse()
                .map_err(|_| Error::encoding(field, "not a plain decimal number"))?
        };
        let frac_value: i64 = format!("{frac_part:0<width$}", width = COORDINATE_FRACTION_DIGITS)
            .parse()
            .map_err(|_| Error::encoding(field, "not a plain decimal number"))?;

        let magnitude = int_value * COORDINATE_SCALE + frac_value;
        Self::checked(if negative { -magnitude } else { magnitude }, axis)
    }

    /// Build a coordinate from floating point degrees, rounded to 8 decimals
    pub fn from_degrees(degrees: f64, axis: Axis) -> Result<Self> {
        if !degrees.is_finite() {
            return Err(Error::encoding(axis.field(), "not a finite number"));
        }
        let scaled = (degrees * COORDINATE_SCALE as f64).round();
        if scaled.abs() > axis.limit() as f64 {
            return Err(Error::encoding(axis.field(), "out of range"));
        }
        Self::checked(scaled as i64, axis)
    }

    fn checked(scaled: i64, axis: Axis) -> Result<Self> {
        if scaled.abs() > axis.limit() {
            return Err(Error::encoding(axis.field(), "out of range"));
        }
        Ok(Self { scaled })
    }

    /// Canonical text form: optional `-`, integer part, exactly 8 fractional digits
    pub fn canonical(&self) -> String {
        let sign = if self.scaled < 0 { "-" } else { "" };
        let magnitude = self.scaled.abs();
        format!(
            "{sign}{}.{:0width$}",
            magnitude / COORDINATE_SCALE,
            magnitude % COORDINATE_SCALE,
            width = COORDINATE_FRACTION_DIGITS
        )
    }

    /// Approximate value in degrees, for display only
    pub fn to_degrees(&self) -> f64 {
        self.scaled as f64 / COORDINATE_SCALE as f64
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

/// The five fields of an attendance record bound by its MAC
///
/// Immutable once signed: the MAC is derived from exactly these fields via
/// [`crate::crypto::CanonicalEncoder`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceEvent {
    pub employee_id: i64,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub latitude: Coordinate,
    pub longitude: Coordinate,
}

impl AttendanceEvent {
    /// Parse raw stored or submitted fields into an event
    ///
    /// Empty strings count as absent fields and fail with an encoding error.
    pub fn parse(
        employee_id: i64,
        date_key: &str,
        status: &str,
        latitude: &str,
        longitude: &str,
    ) -> Result<Self> {
        if employee_id <= 0 {
            return Err(Error::encoding("employee_id", "must be a positive integer"));
        }

        if date_key.is_empty() {
            return Err(Error::encoding("date_key", "missing"));
        }
        let date = NaiveDate::parse_from_str(date_key, DATE_KEY_FORMAT)
            .map_err(|e| Error::encoding("date_key", e.to_string()))?;

        Ok(Self {
            employee_id,
            date,
            status: status.parse()?,
            latitude: Coordinate::latitude(latitude)?,
            longitude: Coordinate::longitude(longitude)?,
        })
    }

    /// Canonical date key (`YYYY-MM-DD`)
    pub fn date_key(&self) -> String {
        self.date.format(DATE_KEY_FORMAT).to_string()
    }
}

/// Rectangular area in which attendance may be marked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geofence {
    pub min_latitude: Coordinate,
    pub max_latitude: Coordinate,
    pub min_longitude: Coordinate,
    pub max_longitude: Coordinate,
}

impl Geofence {
    /// Build a geofence from decimal strings
    pub fn new(min_lat: &str, max_lat: &str, min_lon: &str, max_lon: &str) -> Result<Self> {
        let fence = Self {
            min_latitude: Coordinate::latitude(min_lat)?,
            max_latitude: Coordinate::latitude(max_lat)?,
            min_longitude: Coordinate::longitude(min_lon)?,
            max_longitude: Coordinate::longitude(max_lon)?,
        };
        if fence.min_latitude > fence.max_latitude || fence.min_longitude > fence.max_longitude {
            return Err(Error::encoding("geofence", "minimum exceeds maximum"));
        }
        Ok(fence)
    }

    /// Inclusive containment check
    pub fn contains(&self, latitude: &Coordinate, longitude: &Coordinate) -> bool {
        (self.min_latitude..=self.max_latitude).contains(latitude)
            && (self.min_longitude..=self.max_longitude).contains(longitude)
    }
}

impl Default for Geofence {
    /// NUST H-12 Islamabad campus box
    fn default() -> Self {
        Self {
            min_latitude: Coordinate { scaled: 3_360_000_000 },
            max_latitude: Coordinate { scaled: 3_370_000_000 },
            min_longitude: Coordinate { scaled: 7_295_000_000 },
            max_longitude: Coordinate { scaled: 7_325_000_000 },
        }
    }
}

/// Length of an HMAC-SHA256 tag in bytes
pub const MAC_TAG_LEN: usize = 32;

/// A fixed-length attendance authentication tag
///
/// Stored as lowercase hex (64 characters) in the attendance MAC column.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct MacTag([u8; MAC_TAG_LEN]);

impl MacTag {
    pub fn from_bytes(bytes: [u8; MAC_TAG_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; MAC_TAG_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Decode a stored tag
    ///
    /// Fails with [`Error::MalformedTag`] when the text has the wrong length or
    /// is not hex. A well-formed tag that simply does not match is not an error
    /// here; that is decided by verification.
    pub fn from_hex(stored: &str) -> Result<Self> {
        if stored.len() != MAC_TAG_LEN * 2 {
            return Err(Error::malformed_tag(format!(
                "expected {} hex characters, got {}",
                MAC_TAG_LEN * 2,
                stored.len()
            )));
        }
        let mut bytes = [0u8; MAC_TAG_LEN];
        hex::decode_to_slice(stored, &mut bytes)
            .map_err(|e| Error::malformed_tag(format!("invalid hex: {e}")))?;
        Ok(Self(bytes))
    }

    /// Short prefix that is safe to log
    pub fn log_prefix(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Debug for MacTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacTag({}..)", self.log_prefix())
    }
}

/// Outcome of checking a stored attendance record against its MAC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityStatus {
    /// MAC present and valid under the current or a retired key
    Verified,
    /// MAC present but wrong, malformed, or bound to different fields
    Tampered,
    /// No MAC stored for the record
    Unsigned,
}

impl IntegrityStatus {
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified)
    }

    /// Records flagged to readers. Unsigned rows are not tampered, only unverified.
    pub fn tampered(&self) -> bool {
        matches!(self, Self::Tampered)
    }
}
