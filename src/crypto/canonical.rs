//! Canonical byte encoding of attendance events
//!
//! Layout: a domain tag followed by five fields, each written as a 4-byte
//! big-endian length and the field's canonical UTF-8 text:
//!
//! ```text
//! len(tag) tag | len(id) id | len(date) YYYY-MM-DD | len(status) status | len(lat) lat | len(lon) lon
//! ```
//!
//! Length prefixes make the encoding injective regardless of field content.
//! Coordinates use [`Coordinate::canonical`] so the bytes never depend on float
//! formatting.
//!
//! [`Coordinate::canonical`]: crate::types::Coordinate::canonical

use crate::Result;
use crate::types::AttendanceEvent;

/// Domain separation tag, bumped if the layout ever changes
pub const CANONICAL_DOMAIN: &[u8] = b"attendance-event/v1";

/// Deterministic serializer for MAC input
pub struct CanonicalEncoder;

impl CanonicalEncoder {
    /// Encode a parsed event
    pub fn encode(event: &AttendanceEvent) -> Vec<u8> {
        let employee_id = event.employee_id.to_string();
        let date_key = event.date_key();
        let latitude = event.latitude.canonical();
        let longitude = event.longitude.canonical();

        let fields: [&[u8]; 6] = [
            CANONICAL_DOMAIN,
            employee_id.as_bytes(),
            date_key.as_bytes(),
            event.status.as_str().as_bytes(),
            latitude.as_bytes(),
            longitude.as_bytes(),
        ];

        let capacity = fields.iter().map(|f| f.len() + 4).sum();
        let mut out = Vec::with_capacity(capacity);
        for field in fields {
            // Field lengths are bounded by parsing, far below u32::MAX
            out.extend_from_slice(&(field.len() as u32).to_be_bytes());
            out.extend_from_slice(field);
        }
        out
    }

    /// Parse and encode raw fields in one step
    ///
    /// Fails with [`crate::Error::Encoding`] if a field is missing or malformed.
    pub fn encode_fields(
        employee_id: i64,
        date_key: &str,
        status: &str,
        latitude: &str,
        longitude: &str,
    ) -> Result<Vec<u8>> {
        let event = AttendanceEvent::parse(employee_id, date_key, status, latitude, longitude)?;
        Ok(Self::encode(&event))
    }
}
