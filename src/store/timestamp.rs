//! Timestamp text as stored in the `sensor_readings.timestamp` column.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

use crate::error::{Error, Result};

/// Naive layouts accepted in addition to RFC 3339. Naive values are read as UTC.
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse a stored or published timestamp.
///
/// Accepts RFC 3339 (`2024-05-01T12:00:00Z`, `...+02:00`) and the naive
/// ISO-8601 forms that Python's `isoformat()` and SQLite's `CURRENT_TIMESTAMP`
/// produce.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc());
        }
    }

    Err(Error::QueryFailed(format!("unparseable timestamp {:?}", raw)))
}

/// Format a timestamp the way readings are written: RFC 3339, millisecond
/// precision, `Z` suffix. SQLite's `julianday()` understands this form.
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}
