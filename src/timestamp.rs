//! Wall-clock timestamps carried in payloads.
//!
//! Send times are decimal seconds since the Unix epoch with microsecond
//! precision, e.g. `1700000000.123456`.

use chrono::{DateTime, Utc};

use crate::{Result, TrafficError};

/// Current wall-clock time.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Seconds since the epoch as a float.
pub fn epoch_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp() as f64 + f64::from(at.timestamp_subsec_micros()) / 1_000_000.0
}

/// Render a time the way it is embedded in payloads.
pub fn format_epoch(at: DateTime<Utc>) -> String {
    format!("{}.{:06}", at.timestamp(), at.timestamp_subsec_micros())
}

/// Parse an embedded timestamp. Surrounding whitespace is ignored.
pub fn parse_epoch(raw: &str) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| TrafficError::invalid_timestamp(raw))
}
