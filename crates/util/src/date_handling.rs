//! # Date Handling Utilities
//!
//! WPS servers disagree on how `creationTime` is written: most emit RFC 3339,
//! some drop the offset or the `T` separator. Values without an offset are
//! interpreted as UTC.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

const NAIVE_FORMATS: [&str; 4] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];

/// Parse a `creationTime` attribute value.
///
/// # Returns
/// `None` when the value matches none of the accepted layouts.
///
/// # Example
/// ```rust
/// use wpsprobe_util::parse_creation_time;
///
/// let with_offset = parse_creation_time("2017-06-20T12:30:00+02:00").unwrap();
/// assert_eq!(with_offset.to_rfc3339(), "2017-06-20T10:30:00+00:00");
///
/// let naive = parse_creation_time("2017-06-20T12:30:00").unwrap();
/// assert_eq!(naive.to_rfc3339(), "2017-06-20T12:30:00+00:00");
///
/// assert!(parse_creation_time("yesterday").is_none());
/// ```
pub fn parse_creation_time(raw: &str) -> Option<DateTime<Utc>> {
    let value = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
