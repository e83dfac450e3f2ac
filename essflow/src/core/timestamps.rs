//! Submission-time parsing for scheduler payloads.
//!
//! The scheduler reports `SubmissionDate` in several shapes depending on the
//! endpoint and release: RFC 3339 with or without offset, a space-separated
//! local form, or epoch milliseconds.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use thiserror::Error;

/// UTC timestamp used throughout the crate.
pub type Timestamp = DateTime<Utc>;

/// Errors that can occur during timestamp parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimestampError {
    /// The timestamp string is empty.
    #[error("Empty timestamp string")]
    EmptyString,

    /// The timestamp value is not in a recognised format.
    #[error("Invalid timestamp: {0}")]
    InvalidFormat(String),
}

/// Parses a scheduler submission timestamp.
///
/// Values without an offset are taken as UTC. Bare integers of 13 digits or
/// fewer are treated as epoch milliseconds when they exceed the seconds range.
pub fn parse_submission_time(input: &str) -> Result<Timestamp, TimestampError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(TimestampError::EmptyString);
    }

    if let Ok(num) = trimmed.parse::<i64>() {
        return parse_epoch(num).ok_or_else(|| TimestampError::InvalidFormat(trimmed.to_string()));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }

    let offset_formats = ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"];
    for fmt in offset_formats {
        if let Ok(dt) = DateTime::parse_from_str(trimmed, fmt) {
            return Ok(dt.with_timezone(&Utc));
        }
    }

    let naive_formats = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
    ];
    for fmt in naive_formats {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    Err(TimestampError::InvalidFormat(trimmed.to_string()))
}

fn parse_epoch(value: i64) -> Option<Timestamp> {
    // 10 digits covers seconds until 2286
    if value.unsigned_abs() < 10_000_000_000 {
        Utc.timestamp_opt(value, 0).single()
    } else {
        Utc.timestamp_millis_opt(value).single()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_rfc3339_with_offset() {
        let dt = parse_submission_time("2025-07-10T12:30:00.000+02:00").unwrap();
        assert_eq!(dt.hour(), 10);
        assert_eq!(dt.day(), 10);
    }

    #[test]
    fn test_parse_zulu() {
        let dt = parse_submission_time("2025-07-10T12:30:00Z").unwrap();
        assert_eq!(dt.hour(), 12);
    }

    #[test]
    fn test_parse_naive_is_utc() {
        let dt = parse_submission_time("2025-07-10 08:15:30").unwrap();
        assert_eq!(dt.hour(), 8);
        assert_eq!(dt.minute(), 15);
    }

    #[test]
    fn test_parse_epoch_millis() {
        let dt = parse_submission_time("1752150600000").unwrap();
        assert_eq!(dt.year(), 2025);
    }

    #[test]
    fn test_parse_date_only() {
        let dt = parse_submission_time("2025-07-10").unwrap();
        assert_eq!(dt.hour(), 0);
    }

    #[test]
    fn test_parse_empty_and_garbage() {
        assert_eq!(parse_submission_time("  "), Err(TimestampError::EmptyString));
        assert!(matches!(
            parse_submission_time("yesterday"),
            Err(TimestampError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_extreme_integers_are_rejected() {
        assert!(matches!(
            parse_submission_time("-9223372036854775808"),
            Err(TimestampError::InvalidFormat(_))
        ));
        assert!(parse_submission_time("9223372036854775807").is_err());
    }
}
