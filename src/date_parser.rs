//! Timestamp handling.
//!
//! The API speaks RFC-1123 (`"Fri, 05 Jun 2009 23:07:13 GMT"`) and expects
//! the pagination offset as a naive ISO-8601 UTC string. The store keeps
//! Unix epoch seconds as `REAL`. Reports bucket by UTC calendar month.

use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};
use tracing::trace;

use crate::error::{PlurkError, Result};

const API_POSTED_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";
const API_OFFSET_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Month bucket format used in reports.
pub const MONTH_KEY_FORMAT: &str = "%Y-%m";

/// Parse an API `posted` value into epoch seconds.
///
/// # Errors
/// Returns [`PlurkError::InvalidTimestamp`] if the value is not RFC-1123.
#[allow(clippy::cast_precision_loss)]
pub fn parse_posted(value: &str) -> Result<f64> {
    let trimmed = value.trim();
    let parsed = DateTime::parse_from_rfc2822(trimmed)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(trimmed, API_POSTED_FORMAT).map(|naive| naive.and_utc())
        })
        .map_err(|e| PlurkError::invalid_timestamp(value, e.to_string()))?;

    trace!(input = value, epoch = parsed.timestamp(), "Parsed posted timestamp");
    Ok(parsed.timestamp() as f64)
}

/// Serde adapter: decode a `posted` string straight into epoch seconds.
///
/// # Errors
/// Fails deserialization when the value is not a parseable string.
pub fn deserialize_posted<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_posted(&raw).map_err(serde::de::Error::custom)
}

/// Convert stored epoch seconds to a UTC datetime.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn epoch_to_utc(epoch: f64) -> Option<DateTime<Utc>> {
    if !epoch.is_finite() {
        return None;
    }
    let secs = epoch.floor();
    let nanos = ((epoch - secs) * 1e9).round().clamp(0.0, 999_999_999.0) as u32;
    DateTime::<Utc>::from_timestamp(secs as i64, nanos)
}

/// Format a cursor as the timeline endpoint's `offset` parameter.
///
/// # Errors
/// Returns [`PlurkError::InvalidTimestamp`] for non-finite or out of range
/// values.
pub fn format_offset(epoch: f64) -> Result<String> {
    epoch_to_utc(epoch)
        .map(|dt| dt.format(API_OFFSET_FORMAT).to_string())
        .ok_or_else(|| PlurkError::invalid_timestamp(epoch.to_string(), "timeline offset"))
}

/// Human readable rendering for logs and `stats`.
#[must_use]
pub fn format_epoch(epoch: f64) -> String {
    epoch_to_utc(epoch).map_or_else(
        || "unknown".to_string(),
        |dt| dt.format("%Y-%m-%d %H:%M UTC").to_string(),
    )
}

/// Parse a `"YYYY-MM"` bucket back into the first day of that month.
#[must_use]
pub fn parse_month_key(key: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(&format!("{key}-01"), "%Y-%m-%d").ok()
}

/// First day of the month containing `date`.
#[must_use]
pub fn first_of_month(date: NaiveDate) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1)
}

/// Every month start from `start` through `end`, both inclusive.
///
/// Empty when `start` is after `end`.
#[must_use]
pub fn months_between(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let (Some(mut current), Some(last)) = (first_of_month(start), first_of_month(end)) else {
        return Vec::new();
    };

    let mut months = Vec::new();
    while current <= last {
        months.push(current);
        match current.checked_add_months(Months::new(1)) {
            Some(next) => current = next,
            None => break,
        }
    }
    months
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_api_format() {
        let epoch = parse_posted("Fri, 05 Jun 2009 23:07:13 GMT").unwrap();
        assert!((epoch - 1_244_243_233.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_garbage() {
        let err = parse_posted("yesterday-ish").unwrap_err();
        assert!(matches!(err, PlurkError::InvalidTimestamp { .. }));
    }

    #[test]
    fn offset_is_naive_utc_iso() {
        assert_eq!(format_offset(1_244_243_233.0).unwrap(), "2009-06-05T23:07:13");
        assert!(format_offset(f64::NAN).is_err());
    }

    #[test]
    fn display_is_utc() {
        assert_eq!(format_epoch(1_706_745_540.0), "2024-01-31 23:59 UTC");
        assert_eq!(format_epoch(1_706_745_600.0), "2024-02-01 00:00 UTC");
    }

    #[test]
    fn months_between_is_inclusive() {
        let start = NaiveDate::from_ymd_opt(2023, 11, 20).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 2, 3).unwrap();
        let keys: Vec<String> = months_between(start, end)
            .iter()
            .map(|d| d.format(MONTH_KEY_FORMAT).to_string())
            .collect();
        assert_eq!(keys, vec!["2023-11", "2023-12", "2024-01", "2024-02"]);
    }

    #[test]
    fn months_between_reversed_is_empty() {
        let start = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
        assert!(months_between(start, end).is_empty());
    }

    #[test]
    fn month_key_round_trip() {
        let date = parse_month_key("2024-03").unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert!(parse_month_key("2024-13").is_none());
    }

    #[test]
    fn format_epoch_renders_utc() {
        assert_eq!(format_epoch(1_244_243_233.0), "2009-06-05 23:07 UTC");
        assert_eq!(format_epoch(f64::INFINITY), "unknown");
    }
}
