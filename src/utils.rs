//! Utility functions for date windows, timestamp formatting, string
//! truncation and file system checks.
//!
//! This module provides helpers used throughout the application:
//! - [`DateWindow`] for `--target-date` / `--date-range` filtering
//! - Timestamp parsing and formatting into the `YYYY-MM-DD HH:MM:SS` form
//!   stored in the CSV files
//! - String truncation for logging
//! - Output directory validation

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs as stdfs;
use tokio::fs;
use tracing::{info, instrument};

/// Format used for every timestamp written to disk.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

static EXCESS_FRACTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*\.\d{6})\d*(.*)$").expect("static regex"));

/// A span of whole days around a target date.
///
/// Covers `target - range_days` (inclusive, midnight UTC) up to the end of
/// `target + range_days`. A range of zero covers just the target day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl DateWindow {
    pub fn around(target: NaiveDate, range_days: u32) -> Self {
        let midnight = Utc.from_utc_datetime(&target.and_time(chrono::NaiveTime::MIN));
        let range = Duration::days(i64::from(range_days));
        Self {
            start: midnight - range,
            end: midnight + range + Duration::days(1),
        }
    }

    /// Build a window only when a target date was supplied.
    pub fn from_args(target: Option<NaiveDate>, range_days: u32) -> Option<Self> {
        target.map(|t| Self::around(t, range_days))
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }

    /// `start` as an RFC 3339 string with a `Z` suffix, as the APIs expect.
    pub fn start_rfc3339(&self) -> String {
        self.start.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }

    pub fn end_rfc3339(&self) -> String {
        self.end.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }
}

/// Convert Unix seconds (possibly fractional, as Reddit returns them) to UTC.
pub fn from_unix_seconds(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    DateTime::from_timestamp(secs.trunc() as i64, 0)
}

/// Render a UTC instant in [`TIMESTAMP_FORMAT`].
pub fn format_timestamp(instant: DateTime<Utc>) -> String {
    instant.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse an ISO 8601 / RFC 3339 timestamp and render it in [`TIMESTAMP_FORMAT`].
///
/// Wall-clock time is kept in the offset the timestamp was written in.
/// Fractional seconds beyond six digits are dropped first, a trailing `Z` is
/// accepted, and a timestamp without any offset is read as-is. Returns `None`
/// for empty or unparseable input.
pub fn normalize_timestamp(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let trimmed = EXCESS_FRACTION.replace(raw, "$1$2");
    if let Ok(dt) = DateTime::parse_from_rfc3339(&trimmed) {
        return Some(dt.format(TIMESTAMP_FORMAT).to_string());
    }
    NaiveDateTime::parse_from_str(&trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|dt| dt.format(TIMESTAMP_FORMAT).to_string())
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut after `max` characters with an ellipsis and the
/// number of bytes dropped appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        None => s.to_string(),
        Some((cut, _)) => format!("{}…(+{} bytes)", &s[..cut], s.len() - cut),
    }
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then writes and removes a probe file.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or is not writable.
#[instrument(level = "info", skip_all, fields(path = %path))]
pub async fn ensure_writable_dir(path: &str) -> std::io::Result<()> {
    fs::create_dir_all(path).await?;
    let probe_path = format!("{}/..__probe_write__", path.trim_end_matches('/'));
    stdfs::File::create(&probe_path)?;
    let _ = stdfs::remove_file(&probe_path);
    info!("Output directory is writable");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_truncate_for_log_short_string() {
        assert_eq!(truncate_for_log("Hello, world!", 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }

    #[test]
    fn test_truncate_for_log_respects_char_boundaries() {
        let result = truncate_for_log("ééé", 1);
        assert_eq!(result, "é…(+4 bytes)");
    }

    #[test]
    fn test_date_window_bounds() {
        let window = DateWindow::around(date("2025-03-10"), 3);
        assert!(window.contains(utc("2025-03-07T00:00:00Z")));
        assert!(window.contains(utc("2025-03-13T23:59:59Z")));
        assert!(!window.contains(utc("2025-03-06T23:59:59Z")));
        assert!(!window.contains(utc("2025-03-14T00:00:00Z")));
        assert_eq!(window.start_rfc3339(), "2025-03-07T00:00:00Z");
        assert_eq!(window.end_rfc3339(), "2025-03-14T00:00:00Z");
    }

    #[test]
    fn test_zero_range_is_single_day() {
        let window = DateWindow::around(date("2025-04-14"), 0);
        assert!(window.contains(utc("2025-04-14T13:50:14Z")));
        assert!(!window.contains(utc("2025-04-15T00:00:00Z")));
        assert!(DateWindow::from_args(None, 3).is_none());
    }

    #[test]
    fn test_normalize_timestamp_variants() {
        assert_eq!(
            normalize_timestamp("2025-04-14T13:50:14.61812900+00:00").as_deref(),
            Some("2025-04-14 13:50:14")
        );
        assert_eq!(
            normalize_timestamp("2025-04-14T13:50:14Z").as_deref(),
            Some("2025-04-14 13:50:14")
        );
        assert_eq!(
            normalize_timestamp("2025-04-14T13:50:14.123-05:00").as_deref(),
            Some("2025-04-14 13:50:14")
        );
        assert_eq!(
            normalize_timestamp("2025-04-14T13:50:14").as_deref(),
            Some("2025-04-14 13:50:14")
        );
        assert_eq!(normalize_timestamp(""), None);
        assert_eq!(normalize_timestamp("yesterday"), None);
    }

    #[test]
    fn test_unix_seconds() {
        let instant = from_unix_seconds(1_700_000_000.0).unwrap();
        assert_eq!(format_timestamp(instant), "2023-11-14 22:13:20");
        assert!(from_unix_seconds(f64::NAN).is_none());
    }
}
