//! Batch cleaners for the two government datasets loaded next to the
//! scraped content.
//!
//! # Submodules
//!
//! - [`charities`]: Form 990 charity financials joined to a state lookup
//! - [`employment`]: QCEW nonprofit employment statistics
//! - [`states`]: State abbreviation tables shared by both
//!
//! Both cleaners read with the `csv` crate, keep a fixed column subset under
//! human-readable names, and write the result with
//! [`write_records`](crate::outputs::tables::write_records). A missing
//! required column fails the whole job; individual bad rows are dropped and
//! counted in a [`CleanSummary`].

pub mod charities;
pub mod employment;
pub mod states;

use crate::error::{Error, Result};
use serde::Serializer;
use std::collections::BTreeMap;
use tracing::info;

/// Row counts for one cleaning job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanSummary {
    pub rows_read: usize,
    pub rows_written: usize,
    /// Rows dropped, keyed by reason.
    pub dropped: BTreeMap<&'static str, usize>,
}

impl CleanSummary {
    pub fn drop_row(&mut self, reason: &'static str) {
        *self.dropped.entry(reason).or_default() += 1;
    }

    pub fn dropped_for(&self, reason: &str) -> usize {
        self.dropped.get(reason).copied().unwrap_or(0)
    }

    pub fn log(&self, dataset: &str) {
        info!(
            dataset,
            rows_read = self.rows_read,
            rows_written = self.rows_written,
            dropped = ?self.dropped,
            "Cleaned dataset"
        );
    }
}

/// Parse a number that may carry thousands separators. Blank is `None`.
pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw.chars().filter(|c| *c != ',').collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a percentage such as `"12.5%"` into `12.5`.
pub fn parse_percent(raw: &str) -> Option<f64> {
    parse_number(&raw.replace('%', ""))
}

/// Index of the header named `name`, ignoring surrounding whitespace.
pub fn column_index(headers: &csv::StringRecord, name: &str, dataset: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.trim_start_matches('\u{feff}').trim() == name)
        .ok_or_else(|| Error::MissingColumn {
            column: name.to_string(),
            dataset: dataset.to_string(),
        })
}

/// Write whole numbers without a trailing `.0`.
pub(crate) fn serialize_number<S: Serializer>(value: &f64, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        serializer.serialize_i64(*value as i64)
    } else {
        serializer.serialize_f64(*value)
    }
}

pub(crate) fn serialize_optional_number<S: Serializer>(
    value: &Option<f64>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match value {
        Some(v) => serialize_number(v, serializer),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number(" 1,234,567 "), Some(1_234_567.0));
        assert_eq!(parse_number("12.5"), Some(12.5));
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("(D)"), None);
        assert_eq!(parse_number("NaN"), None);
    }

    #[test]
    fn test_parse_percent() {
        assert_eq!(parse_percent("12.5%"), Some(12.5));
        assert_eq!(parse_percent(" 3 % "), Some(3.0));
        assert_eq!(parse_percent("%"), None);
    }

    #[test]
    fn test_column_index() {
        let headers = csv::StringRecord::from(vec!["\u{feff}Ein", " State "]);
        assert_eq!(column_index(&headers, "Ein", "map").unwrap(), 0);
        assert_eq!(column_index(&headers, "State", "map").unwrap(), 1);
        let err = column_index(&headers, "City", "map").unwrap_err();
        assert!(matches!(err, Error::MissingColumn { .. }));
    }

    #[test]
    fn test_summary_counts() {
        let mut summary = CleanSummary::default();
        summary.drop_row("no state");
        summary.drop_row("no state");
        assert_eq!(summary.dropped_for("no state"), 2);
        assert_eq!(summary.dropped_for("duplicate"), 0);
    }
}
