//! Typed errors shared by the registry loader, fetchers, writers and cleaners.
//!
//! The matcher itself never fails; everything that can go wrong here is I/O
//! or externally maintained data.

use thiserror::Error;

/// Errors raised outside the matcher.
#[derive(Debug, Error)]
pub enum Error {
    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport-level HTTP failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    /// JSON parse error
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parse error
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// CSV read or write error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Malformed URL
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Registry failed validation
    #[error("invalid registry: {reason}")]
    InvalidRegistry { reason: String },

    /// Input dataset lacks a required column
    #[error("column '{column}' not found in {dataset}")]
    MissingColumn { column: String, dataset: String },

    /// Credentials rejected or token missing
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Response parsed but did not have the expected shape
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl Error {
    /// Whether retrying the same request could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Error::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transience() {
        let rate_limited = Error::Status { status: 429, url: "https://example.com".into() };
        let unavailable = Error::Status { status: 503, url: "https://example.com".into() };
        let not_found = Error::Status { status: 404, url: "https://example.com".into() };
        assert!(rate_limited.is_transient());
        assert!(unavailable.is_transient());
        assert!(!not_found.is_transient());
    }

    #[test]
    fn test_data_errors_are_not_transient() {
        let err = Error::InvalidRegistry { reason: "empty".into() };
        assert!(!err.is_transient());
        assert_eq!(err.to_string(), "invalid registry: empty");
    }

    #[test]
    fn test_missing_column_message() {
        let err = Error::MissingColumn {
            column: "F9_00_ORG_EIN".into(),
            dataset: "charities".into(),
        };
        assert_eq!(err.to_string(), "column 'F9_00_ORG_EIN' not found in charities");
    }
}
