use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::verify::HashAlgorithm;

#[derive(Error, Debug)]
pub enum PrepError {
    // Bad user input, surfaced with a usage exit status
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    // Non-2xx response. The URL is credential-obfuscated at construction.
    #[error("HTTP {status} from {url}")]
    FailedRequest {
        status: u16,
        url: String,
        headers: BTreeMap<String, String>,
    },

    #[error("Rate limited by {url}, resets at {reset_at}")]
    RateLimited {
        url: String,
        reset_at: DateTime<Utc>,
    },

    #[error("Unexpected content type {actual:?} from {url} (accepted: {accepted})")]
    ContentType {
        url: String,
        actual: String,
        accepted: String,
    },

    #[error("{algorithm} mismatch for {path}: expected {expected}, actual {actual}")]
    Integrity {
        path: String,
        algorithm: HashAlgorithm,
        expected: String,
        actual: String,
    },

    // Checkpoint label attached by a fetch operation, purely diagnostic
    #[error("{label}")]
    Checkpoint {
        label: String,
        #[source]
        source: Box<PrepError>,
    },

    #[error("Network error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PrepError {
    /// Several callers treat 404 as "resource absent" rather than a failure.
    pub fn is_not_found(&self) -> bool {
        match self {
            PrepError::FailedRequest { status: 404, .. } => true,
            PrepError::Checkpoint { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    pub(crate) fn with_checkpoint(self, label: Option<&str>) -> Self {
        match label {
            Some(label) => PrepError::Checkpoint {
                label: label.to_string(),
                source: Box::new(self),
            },
            None => self,
        }
    }
}

pub type Result<T> = std::result::Result<T, PrepError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_not_found() {
        let err = PrepError::FailedRequest {
            status: 404,
            url: "https://example.com/missing".to_string(),
            headers: BTreeMap::new(),
        };
        assert!(err.is_not_found());

        let err = PrepError::FailedRequest {
            status: 500,
            url: "https://example.com".to_string(),
            headers: BTreeMap::new(),
        };
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_is_not_found_through_checkpoint() {
        let err = PrepError::FailedRequest {
            status: 404,
            url: "https://example.com/missing".to_string(),
            headers: BTreeMap::new(),
        }
        .with_checkpoint(Some("resolving latest build"));

        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "resolving latest build");
    }

    #[test]
    fn test_checkpoint_preserves_cause() {
        use std::error::Error;

        let err = PrepError::InvalidParameter("bad version".to_string())
            .with_checkpoint(Some("fetching paper builds"));

        let cause = err.source().expect("checkpoint has a cause");
        assert_eq!(cause.to_string(), "Invalid parameter: bad version");
    }
}
