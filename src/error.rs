//! Error taxonomy for the discovery and pipeline core.
//!
//! Fetch failures are recorded against the source's failure counter and
//! absorbed per source; configuration-level errors abort the whole
//! invocation.

use thiserror::Error;

use crate::models::PipelineStatus;

/// Typed outcome of an outbound fetch through the proxy router.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Bad proxy credentials (407-equivalent).
    #[error("proxy authentication failed: {0}")]
    Auth(String),
    /// Timeout, DNS failure, or connection refused.
    #[error("network failure: {0}")]
    Network(String),
    /// The remote answered with a non-2xx status.
    #[error("remote returned HTTP {status}")]
    Remote { status: u16 },
}

impl FetchError {
    /// Classify a reqwest error. Timeouts, DNS failures, refused
    /// connections, and body read errors are all connection-level;
    /// proxy authentication surfaces as a 407 response and is handled
    /// separately by the router.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        FetchError::Network(err.to_string())
    }

    /// Connection-level or authentication failures are candidates for a
    /// configured fallback provider; remote HTTP errors are not.
    pub fn is_egress_failure(&self) -> bool {
        matches!(self, FetchError::Auth(_) | FetchError::Network(_))
    }
}

/// Engine-level errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed source metadata or unknown proxy provider. Fatal for
    /// the affected unit only.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// A compare-and-set transition lost the race; the caller must
    /// re-read the record before retrying.
    #[error("state conflict on {record_id}: record was not in state '{expected}'")]
    StateConflict {
        record_id: String,
        expected: PipelineStatus,
    },

    /// Transition not allowed by the state machine.
    #[error("invalid transition from '{from}' to '{to}'")]
    InvalidTransition {
        from: PipelineStatus,
        to: PipelineStatus,
    },

    #[error("unknown dataset '{requested}' (known datasets: {})", known.join(", "))]
    DatasetNotFound {
        requested: String,
        known: Vec<String>,
    },

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_egress_failure_classification() {
        assert!(FetchError::Auth("407".into()).is_egress_failure());
        assert!(FetchError::Network("timeout".into()).is_egress_failure());
        assert!(!FetchError::Remote { status: 503 }.is_egress_failure());
    }

    #[test]
    fn test_dataset_not_found_message_lists_known() {
        let err = EngineError::DatasetNotFound {
            requested: "elections".to_string(),
            known: vec!["wildfires".to_string(), "transit".to_string()],
        };
        let message = err.to_string();
        assert!(message.contains("elections"));
        assert!(message.contains("wildfires"));
        assert!(message.contains("transit"));
    }
}
