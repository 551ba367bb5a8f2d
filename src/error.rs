use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;

/// Main error type for s3-consistency operations
#[derive(Error, Debug)]
pub enum ConsistencyError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid validation request: {0}")]
    InvalidRequest(String),

    #[error("Duplicate probe name: {0}")]
    DuplicateProbe(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Report error: {0}")]
    Report(String),
}

impl ConsistencyError {
    /// True for the "object does not exist" class of backend answers.
    ///
    /// This is a meaningful observation rather than a failure: absence
    /// probes count it as success.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ConsistencyError::NotFound(_))
    }

    /// True for failures that say nothing about the observed state
    /// (timeouts, connection problems, 5xx, malformed responses).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ConsistencyError::Backend(_) | ConsistencyError::Timeout(_) | ConsistencyError::Io(_)
        )
    }
}

/// Result type alias for s3-consistency operations
pub type Result<T> = std::result::Result<T, ConsistencyError>;
