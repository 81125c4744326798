use std::time::Duration;
use thiserror::Error;

/// Error taxonomy shared by every harness component
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HarnessError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Entity already exists: {0}")]
    AlreadyExists(String),

    #[error("Entity still in use: {0}")]
    InUse(String),

    #[error("Control plane error: {0}")]
    ControlPlane(String),

    #[error("Condition not met: {0}")]
    ConditionNotMet(String),

    #[error("Timed out after {0:?} waiting for {1}")]
    Timeout(Duration, String),

    #[error("Fatal error: {0}")]
    Fatal(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Task panicked: {0}")]
    TaskPanicked(String),

    #[error("Unexpected status for {name}: expected one of [{expected}] but got {actual}")]
    UnexpectedStatus {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("{failed} of {total} tasks failed, first error: {first}")]
    BatchFailed {
        failed: usize,
        total: usize,
        first: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Result type for harness operations
pub type HarnessResult<T> = Result<T, HarnessError>;

impl HarnessError {
    /// The entity is already gone; cleanup treats this as success.
    pub fn is_not_found(&self) -> bool {
        matches!(self, HarnessError::NotFound(_))
    }

    /// Errors that can never turn into success by waiting longer.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            HarnessError::Fatal(_)
                | HarnessError::Cancelled(_)
                | HarnessError::UnexpectedStatus { .. }
                | HarnessError::InvalidConfiguration(_)
        )
    }
}

impl From<serde_json::Error> for HarnessError {
    fn from(err: serde_json::Error) -> Self {
        HarnessError::SerializationError(err.to_string())
    }
}

impl From<toml::de::Error> for HarnessError {
    fn from(err: toml::de::Error) -> Self {
        HarnessError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for HarnessError {
    fn from(err: std::io::Error) -> Self {
        HarnessError::InternalError(err.to_string())
    }
}
