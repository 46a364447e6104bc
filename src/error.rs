//! Error types for Stratasync

use thiserror::Error;

/// Result type alias for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Main error type for Stratasync
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Walk error: {0}")]
    Walk(String),

    #[error("failed to build inventory: {0}")]
    Inventory(#[source] Box<SyncError>),

    #[error("Cloud storage error: {0}")]
    CloudStorage(String),

    #[error("Comparison failed for {path}: {message}")]
    Comparison { path: String, message: String },

    #[error("Plan is empty")]
    EmptyPlan,

    #[error("Plan conflict: upload and delete both target {0}")]
    PlanConflict(String),

    #[error("Invalid pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration format error: {0}")]
    ConfigFormat(#[from] toml::de::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Wrap a scan failure, leaving cancellation untouched so callers can
    /// still tell it apart from real failures.
    pub fn inventory(err: SyncError) -> Self {
        match err {
            SyncError::Cancelled => SyncError::Cancelled,
            other => SyncError::Inventory(Box::new(other)),
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::CloudStorage(_) | SyncError::Io(_))
    }

    /// Check if error came from a cancelled run
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled)
    }
}

impl From<tokio::task::JoinError> for SyncError {
    fn from(err: tokio::task::JoinError) -> Self {
        SyncError::Internal(format!("task failed: {}", err))
    }
}
