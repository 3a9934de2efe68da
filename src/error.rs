//! Error types for offsync.

use thiserror::Error;

use crate::features::queue::{OperationId, OperationStatus};

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors surfaced by the queue, the engine, and the CLI.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The backing store could not be read or written.
    #[error("Database error: {0}")]
    Database(String),

    /// The queue was used after `close()`.
    #[error("Operation queue is closed")]
    Closed,

    #[error("Not found: {0}")]
    NotFound(String),

    /// A status change that the operation lifecycle does not allow.
    #[error("Invalid transition for operation {id}: {from} -> {to}")]
    InvalidTransition {
        id: OperationId,
        from: OperationStatus,
        to: OperationStatus,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl SyncError {
    /// Whether this error came from a lifecycle check rather than the store.
    #[must_use]
    pub const fn is_invalid_transition(&self) -> bool {
        matches!(self, Self::InvalidTransition { .. })
    }
}

impl From<rusqlite::Error> for SyncError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e.to_string())
    }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
