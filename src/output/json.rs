//! JSON output formatting for offsync.
//!
//! Machine-readable renderings of queue contents, statistics, and sync runs.

use serde::Serialize;
use serde_json::json;

use crate::error::SyncError;
use crate::features::connectivity::ConnectivityState;
use crate::features::queue::{Operation, OperationStatus, QueueStats};
use crate::features::sync::SyncRun;

/// Format operations as JSON
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_operations_json(
    operations: &[Operation],
    status: OperationStatus,
) -> Result<String, SyncError> {
    let output = json!({
        "status": status,
        "count": operations.len(),
        "items": operations
    });
    Ok(serde_json::to_string_pretty(&output)?)
}

/// Format queue statistics as JSON
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_stats_json(stats: &QueueStats) -> Result<String, SyncError> {
    to_json(stats)
}

/// Format a sync run as JSON
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_sync_run_json(run: &SyncRun) -> Result<String, SyncError> {
    to_json(run)
}

/// Format connectivity state as JSON
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_state_json(state: &ConnectivityState) -> Result<String, SyncError> {
    to_json(state)
}

/// Format any serializable value as JSON
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn to_json<T: Serialize>(value: &T) -> Result<String, SyncError> {
    Ok(serde_json::to_string_pretty(value)?)
}
