//! Output formatting for offsync.
//!
//! This module provides formatters for displaying queue data in various formats.

mod json;
mod pretty;

use crate::cli::args::OutputFormat;
use crate::error::SyncError;
use crate::features::connectivity::ConnectivityState;
use crate::features::queue::{Operation, OperationStatus, QueueStats};
use crate::features::sync::SyncRun;

pub use json::*;
pub use pretty::*;

/// Format operations based on output format
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_operations(
    operations: &[Operation],
    status: OperationStatus,
    limit: usize,
    format: OutputFormat,
) -> Result<String, SyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_operations_pretty(operations, status, limit)),
        OutputFormat::Json => {
            let shown = &operations[..operations.len().min(limit)];
            format_operations_json(shown, status)
        }
    }
}

/// Format queue statistics based on output format
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_stats(stats: &QueueStats, format: OutputFormat) -> Result<String, SyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_stats_pretty(stats)),
        OutputFormat::Json => format_stats_json(stats),
    }
}

/// Format a sync run based on output format
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_sync_run(run: &SyncRun, format: OutputFormat) -> Result<String, SyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_sync_run_pretty(run)),
        OutputFormat::Json => format_sync_run_json(run),
    }
}

/// Format connectivity state based on output format
///
/// # Errors
///
/// Returns `SyncError::Parse` if JSON serialization fails.
pub fn format_state(state: &ConnectivityState, format: OutputFormat) -> Result<String, SyncError> {
    match format {
        OutputFormat::Pretty => Ok(format_state_pretty(state)),
        OutputFormat::Json => format_state_json(state),
    }
}
