//! Queue management commands.
//!
//! These work on the database directly and never touch the network.

use serde_json::json;

use crate::cli::args::OutputFormat;
use crate::error::SyncError;
use crate::features::queue::{OperationId, OperationQueue, OperationStatus, OperationType, Payload};
use crate::output::{format_operations, format_stats, to_json};

/// Queue one operation.
///
/// # Errors
///
/// Returns an error if the payload is not a JSON object or cannot be saved.
pub fn enqueue(
    queue: &OperationQueue,
    operation_type: OperationType,
    payload: Option<&str>,
    priority: i32,
    format: OutputFormat,
) -> Result<String, SyncError> {
    let payload = parse_payload(payload.unwrap_or("{}"))?;
    let id = queue.enqueue(operation_type, payload, priority)?;

    match format {
        OutputFormat::Json => to_json(&json!({
            "id": id,
            "operation_type": operation_type,
            "priority": priority,
        })),
        OutputFormat::Pretty => Ok(format!(
            "Queued {} operation (ID: {id})",
            operation_type.display_name()
        )),
    }
}

/// Show queue counts.
///
/// # Errors
///
/// Returns an error if the queue cannot be read.
pub fn status(queue: &OperationQueue, format: OutputFormat) -> Result<String, SyncError> {
    format_stats(&queue.get_queue_stats()?, format)
}

/// List operations with one status.
///
/// # Errors
///
/// Returns an error if the queue cannot be read.
pub fn list(
    queue: &OperationQueue,
    status: OperationStatus,
    limit: usize,
    format: OutputFormat,
) -> Result<String, SyncError> {
    let operations = if status == OperationStatus::Pending {
        // Execution order is more useful than recency here
        queue.get_pending_operations()?
    } else {
        queue.get_by_status(status)?
    };
    format_operations(&operations, status, limit, format)
}

/// Reset failed operations to pending.
///
/// # Errors
///
/// Returns an error if neither `--all` nor an id is given, or the id does not
/// name a failed operation.
pub fn retry(
    queue: &OperationQueue,
    all: bool,
    id: Option<String>,
    format: OutputFormat,
) -> Result<String, SyncError> {
    if let Some(id) = id {
        let id = OperationId::from(id);
        queue.retry(&id)?;

        match format {
            OutputFormat::Json => to_json(&json!({"reset": [id]})),
            OutputFormat::Pretty => Ok(format!("Reset operation {id} for retry")),
        }
    } else if all {
        let count = queue.retry_all_failed()?;

        match format {
            OutputFormat::Json => to_json(&json!({"reset": count})),
            OutputFormat::Pretty => Ok(format!("Reset {count} failed operations for retry")),
        }
    } else {
        Err(SyncError::Config(
            "Specify --all or provide an operation ID".to_string(),
        ))
    }
}

/// Delete completed operations, and failed ones when forced.
///
/// # Errors
///
/// Returns an error if `failed` is set without `force`, or a delete fails.
pub fn clear(
    queue: &OperationQueue,
    failed: bool,
    force: bool,
    format: OutputFormat,
) -> Result<String, SyncError> {
    if failed && !force {
        return Err(SyncError::Config(
            "Use --force to delete failed operations".to_string(),
        ));
    }

    let cleared = queue.clear_completed()?;
    let purged = if failed { queue.purge_failed()? } else { 0 };

    match format {
        OutputFormat::Json => to_json(&json!({"cleared": cleared, "purged": purged})),
        OutputFormat::Pretty if failed => Ok(format!(
            "Cleared {cleared} completed and {purged} failed operations"
        )),
        OutputFormat::Pretty => Ok(format!("Cleared {cleared} completed operations")),
    }
}

fn parse_payload(raw: &str) -> Result<Payload, SyncError> {
    match serde_json::from_str(raw)? {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(SyncError::Config(format!(
            "Payload must be a JSON object, got: {other}"
        ))),
    }
}
