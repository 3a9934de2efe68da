//! Durable operation queue.
//!
//! Persists operations in SQLite and is the only component that assigns ids
//! or writes records. Status changes are conditional updates, so a transition
//! from the wrong state is rejected rather than silently applied.

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;

use super::operation::{Operation, OperationId, OperationStatus, OperationType, Payload};
use crate::error::SyncError;
use crate::storage::Database;

const SELECT_COLUMNS: &str = "SELECT id, operation_type, payload, priority, status, attempts,
        last_error, created_at, updated_at
 FROM operations";

/// Durable, priority-ordered store of operations.
#[derive(Debug)]
pub struct OperationQueue {
    db: Database,
}

impl OperationQueue {
    /// Open (or create) the queue database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open(path: &Path) -> Result<Self, SyncError> {
        Ok(Self {
            db: Database::open_at(path)?,
        })
    }

    /// Create a queue backed by an in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn in_memory() -> Result<Self, SyncError> {
        Ok(Self {
            db: Database::open_in_memory()?,
        })
    }

    /// Create a queue with an existing database connection.
    #[must_use]
    pub const fn with_database(db: Database) -> Self {
        Self { db }
    }

    /// Add a pending operation and return its id.
    ///
    /// The row is committed before this returns; if it cannot be persisted
    /// the operation was not accepted.
    ///
    /// # Errors
    ///
    /// Returns an error if the operation cannot be saved.
    pub fn enqueue(
        &self,
        operation_type: OperationType,
        payload: Payload,
        priority: i32,
    ) -> Result<OperationId, SyncError> {
        let operation = Operation::new(operation_type, payload, priority);
        let payload_json = serde_json::to_string(&operation.payload)?;

        self.db.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                r"INSERT INTO operations
                  (id, operation_type, payload, priority, status, attempts, created_at, updated_at)
                  VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?6)",
                params![
                    operation.id.as_str(),
                    operation.operation_type.as_str(),
                    payload_json,
                    operation.priority,
                    OperationStatus::Pending.as_str(),
                    timestamp(operation.created_at),
                ],
            )
            .map_err(|e| SyncError::Database(format!("Failed to enqueue operation: {e}")))?;
            tx.commit()
                .map_err(|e| SyncError::Database(format!("Failed to commit operation: {e}")))
        })?;

        tracing::debug!(
            id = %operation.id,
            operation_type = %operation.operation_type,
            priority,
            "enqueued operation"
        );
        Ok(operation.id)
    }

    /// Get all pending operations, highest priority first, then in enqueue order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_pending_operations(&self) -> Result<Vec<Operation>, SyncError> {
        self.query(
            &format!(
                "{SELECT_COLUMNS}
                 WHERE status = ?1
                 ORDER BY priority DESC, seq ASC"
            ),
            OperationStatus::Pending,
        )
    }

    /// Get all operations with a given status, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_by_status(&self, status: OperationStatus) -> Result<Vec<Operation>, SyncError> {
        self.query(
            &format!(
                "{SELECT_COLUMNS}
                 WHERE status = ?1
                 ORDER BY created_at DESC, seq DESC"
            ),
            status,
        )
    }

    /// Get a specific operation by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get(&self, id: &OperationId) -> Result<Option<Operation>, SyncError> {
        self.db.with_conn(|conn| {
            conn.query_row(
                &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                [id.as_str()],
                row_to_operation,
            )
            .optional()
            .map_err(|e| SyncError::Database(format!("Failed to query operation: {e}")))
        })
    }

    /// Get queue statistics from a single aggregate query.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_queue_stats(&self) -> Result<QueueStats, SyncError> {
        self.db.with_conn(|conn| {
            let (total, pending, in_progress, completed, failed, oldest): (
                i64,
                i64,
                i64,
                i64,
                i64,
                Option<String>,
            ) = conn
                .query_row(
                    r"SELECT COUNT(*),
                             COALESCE(SUM(status = 'pending'), 0),
                             COALESCE(SUM(status = 'in_progress'), 0),
                             COALESCE(SUM(status = 'completed'), 0),
                             COALESCE(SUM(status = 'failed'), 0),
                             MIN(CASE WHEN status = 'pending' THEN created_at END)
                      FROM operations",
                    [],
                    |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                        ))
                    },
                )
                .map_err(|e| SyncError::Database(format!("Failed to count operations: {e}")))?;

            Ok(QueueStats {
                total,
                pending,
                in_progress,
                completed,
                failed,
                oldest_pending: oldest.as_deref().and_then(parse_timestamp),
            })
        })
    }

    /// Claim a pending operation for execution. Increments `attempts`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidTransition`] unless the operation is
    /// pending, or [`SyncError::NotFound`] for an unknown id.
    pub fn mark_in_progress(&self, id: &OperationId) -> Result<(), SyncError> {
        self.transition(id, OperationStatus::InProgress, None)
    }

    /// Record a successful execution.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidTransition`] unless the operation is in
    /// progress.
    pub fn mark_completed(&self, id: &OperationId) -> Result<(), SyncError> {
        self.transition(id, OperationStatus::Completed, None)
    }

    /// Record a failed execution with its error text.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidTransition`] unless the operation is in
    /// progress.
    pub fn mark_failed(&self, id: &OperationId, error: &str) -> Result<(), SyncError> {
        self.transition(id, OperationStatus::Failed, Some(error))
    }

    /// Reset a failed operation to pending so the next pass picks it up.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidTransition`] unless the operation failed.
    pub fn retry(&self, id: &OperationId) -> Result<(), SyncError> {
        self.transition(id, OperationStatus::Pending, None)?;
        tracing::info!(%id, "operation reset for retry");
        Ok(())
    }

    /// Reset every failed operation to pending.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn retry_all_failed(&self) -> Result<usize, SyncError> {
        let count = self.bulk_update(
            "UPDATE operations SET status = 'pending', last_error = NULL, updated_at = ?1
             WHERE status = 'failed'",
        )?;
        tracing::info!(count, "failed operations reset for retry");
        Ok(count)
    }

    /// Put operations left in progress by an interrupted pass back to pending.
    ///
    /// Only safe while no sync pass is running, i.e. right after opening.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn recover_in_progress(&self) -> Result<usize, SyncError> {
        let count = self.bulk_update(
            "UPDATE operations SET status = 'pending', updated_at = ?1
             WHERE status = 'in_progress'",
        )?;
        if count > 0 {
            tracing::warn!(count, "recovered operations interrupted mid-sync");
        }
        Ok(count)
    }

    /// Delete all completed operations. Failed operations are kept.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn clear_completed(&self) -> Result<usize, SyncError> {
        self.db.with_conn(|conn| {
            conn.execute("DELETE FROM operations WHERE status = 'completed'", [])
                .map_err(|e| SyncError::Database(format!("Failed to clear completed: {e}")))
        })
    }

    /// Delete all failed operations. Operator action only; the sync engine
    /// never calls this.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn purge_failed(&self) -> Result<usize, SyncError> {
        let count = self.db.with_conn(|conn| {
            conn.execute("DELETE FROM operations WHERE status = 'failed'", [])
                .map_err(|e| SyncError::Database(format!("Failed to purge failed: {e}")))
        })?;
        tracing::warn!(count, "purged failed operations");
        Ok(count)
    }

    /// Release the storage handle. Persisted operations remain on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be closed cleanly.
    pub fn close(&self) -> Result<(), SyncError> {
        self.db.close()
    }

    fn query(&self, sql: &str, status: OperationStatus) -> Result<Vec<Operation>, SyncError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(sql)
                .map_err(|e| SyncError::Database(format!("Failed to prepare query: {e}")))?;

            let rows = stmt
                .query_map([status.as_str()], row_to_operation)
                .map_err(|e| SyncError::Database(format!("Failed to query operations: {e}")))?;

            let mut operations = Vec::new();
            for row in rows {
                operations.push(row?);
            }
            Ok(operations)
        })
    }

    fn bulk_update(&self, sql: &str) -> Result<usize, SyncError> {
        self.db.with_conn(|conn| {
            conn.execute(sql, [timestamp(Utc::now())])
                .map_err(|e| SyncError::Database(format!("Failed to update operations: {e}")))
        })
    }

    fn transition(
        &self,
        id: &OperationId,
        to: OperationStatus,
        error: Option<&str>,
    ) -> Result<(), SyncError> {
        self.db.with_conn(|conn| {
            let tx = conn.transaction()?;
            let now = timestamp(Utc::now());

            let changed = match OperationStatus::predecessor_of(to) {
                None => 0,
                Some(from) => match to {
                    OperationStatus::InProgress => tx.execute(
                        "UPDATE operations SET status = ?1, attempts = attempts + 1, updated_at = ?2
                         WHERE id = ?3 AND status = ?4",
                        params![to.as_str(), now, id.as_str(), from.as_str()],
                    ),
                    // Completing or retrying clears any stale error; failing records one
                    _ => tx.execute(
                        "UPDATE operations SET status = ?1, last_error = ?2, updated_at = ?3
                         WHERE id = ?4 AND status = ?5",
                        params![to.as_str(), error, now, id.as_str(), from.as_str()],
                    ),
                }
                .map_err(|e| {
                    SyncError::Database(format!("Failed to update operation {id}: {e}"))
                })?,
            };

            if changed == 0 {
                let current: Option<String> = tx
                    .query_row(
                        "SELECT status FROM operations WHERE id = ?1",
                        [id.as_str()],
                        |row| row.get(0),
                    )
                    .optional()?;

                return match current {
                    None => Err(SyncError::NotFound(format!("Operation {id}"))),
                    Some(status) => Err(SyncError::InvalidTransition {
                        id: id.clone(),
                        from: status.parse().map_err(|_| {
                            SyncError::Database(format!("Corrupt status '{status}' for {id}"))
                        })?,
                        to,
                    }),
                };
            }

            tx.commit()?;
            Ok(())
        })
    }
}

/// Queue statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub total: i64,
    pub pending: i64,
    pub in_progress: i64,
    pub completed: i64,
    pub failed: i64,
    /// Oldest pending operation timestamp
    pub oldest_pending: Option<DateTime<Utc>>,
}

/// Fixed-width UTC timestamps so text ordering matches time ordering.
fn timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn conversion_error(
    idx: usize,
    e: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn row_to_operation(row: &Row<'_>) -> Result<Operation, rusqlite::Error> {
    let id: String = row.get(0)?;
    let operation_type_str: String = row.get(1)?;
    let payload_str: String = row.get(2)?;
    let priority: i32 = row.get(3)?;
    let status_str: String = row.get(4)?;
    let attempts: u32 = row.get(5)?;
    let last_error: Option<String> = row.get(6)?;
    let created_at_str: String = row.get(7)?;
    let updated_at_str: String = row.get(8)?;

    let operation_type: OperationType = operation_type_str
        .parse()
        .map_err(|e| conversion_error(1, e))?;
    let payload: Payload = serde_json::from_str(&payload_str).map_err(|e| conversion_error(2, e))?;
    let status: OperationStatus = status_str.parse().map_err(|e| conversion_error(4, e))?;

    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map_err(|e| conversion_error(7, e))?
        .with_timezone(&Utc);
    let updated_at = parse_timestamp(&updated_at_str).unwrap_or(created_at);

    Ok(Operation {
        id: OperationId::from(id),
        operation_type,
        payload,
        priority,
        status,
        attempts,
        last_error,
        created_at,
        updated_at,
    })
}
