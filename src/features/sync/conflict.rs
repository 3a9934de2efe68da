//! Conflict detection and resolution.
//!
//! Before an operation runs, an optional [`ConflictDetector`] may report a
//! remote snapshot that disagrees with the local payload. The engine's
//! [`ConflictStrategy`] then decides which payload goes to the executor.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::features::queue::{OperationType, Payload};

/// How a detected conflict is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// Local payload is used unchanged (offline-first preference).
    #[default]
    LocalWins,
    /// Remote snapshot replaces the local payload.
    RemoteWins,
    /// Shallow overlay, see [`merge_payloads`].
    Merge,
    /// Operation fails and waits for an operator.
    Manual,
}

impl std::fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::LocalWins => "local_wins",
            Self::RemoteWins => "remote_wins",
            Self::Merge => "merge",
            Self::Manual => "manual",
        };
        f.write_str(s)
    }
}

/// Outcome of applying a strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Execute with this payload.
    Execute(Payload),
    /// Do not execute; needs manual resolution.
    Manual,
}

/// Resolve a conflict between `local` and the `remote` snapshot.
#[must_use]
pub fn resolve(strategy: ConflictStrategy, local: &Payload, remote: &Payload) -> Resolution {
    match strategy {
        ConflictStrategy::LocalWins => Resolution::Execute(local.clone()),
        ConflictStrategy::RemoteWins => Resolution::Execute(remote.clone()),
        ConflictStrategy::Merge => Resolution::Execute(merge_payloads(local, remote)),
        ConflictStrategy::Manual => Resolution::Manual,
    }
}

/// Shallow merge: start from `remote`, then overlay every key of `local`.
///
/// Keys present in both take the local value, keys only in `remote` are kept.
/// Nested objects are not merged; a local object replaces the remote one
/// wholesale.
#[must_use]
pub fn merge_payloads(local: &Payload, remote: &Payload) -> Payload {
    let mut merged = remote.clone();
    for (key, value) in local {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Hook that compares a pending operation with remote state.
#[async_trait]
pub trait ConflictDetector: Send + Sync {
    /// Return the remote snapshot if it conflicts with `payload`.
    async fn detect(
        &self,
        operation_type: OperationType,
        payload: &Payload,
    ) -> anyhow::Result<Option<Payload>>;
}

/// Detector that never reports a conflict.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoConflictDetector;

#[async_trait]
impl ConflictDetector for NoConflictDetector {
    async fn detect(
        &self,
        _operation_type: OperationType,
        _payload: &Payload,
    ) -> anyhow::Result<Option<Payload>> {
        Ok(None)
    }
}
