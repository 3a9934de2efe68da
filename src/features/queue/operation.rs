//! Operation types for the queue.
//!
//! Defines the deferred units of work and their lifecycle.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SyncError;

/// Opaque payload handed to an executor. The queue never looks inside.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Unique, never-reused identifier assigned at enqueue time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(String);

impl OperationId {
    /// Generate a fresh identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OperationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for OperationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Operation types that can be queued. Each type is served by exactly one
/// registered executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    /// Generic remote API request
    ApiCall,
    /// Upload of a trained model
    ModelPush,
    /// Upload of a build or training artifact
    ArtifactPush,
    /// Write to the model registry
    RegistryWrite,
}

impl OperationType {
    /// Every operation type, in declaration order.
    pub const ALL: [Self; 4] = [
        Self::ApiCall,
        Self::ModelPush,
        Self::ArtifactPush,
        Self::RegistryWrite,
    ];

    /// Storage tag for this operation type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ApiCall => "api_call",
            Self::ModelPush => "model_push",
            Self::ArtifactPush => "artifact_push",
            Self::RegistryWrite => "registry_write",
        }
    }

    /// Get the display name for this operation type.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::ApiCall => "API Call",
            Self::ModelPush => "Model Push",
            Self::ArtifactPush => "Artifact Push",
            Self::RegistryWrite => "Registry Write",
        }
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| SyncError::Config(format!("Unknown operation type: {s}")))
    }
}

/// Status of a queued operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// Waiting for the next sync pass
    Pending,
    /// Claimed by a running sync pass
    InProgress,
    /// Executed successfully
    Completed,
    /// Execution failed; stays until retried or purged
    Failed,
}

impl OperationStatus {
    pub const ALL: [Self; 4] = [Self::Pending, Self::InProgress, Self::Completed, Self::Failed];

    /// Whether the lifecycle allows moving from `self` to `next`.
    ///
    /// `Failed -> Pending` is the explicit retry path.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InProgress)
                | (Self::InProgress, Self::Completed | Self::Failed)
                | (Self::Failed, Self::Pending)
        )
    }

    /// The only status an operation may leave to enter `next`.
    #[must_use]
    pub fn predecessor_of(next: Self) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.can_transition_to(next))
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "in_progress" | "inprogress" | "in-progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(SyncError::Config(format!("Unknown operation status: {other}"))),
        }
    }
}

/// A queued operation with metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Unique ID
    pub id: OperationId,
    /// Operation type
    pub operation_type: OperationType,
    /// Executor input
    pub payload: Payload,
    /// Higher is served first
    pub priority: i32,
    /// Current status
    pub status: OperationStatus,
    /// Number of times a sync pass picked this operation up
    pub attempts: u32,
    /// Last error message
    pub last_error: Option<String>,
    /// When the operation was queued
    pub created_at: DateTime<Utc>,
    /// Last status change
    pub updated_at: DateTime<Utc>,
}

impl Operation {
    /// Create a new pending operation with a fresh id.
    #[must_use]
    pub fn new(operation_type: OperationType, payload: Payload, priority: i32) -> Self {
        let now = Utc::now();
        Self {
            id: OperationId::generate(),
            operation_type,
            payload,
            priority,
            status: OperationStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }
}
