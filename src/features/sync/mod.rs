//! Synchronization of queued operations.
//!
//! Features:
//! - One executor per operation type
//! - At most one automatic pass at a time, forced passes on demand
//! - Pluggable conflict detection with local/remote/merge/manual resolution
//! - Automatic pass when the network comes back

pub mod conflict;
pub mod engine;
pub mod executor;

pub use conflict::{merge_payloads, ConflictDetector, ConflictStrategy, NoConflictDetector};
pub use engine::{SyncEngine, SyncRun, SyncRunStatus};
pub use executor::{executor_fn, Executor};
