//! Feature implementations for offsync.
//!
//! - Durable operation queue
//! - Connectivity monitoring
//! - Sync engine with conflict resolution

pub mod connectivity;
pub mod queue;
pub mod sync;
