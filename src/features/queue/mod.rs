//! Durable operation queue.
//!
//! Operations issued while offline are stored here until a sync pass
//! executes them:
//! - Priority ordering with FIFO inside a priority band
//! - Checked status transitions
//! - Explicit sweeps only; nothing is deleted implicitly

pub mod operation;
pub mod store;

pub use operation::{Operation, OperationId, OperationStatus, OperationType, Payload};
pub use store::{OperationQueue, QueueStats};
