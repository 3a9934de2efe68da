//! offsync - offline-first operation queue
//!
//! Operations issued while disconnected are stored durably in `SQLite` and
//! replayed through registered executors, in priority order, once
//! connectivity returns.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use offsync::config::{Config, Paths};
//! use offsync::features::queue::{OperationType, Payload};
//! use offsync::features::sync::executor_fn;
//! use offsync::SyncService;
//!
//! # async fn demo() -> Result<(), offsync::SyncError> {
//! let service = SyncService::open(&Config::default(), &Paths::new()?)?;
//! service.register_handler(
//!     OperationType::ModelPush,
//!     executor_fn(|_payload| async { Ok(true) }),
//! );
//! service.enqueue(OperationType::ModelPush, Payload::new(), 5)?;
//! service.start();
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod cli;
pub mod config;
pub mod error;
pub mod executors;
pub mod features;
pub mod logging;
pub mod output;
pub mod service;
pub mod storage;

pub use cli::args::{Cli, Commands, OutputFormat};
pub use error::SyncError;
pub use service::SyncService;
