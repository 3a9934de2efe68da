//! Storage layer for offsync.
//!
//! SQLite-based persistence for the operation queue.

mod database;
mod migrations;

pub use database::Database;
