//! Configuration management for offsync.
//!
//! This module handles loading and saving configuration from `~/.offsync/`.

mod paths;
mod settings;

pub use paths::Paths;
pub use settings::{Config, LoggingConfig, MonitorConfig, SyncConfig};
