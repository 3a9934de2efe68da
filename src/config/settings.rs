//! Configuration settings for offsync.
//!
//! Settings are loaded from `~/.offsync/config.yaml`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::features::sync::ConflictStrategy;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Connectivity monitor settings.
    pub monitor: MonitorConfig,
    /// Sync engine settings.
    pub sync: SyncConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Connectivity monitor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Endpoints probed in order; the first non-5xx answer means online.
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<String>,
    /// Per-request probe timeout in seconds.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
    /// Seconds between probe cycles while monitoring.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
}

/// Sync engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Strategy applied when a conflict is detected.
    #[serde(default)]
    pub conflict_strategy: ConflictStrategy,
    /// Register the built-in HTTP executor for `api_call` operations.
    #[serde(default = "default_true")]
    pub register_http_executor: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

// Default value functions for serde
fn default_endpoints() -> Vec<String> {
    vec![
        "https://www.google.com".to_string(),
        "https://www.cloudflare.com".to_string(),
        "https://www.microsoft.com".to_string(),
    ]
}

const fn default_probe_timeout() -> u64 {
    5
}

const fn default_interval() -> u64 {
    30
}

const fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            endpoints: default_endpoints(),
            probe_timeout_secs: default_probe_timeout(),
            interval_secs: default_interval(),
        }
    }
}

impl MonitorConfig {
    #[must_use]
    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            conflict_strategy: ConflictStrategy::default(),
            register_http_executor: default_true(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Config {
    /// Load configuration from a specific path.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load_from_path(path: &std::path::Path) -> Result<Self, SyncError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            SyncError::Config(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;

        let config: Self = serde_yaml::from_str(&contents).map_err(|e| {
            SyncError::Config(format!(
                "Failed to parse config file {}: {e}",
                path.display()
            ))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a specific path.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be written.
    pub fn save_to_path(&self, path: &std::path::Path) -> Result<(), SyncError> {
        let contents = serde_yaml::to_string(self)
            .map_err(|e| SyncError::Config(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, contents).map_err(|e| {
            SyncError::Config(format!(
                "Failed to write config file {}: {e}",
                path.display()
            ))
        })
    }

    fn validate(&self) -> Result<(), SyncError> {
        if self.monitor.endpoints.is_empty() {
            return Err(SyncError::Config(
                "monitor.endpoints must list at least one endpoint".to_string(),
            ));
        }
        if self.monitor.probe_timeout_secs == 0 {
            return Err(SyncError::Config(
                "monitor.probe_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.monitor.interval_secs == 0 {
            return Err(SyncError::Config(
                "monitor.interval_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.monitor.endpoints.len(), 3);
        assert_eq!(config.monitor.probe_timeout(), Duration::from_secs(5));
        assert_eq!(config.monitor.interval(), Duration::from_secs(30));
        assert_eq!(config.sync.conflict_strategy, ConflictStrategy::LocalWins);
        assert!(config.sync.register_http_executor);
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
    }

    #[test]
    fn test_load_missing_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let config = Config::load_from_path(&config_path).unwrap();

        assert_eq!(config.monitor.interval_secs, 30);
    }

    #[test]
    fn test_save_and_load_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let mut config = Config::default();
        config.monitor.interval_secs = 10;
        config.sync.conflict_strategy = ConflictStrategy::Merge;

        config.save_to_path(&config_path).unwrap();

        let loaded = Config::load_from_path(&config_path).unwrap();

        assert_eq!(loaded.monitor.interval_secs, 10);
        assert_eq!(loaded.sync.conflict_strategy, ConflictStrategy::Merge);
    }

    #[test]
    fn test_partial_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");

        let partial_yaml = r"
sync:
  conflict_strategy: remote_wins
";
        std::fs::write(&config_path, partial_yaml).unwrap();

        let config = Config::load_from_path(&config_path).unwrap();

        assert_eq!(config.sync.conflict_strategy, ConflictStrategy::RemoteWins);
        // Defaults should be used for missing fields
        assert!(config.sync.register_http_executor);
        assert_eq!(config.monitor.probe_timeout_secs, 5);
    }

    #[test]
    fn test_empty_endpoints_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        std::fs::write(&config_path, "monitor:\n  endpoints: []\n").unwrap();

        let err = Config::load_from_path(&config_path).unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        std::fs::write(&config_path, "monitor:\n  interval_secs: 0\n").unwrap();

        let err = Config::load_from_path(&config_path).unwrap_err();
        assert!(err.to_string().contains("monitor.interval_secs"));
    }
}
