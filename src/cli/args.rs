use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use serde::{Deserialize, Serialize};

use crate::features::queue::{OperationStatus, OperationType};

#[derive(Parser)]
#[command(name = "offsync")]
#[command(about = "Offline-first operation queue with automatic sync")]
#[command(long_about = "offsync - offline-first operation queue

Queue API calls, model and artifact pushes, and registry writes while
disconnected. Operations are stored durably and replayed in priority order
once the network is back.

QUICK START:
  offsync enqueue api_call -p '{\"url\": \"https://api.example.com/runs\"}'
  offsync status              Show queue counts
  offsync sync                Check connectivity and run one pass
  offsync watch               Sync automatically whenever the network returns

OUTPUT FORMATS:
  --output pretty    Human-readable colored output (default)
  --output json      Machine-readable JSON for scripting

For more information on a specific command, run:
  offsync <command> --help")]
#[command(version, propagate_version = true)]
pub struct Cli {
    /// Output format for command results
    ///
    /// Use 'pretty' for human-readable colored output (default),
    /// or 'json' for machine-readable output suitable for scripting.
    #[arg(short, long, value_enum, default_value = "pretty", global = true)]
    pub output: OutputFormat,

    /// Data directory holding config.yaml and queue.db
    ///
    /// Defaults to ~/.offsync.
    #[arg(long, env = "OFFSYNC_HOME", global = true)]
    pub home: Option<PathBuf>,

    /// Log debug events to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for command results.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable colored output.
    #[default]
    Pretty,
    /// Machine-readable JSON output.
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Queue an operation
    ///
    /// The operation is persisted before the command returns and runs on the
    /// next sync pass.
    ///
    /// # Operation types
    ///
    ///   api_call, model_push, artifact_push, registry_write
    ///
    /// # Examples
    ///
    ///   offsync enqueue api_call -p '{"method": "POST", "url": "https://api.example.com/runs"}'
    ///   offsync enqueue model_push -p '{"model": "resnet50"}' --priority 5
    #[command(alias = "add")]
    Enqueue {
        /// Operation type
        operation_type: OperationType,

        /// Payload as a JSON object
        #[arg(long, short = 'p')]
        payload: Option<String>,

        /// Higher priorities run first
        #[arg(long, short = 'P', default_value = "0", allow_negative_numbers = true)]
        priority: i32,
    },

    /// Show queue status
    ///
    /// Displays pending, in-progress, completed, and failed counts.
    Status,

    /// List queued operations
    ///
    /// # Examples
    ///
    ///   offsync list
    ///   offsync list --status failed
    #[command(alias = "ls")]
    List {
        /// Filter by status (pending, in_progress, completed, failed)
        #[arg(long, short = 's', default_value = "pending")]
        status: OperationStatus,

        /// Maximum operations to show
        #[arg(long, short = 'n', default_value = "20")]
        limit: usize,
    },

    /// Retry failed operations
    ///
    /// Reset failed operations to pending so the next pass runs them again.
    Retry {
        /// Retry all failed operations
        #[arg(long, conflicts_with = "id")]
        all: bool,

        /// Specific operation ID to retry
        id: Option<String>,
    },

    /// Remove finished operations
    ///
    /// Deletes completed operations. Failed operations are kept unless
    /// --failed --force is given.
    Clear {
        /// Also delete failed operations
        #[arg(long)]
        failed: bool,

        /// Confirm deleting failed operations
        #[arg(long)]
        force: bool,
    },

    /// Probe connectivity once
    Check,

    /// Check connectivity and run one sync pass
    ///
    /// # Examples
    ///
    ///   offsync sync
    ///   offsync sync --force      Run even if another pass is active
    Sync {
        /// Run even if another pass is already active
        #[arg(long)]
        force: bool,
    },

    /// Monitor connectivity and sync automatically
    ///
    /// Probes the configured endpoints periodically and starts a pass each
    /// time the network comes back. Stops on Ctrl-C.
    Watch,

    /// Generate shell completions
    ///
    /// Example: offsync completions bash > ~/.bash_completion.d/offsync
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}
