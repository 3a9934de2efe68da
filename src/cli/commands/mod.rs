//! Command implementations for offsync.
//!
//! This module contains the implementation of all CLI commands.

mod completions;
mod queue;
mod sync;

pub use completions::completions;
pub use queue::{clear, enqueue, list, retry, status};
pub use sync::{check, sync, watch};

use crate::cli::args::{Cli, Commands, OutputFormat};
use crate::config::{Config, Paths};
use crate::error::SyncError;
use crate::features::queue::OperationQueue;
use crate::logging;
use crate::service::SyncService;

/// Run the parsed command line and return what should be printed.
///
/// # Errors
///
/// Returns an error if configuration cannot be loaded or the command fails.
pub async fn execute(cli: Cli) -> Result<String, SyncError> {
    let format = cli.output;

    if let Commands::Completions { shell } = cli.command {
        return completions(shell);
    }

    let paths = match cli.home {
        Some(root) => Paths::with_root(root),
        None => Paths::new()?,
    };
    let config = Config::load_from_path(&paths.config_file)?;
    logging::init(&config.logging, cli.verbose);
    paths.ensure_dirs()?;

    match cli.command {
        Commands::Enqueue {
            operation_type,
            payload,
            priority,
        } => {
            let queue = OperationQueue::open(&paths.database)?;
            enqueue(&queue, operation_type, payload.as_deref(), priority, format)
        }
        Commands::Status => status(&OperationQueue::open(&paths.database)?, format),
        Commands::List { status, limit } => {
            list(&OperationQueue::open(&paths.database)?, status, limit, format)
        }
        Commands::Retry { all, id } => {
            retry(&OperationQueue::open(&paths.database)?, all, id, format)
        }
        Commands::Clear { failed, force } => {
            clear(&OperationQueue::open(&paths.database)?, failed, force, format)
        }
        Commands::Check => online(&config, &paths, Online::Check, format).await,
        Commands::Sync { force } => online(&config, &paths, Online::Sync { force }, format).await,
        Commands::Watch => online(&config, &paths, Online::Watch, format).await,
        Commands::Completions { shell } => completions(shell),
    }
}

/// Commands that need connectivity and the sync engine.
enum Online {
    Check,
    Sync { force: bool },
    Watch,
}

/// Open the service, run the command, and shut the service down even if the
/// command failed.
async fn online(
    config: &Config,
    paths: &Paths,
    command: Online,
    format: OutputFormat,
) -> Result<String, SyncError> {
    let service = SyncService::open(config, paths)?;

    let result = match command {
        Online::Check => check(&service, format).await,
        Online::Sync { force } => sync(&service, force, format).await,
        Online::Watch => watch(&service, format).await,
    };

    service.shutdown().await?;
    result
}
