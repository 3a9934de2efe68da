//! Connectivity and sync commands.

use colored::Colorize;

use crate::cli::args::OutputFormat;
use crate::error::SyncError;
use crate::output::{format_state, format_sync_run};
use crate::service::SyncService;

/// Probe once and print the resulting state.
///
/// # Errors
///
/// Returns an error if output formatting fails.
pub async fn check(service: &SyncService, format: OutputFormat) -> Result<String, SyncError> {
    let state = service.check_connectivity().await;
    format_state(&state, format)
}

/// Probe once, then run one pass.
///
/// # Errors
///
/// Returns an error if the queue cannot be read or updated.
pub async fn sync(
    service: &SyncService,
    force: bool,
    format: OutputFormat,
) -> Result<String, SyncError> {
    service.check_connectivity().await;
    let run = service.sync(force).await?;
    format_sync_run(&run, format)
}

/// Monitor connectivity until Ctrl-C, syncing on every reconnect.
///
/// # Errors
///
/// Returns an error if the signal handler cannot be installed, or an initial
/// pass fails.
pub async fn watch(service: &SyncService, format: OutputFormat) -> Result<String, SyncError> {
    // Drain whatever is already queued if we start out online
    if service.check_connectivity().await.is_online() {
        let run = service.sync(false).await?;
        if run.processed > 0 {
            println!("{}", format_sync_run(&run, format)?);
        }
    }

    service.start();
    if format == OutputFormat::Pretty {
        eprintln!("{}", "Watching connectivity, press Ctrl-C to stop".dimmed());
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("interrupt received, shutting down");

    match format {
        OutputFormat::Json => Ok(String::new()),
        OutputFormat::Pretty => Ok("Stopped watching.".to_string()),
    }
}
