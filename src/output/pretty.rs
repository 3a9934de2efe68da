use chrono::{DateTime, Utc};
use colored::Colorize;

use crate::features::connectivity::{ConnectivityState, NetworkStatus};
use crate::features::queue::{Operation, OperationStatus, QueueStats};
use crate::features::sync::{SyncRun, SyncRunStatus};

/// Format a list of operations as a table
pub fn format_operations_pretty(
    operations: &[Operation],
    status: OperationStatus,
    limit: usize,
) -> String {
    if operations.is_empty() {
        return format!("No {status} operations in queue.");
    }

    let mut lines = vec![
        format!(
            "{} Operations ({})",
            status.to_string().to_uppercase(),
            operations.len()
        ),
        "─".repeat(72),
        format!(
            "{:<36}  {:<14}  {:>4}  {:>3}  {}",
            "ID", "Type", "Prio", "Try", "Created"
        ),
        "─".repeat(72),
    ];

    for op in operations.iter().take(limit) {
        lines.push(format!(
            "{:<36}  {:<14}  {:>4}  {:>3}  {}",
            op.id,
            op.operation_type.display_name(),
            op.priority,
            op.attempts,
            op.created_at.format("%Y-%m-%d %H:%M").to_string().dimmed()
        ));

        if let Some(error) = &op.last_error {
            lines.push(format!("  {}", truncate(error, 68).red()));
        }
    }

    if operations.len() > limit {
        lines.push(
            format!("... {} more", operations.len() - limit)
                .dimmed()
                .to_string(),
        );
    }

    lines.join("\n")
}

/// Format queue statistics
pub fn format_stats_pretty(stats: &QueueStats) -> String {
    let mut lines = vec!["Operation Queue Status".bold().to_string(), "─".repeat(40)];

    lines.push(format!(
        "  Pending:      {} {}",
        stats.pending,
        if stats.pending > 0 {
            "operations waiting".dimmed()
        } else {
            "".dimmed()
        }
    ));
    lines.push(format!("  In progress:  {}", stats.in_progress));
    lines.push(format!("  Completed:    {}", stats.completed));
    lines.push(format!(
        "  Failed:       {} {}",
        stats.failed,
        if stats.failed > 0 {
            "operations need attention".red()
        } else {
            "".normal()
        }
    ));
    lines.push(format!("  Total:        {}", stats.total));

    if let Some(oldest) = stats.oldest_pending {
        lines.push(format!("  Oldest:       {}", format_age(oldest, Utc::now()).dimmed()));
    }

    if stats.pending > 0 {
        lines.push(String::new());
        lines.push(
            "Run 'offsync sync' to execute pending operations"
                .dimmed()
                .to_string(),
        );
    }

    lines.join("\n")
}

/// Format the outcome of a sync call
pub fn format_sync_run_pretty(run: &SyncRun) -> String {
    match run.status {
        SyncRunStatus::Offline => format!("{} sync skipped, network is offline", "✗".red()),
        SyncRunStatus::AlreadySyncing => {
            format!("{} sync skipped, another pass is running", "○".yellow())
        }
        SyncRunStatus::Completed if run.processed == 0 => {
            "No pending operations to sync.".to_string()
        }
        SyncRunStatus::Completed => {
            let mut lines = vec![format!(
                "{} Processed {} operations",
                "✓".green(),
                run.processed
            )];
            lines.push(format!("  Succeeded:  {}", run.succeeded.to_string().green()));
            if run.failed > 0 {
                lines.push(format!("  Failed:     {}", run.failed.to_string().red()));
                lines.push(
                    "Run 'offsync list --status failed' to see errors"
                        .dimmed()
                        .to_string(),
                );
            } else {
                lines.push(format!("  Failed:     {}", run.failed));
            }
            lines.push(format!("  Cleaned:    {}", run.cleaned));
            lines.join("\n")
        }
    }
}

/// Format connectivity state
pub fn format_state_pretty(state: &ConnectivityState) -> String {
    let status = match state.status {
        NetworkStatus::Online => "online".green().bold(),
        NetworkStatus::Offline => "offline".red().bold(),
        NetworkStatus::Checking => "checking".yellow(),
    };

    match state.last_checked {
        Some(at) => format!(
            "Network: {status}  {}",
            format!("(checked {})", at.format("%H:%M:%S")).dimmed()
        ),
        None => format!("Network: {status}"),
    }
}

fn format_age(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let age = now.signed_duration_since(then);
    if age.num_days() > 0 {
        format!("{} days ago", age.num_days())
    } else if age.num_hours() > 0 {
        format!("{} hours ago", age.num_hours())
    } else if age.num_minutes() > 0 {
        format!("{} minutes ago", age.num_minutes())
    } else {
        "just now".to_string()
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let kept: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}
