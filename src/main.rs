use clap::Parser;
use colored::Colorize;

use offsync::cli::args::Cli;
use offsync::cli::commands;
use offsync::error::SyncError;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), SyncError> {
    let cli = Cli::parse();
    let output = commands::execute(cli).await?;

    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}
