//! Outpost CLI entry point.
//!
//! Parses arguments, installs the tracing subscriber, executes the command,
//! and renders failures. The library itself never installs a subscriber;
//! running without one simply produces no log output.

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use outpost_cli::cli;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = cli::Cli::parse();
    match cli.execute().await {
        Ok(()) => Ok(()),
        Err(error) => {
            eprintln!("{} {error:#}", "error:".red().bold());
            std::process::exit(1);
        }
    }
}
