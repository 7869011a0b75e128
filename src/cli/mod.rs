//! Command-line interface for the Outpost agent.
//!
//! The update surface is deliberately thin: it parses flags, builds an
//! [`Updater`], and narrates what the orchestrator did. All update decisions
//! live in [`crate::updater`].

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use indicatif::ProgressBar;
use std::path::PathBuf;
use tracing::debug;

use crate::layout::Layout;
use crate::updater::{CheckOutcome, Updater};

/// Compiled-in version of this binary.
const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Top-level CLI for the Outpost agent.
#[derive(Parser, Debug)]
#[command(name = "outpost", version, about = "Outpost agent CLI")]
pub struct Cli {
    /// Override the update state root (defaults to ~/.outpost)
    #[arg(long, global = true, env = "OUTPOST_HOME", value_name = "DIR")]
    pub state_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check for, download, and apply agent updates
    Update(UpdateArgs),
}

/// Arguments for the update command.
///
/// With no flags, runs the full pipeline: check, download if a newer release
/// exists, and apply it.
#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Check for an update without downloading or installing
    #[arg(long)]
    pub check: bool,

    /// Show current and available version information
    #[arg(long)]
    pub status: bool,

    /// Bypass lock protection when pruning old versions
    #[arg(long)]
    pub force: bool,

    /// Reactivate a previously installed version
    #[arg(long, value_name = "VERSION", conflicts_with_all = ["check", "status"])]
    pub rollback: Option<String>,

    /// Run as a detached background check (internal)
    #[arg(long, hide = true)]
    pub background: bool,
}

impl Cli {
    /// Execute the parsed command.
    pub async fn execute(self) -> Result<()> {
        let layout = match self.state_root {
            Some(root) => Layout::new(root),
            None => Layout::default_root()?,
        };

        match self.command {
            Commands::Update(args) => run_update(layout, args).await,
        }
    }
}

async fn run_update(layout: Layout, args: UpdateArgs) -> Result<()> {
    let mut updater = Updater::new(layout, CURRENT_VERSION);

    if let Some(version) = args.rollback {
        updater
            .rollback(&version)
            .await
            .with_context(|| format!("rollback to {version} failed"))?;
        println!("Rolled back to version {version}");
        return Ok(());
    }

    if args.status {
        print_status(&updater);
        // Refresh for next time without making the caller wait on the
        // network.
        if updater.should_check(Utc::now().timestamp_millis()) {
            updater.spawn_background_check();
        }
        return Ok(());
    }

    if args.background {
        // Detached mode: do the check quietly and exit.
        let outcome = updater.check().await;
        debug!(?outcome, "background check finished");
        return Ok(());
    }

    match updater.check().await {
        CheckOutcome::UpToDate { current } => {
            println!("You are on the latest version ({current})");
        }
        CheckOutcome::Failed { message } => {
            bail!("update check failed: {message}");
        }
        CheckOutcome::UpdateAvailable { current, latest } => {
            println!("Update available: {current} -> {latest}");
            if args.check {
                println!("Run `outpost update` to install it");
                return Ok(());
            }

            // This process resolves through the stable link, so it depends
            // on the active version tree until it exits; hold a lock so
            // cleanup leaves that tree installed and rollback stays
            // possible.
            if let Some(active) = updater.layout().active_version() {
                updater.locks().acquire_lock(&active)?;
            }
            let result = download_and_apply(&mut updater, &latest, args.force).await;
            updater.locks().release_lock();

            if result? {
                println!("{} Updated to version {latest}", "✓".green());
            }
        }
    }

    Ok(())
}

async fn download_and_apply(updater: &mut Updater, version: &str, force: bool) -> Result<bool> {
    let bar = ProgressBar::new(100);
    let bar_handle = bar.clone();
    let downloaded = updater
        .download(
            version,
            Some(Box::new(move |pct| bar_handle.set_position(u64::from(pct)))),
        )
        .await;
    bar.finish_and_clear();

    let path = downloaded?;
    debug!(path = %path.display(), "artifact ready");
    updater.apply(force).await
}

fn print_status(updater: &Updater) {
    let status = updater.status();
    println!("Current version: {}", status.current_version);
    match &status.active_version {
        Some(active) => println!("Active version:  {active}"),
        None => println!("Active version:  (none installed)"),
    }
    if let Some(available) = &status.available_version {
        println!(
            "Latest version:  {available} {}",
            "(update available)".yellow()
        );
    }
    if let Some(pending) = &status.pending_version {
        println!("Pending update:  {pending} (downloaded, not applied)");
    }
    if status.last_check_time > 0 {
        println!("Last checked:    {} ms epoch", status.last_check_time);
    } else {
        println!("Last checked:    never");
    }
    if status.disabled {
        println!("{}", "Automatic update checks are disabled".yellow());
    }
}
