//! # ckan-snapshot CLI
//!
//! ## Usage
//!
//! ```bash
//! ckan-snapshot [--config ./ckan-snapshot.toml] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ckan-snapshot sync` | Fetch new records and merge them into the snapshot |
//! | `ckan-snapshot status` | Print a summary of the snapshot on disk |
//!
//! Without `--config`, built-in defaults are used. `OUTPUT_DIR` overrides the
//! output directory either way. Diagnostics go to stderr and are filtered
//! with `RUST_LOG` (default `warn`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use ckan_snapshot::config;
use ckan_snapshot::progress::ProgressMode;
use ckan_snapshot::stats;
use ckan_snapshot::sync::{self, SyncOptions};

/// Keep a local CSV snapshot of a CKAN DataStore resource up to date.
#[derive(Parser)]
#[command(name = "ckan-snapshot", version)]
struct Cli {
    /// Path to a TOML configuration file. Defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Progress output on stderr: `off`, `human` or `json`.
    ///
    /// Defaults to `human` when stderr is a terminal, otherwise `off`.
    #[arg(long, global = true, value_parser = parse_progress)]
    progress: Option<ProgressMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch records and reconcile them into the snapshot.
    ///
    /// Uses an incremental query above the snapshot's newest `open_date`
    /// when a snapshot exists, falling back to a full paginated fetch if
    /// that query fails.
    Sync {
        /// Ignore the watermark and page through the whole resource.
        #[arg(long)]
        full: bool,

        /// Fetch and reconcile, print counts, write nothing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Show snapshot size, watermark and the last run's metadata.
    Status,
}

fn parse_progress(s: &str) -> Result<ProgressMode, String> {
    ProgressMode::parse(s).ok_or_else(|| format!("invalid progress mode '{}'", s))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::resolve_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Sync { full, dry_run } => {
            let mode = cli.progress.unwrap_or_else(ProgressMode::default_for_tty);
            let reporter = mode.reporter();
            sync::run_sync(&cfg, SyncOptions { full, dry_run }, reporter.as_ref())?;
        }
        Commands::Status => {
            stats::run_status(&cfg)?;
        }
    }

    Ok(())
}
