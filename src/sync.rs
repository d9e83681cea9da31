//! Sync pipeline orchestration.
//!
//! Coordinates one run: read snapshot → fetch (incremental when a watermark
//! exists) → reconcile → write snapshot and metadata. Nothing is written
//! unless every earlier step succeeded.

use anyhow::Result;
use chrono::Utc;
use std::path::PathBuf;
use tracing::info;

use crate::client::{CkanClient, RecordSource};
use crate::config::Config;
use crate::fetch::{FetchMode, FetchSettings, FetchStrategy};
use crate::models::Record;
use crate::progress::{format_number, FetchProgressReporter};
use crate::reconcile::{reconcile, ReconcileStats};
use crate::snapshot::{read_snapshot, write_metadata, write_snapshot, RunMetadata, Snapshot};

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Ignore the watermark and page through the whole resource.
    pub full: bool,
    /// Fetch and reconcile, but write nothing.
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct SyncReport {
    pub mode: FetchMode,
    pub fetched: usize,
    pub stats: ReconcileStats,
    pub snapshot_path: PathBuf,
    pub written: bool,
}

/// Run a sync against the configured CKAN endpoint.
pub fn run_sync(
    config: &Config,
    options: SyncOptions,
    progress: &dyn FetchProgressReporter,
) -> Result<SyncReport> {
    let client = CkanClient::new(&config.api)?;
    run_sync_with_source(config, &client, options, progress)
}

/// Run a sync against any [`RecordSource`].
pub fn run_sync_with_source<S: RecordSource + ?Sized>(
    config: &Config,
    source: &S,
    options: SyncOptions,
    progress: &dyn FetchProgressReporter,
) -> Result<SyncReport> {
    let snapshot_path = config.output.snapshot_path();
    let Snapshot {
        rows,
        ids,
        watermark,
    } = read_snapshot(&snapshot_path)?;

    info!(
        path = %snapshot_path.display(),
        rows = rows.len(),
        watermark = watermark.as_deref().unwrap_or("none"),
        "Loaded existing snapshot"
    );

    let watermark = if options.full { None } else { watermark };

    let outcome = FetchStrategy::new(source, FetchSettings::from(&config.api))
        .with_progress(progress)
        .fetch(watermark.as_deref())?;

    let fetched = outcome.records.len();
    let fresh: Vec<Record> = outcome.records.iter().map(Record::from_json).collect();

    if fresh.is_empty() && !rows.is_empty() {
        info!("No new records, snapshot is up to date");
    }

    let reconciliation = reconcile(rows, &ids, fresh)?;
    let stats = reconciliation.stats;

    if options.dry_run {
        println!("sync {} (dry-run)", config.api.resource_id);
        print_counts(outcome.mode, fetched, &stats);
        return Ok(SyncReport {
            mode: outcome.mode,
            fetched,
            stats,
            snapshot_path,
            written: false,
        });
    }

    write_snapshot(&snapshot_path, &reconciliation.rows)?;

    let metadata = RunMetadata {
        last_updated: Utc::now().to_rfc3339(),
        total_records: reconciliation.rows.len(),
        new_records: stats.appended,
        updated_records: stats.updated,
        fetch_mode: Some(outcome.mode),
        resource_id: config.api.resource_id.clone(),
        source: config.api.source_host().to_string(),
    };
    let metadata_path = config.output.metadata_path();
    write_metadata(&metadata_path, &metadata)?;

    info!(
        path = %snapshot_path.display(),
        total = metadata.total_records,
        new = stats.appended,
        updated = stats.updated,
        "Snapshot written"
    );

    println!("sync {}", config.api.resource_id);
    print_counts(outcome.mode, fetched, &stats);
    println!("  snapshot: {}", snapshot_path.display());
    println!("  metadata: {}", metadata_path.display());
    println!("ok");

    Ok(SyncReport {
        mode: outcome.mode,
        fetched,
        stats,
        snapshot_path,
        written: true,
    })
}

fn print_counts(mode: FetchMode, fetched: usize, stats: &ReconcileStats) {
    println!("  mode: {}", mode.as_str());
    println!("  fetched: {} records", format_number(fetched as u64));
    println!("  new records: {}", format_number(stats.appended as u64));
    println!(
        "  updated records: {} ({} changed)",
        format_number(stats.updated as u64),
        format_number(stats.changed as u64)
    );
    println!("  retained records: {}", format_number(stats.retained as u64));
    println!("  total records: {}", format_number(stats.total() as u64));
}
