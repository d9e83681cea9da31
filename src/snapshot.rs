//! Persisted snapshot: the CSV file of all known records plus a small JSON
//! metadata file written next to it.
//!
//! The CSV header is exactly [`FIELDS`]. On read, columns are matched by
//! header name, so a file with extra, missing or reordered columns still
//! loads; unknown columns are dropped and missing ones read as empty.
//!
//! Writes stage into `<file>.tmp` and rename over the destination, so readers
//! never observe a half-written snapshot.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::fetch::FetchMode;
use crate::models::{Record, FIELDS};

/// Rows of a snapshot plus the indexes derived from them.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub rows: Vec<Record>,
    /// Identity keys of `rows` (rows without a key are not indexed).
    pub ids: HashSet<String>,
    /// Greatest non-empty `open_date`, if any.
    pub watermark: Option<String>,
}

impl Snapshot {
    /// Build the identity set and watermark for `rows` in one pass.
    pub fn from_rows(rows: Vec<Record>) -> Self {
        let mut ids = HashSet::with_capacity(rows.len());
        let mut watermark: Option<&str> = None;

        for row in &rows {
            if let Some(id) = row.case_id() {
                ids.insert(id.to_string());
            }
            let date = row.open_date();
            if !date.is_empty() && watermark.map_or(true, |w| date > w) {
                watermark = Some(date);
            }
        }

        let watermark = watermark.map(str::to_owned);
        Self {
            rows,
            ids,
            watermark,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Load the snapshot at `path`. A missing file is an empty snapshot.
pub fn read_snapshot(path: &Path) -> Result<Snapshot> {
    if !path.exists() {
        debug!(path = %path.display(), "No snapshot on disk, treating as first run");
        return Ok(Snapshot::default());
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open snapshot: {}", path.display()))?;

    let headers: Vec<String> = reader
        .headers()
        .with_context(|| format!("Failed to read snapshot header: {}", path.display()))?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let row = result.with_context(|| {
            format!("Malformed row {} in snapshot {}", i + 2, path.display())
        })?;
        rows.push(Record::from_pairs(
            headers.iter().map(String::as_str).zip(row.iter()),
        ));
    }

    debug!(path = %path.display(), rows = rows.len(), "Loaded snapshot");
    Ok(Snapshot::from_rows(rows))
}

/// Overwrite `path` with `rows`, creating the parent directory if needed.
pub fn write_snapshot(path: &Path, rows: &[Record]) -> Result<()> {
    ensure_parent(path)?;
    let staging = staging_path(path);

    {
        let mut writer = csv::Writer::from_path(&staging)
            .with_context(|| format!("Failed to create {}", staging.display()))?;
        writer.write_record(FIELDS)?;
        for row in rows {
            writer.write_record(row.values())?;
        }
        writer
            .flush()
            .with_context(|| format!("Failed to flush {}", staging.display()))?;
    }

    fs::rename(&staging, path)
        .with_context(|| format!("Failed to move snapshot into place: {}", path.display()))?;
    Ok(())
}

/// Informational summary written alongside the snapshot.
///
/// Older metadata files only carry `last_updated`, `total_records`,
/// `resource_id` and `source`; the remaining fields default when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub last_updated: String,
    pub total_records: usize,
    #[serde(default)]
    pub new_records: usize,
    #[serde(default)]
    pub updated_records: usize,
    #[serde(default)]
    pub fetch_mode: Option<FetchMode>,
    pub resource_id: String,
    pub source: String,
}

pub fn write_metadata(path: &Path, meta: &RunMetadata) -> Result<()> {
    ensure_parent(path)?;
    let json = serde_json::to_string_pretty(meta)?;
    let staging = staging_path(path);
    fs::write(&staging, json)
        .with_context(|| format!("Failed to write {}", staging.display()))?;
    fs::rename(&staging, path)
        .with_context(|| format!("Failed to move metadata into place: {}", path.display()))?;
    Ok(())
}

/// Read the metadata file, if one exists.
pub fn read_metadata(path: &Path) -> Result<Option<RunMetadata>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read metadata: {}", path.display()))?;
    let meta = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse metadata: {}", path.display()))?;
    Ok(Some(meta))
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }
    Ok(())
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name: OsString = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
