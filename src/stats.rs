//! Snapshot status overview.
//!
//! Summarizes what is on disk: row counts, identity coverage, the watermark
//! the next incremental fetch will use, and what the last run recorded in
//! its metadata file. Used by `ckan-snapshot status`.

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::progress::format_number;
use crate::snapshot::{read_metadata, read_snapshot};

/// Run the status command: read the snapshot and print a summary.
pub fn run_status(config: &Config) -> Result<()> {
    let snapshot_path = config.output.snapshot_path();
    let metadata_path = config.output.metadata_path();

    let snapshot = read_snapshot(&snapshot_path)?;
    let metadata = read_metadata(&metadata_path)?;

    let file_size = std::fs::metadata(&snapshot_path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Snapshot Status");
    println!("===============");
    println!();
    println!("  Resource:    {}", config.api.resource_id);
    println!("  Snapshot:    {}", snapshot_path.display());

    if snapshot.is_empty() {
        println!("  Records:     none (next sync is a full fetch)");
    } else {
        println!("  Size:        {}", format_bytes(file_size));
        println!(
            "  Records:     {}",
            format_number(snapshot.rows.len() as u64)
        );
        println!(
            "  With id:     {}",
            format_number(snapshot.ids.len() as u64)
        );
        println!(
            "  Watermark:   {}",
            snapshot.watermark.as_deref().unwrap_or("none")
        );
    }

    println!();
    match metadata {
        Some(meta) => {
            println!(
                "  Last run:    {}",
                format_rfc3339_relative(&meta.last_updated)
            );
            if let Some(mode) = meta.fetch_mode {
                println!("  Fetch mode:  {}", mode.as_str());
            }
            println!("  New:         {}", format_number(meta.new_records as u64));
            println!(
                "  Updated:     {}",
                format_number(meta.updated_records as u64)
            );
            println!("  Source:      {}", meta.source);
        }
        None => println!("  Last run:    never"),
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format an RFC 3339 timestamp as "<timestamp> (3 hours ago)".
///
/// Unparseable input is returned unchanged.
fn format_rfc3339_relative(ts: &str) -> String {
    match DateTime::parse_from_rfc3339(ts) {
        Ok(dt) => format!(
            "{} ({})",
            dt.with_timezone(&Utc).format("%Y-%m-%d %H:%M UTC"),
            relative_to_now(dt.timestamp())
        ),
        Err(_) => ts.to_string(),
    }
}

fn relative_to_now(ts: i64) -> String {
    let delta = Utc::now().timestamp() - ts;

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    }
}
