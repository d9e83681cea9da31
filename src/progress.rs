//! Fetch progress reporting.
//!
//! A full fetch of a large resource takes hundreds of requests, so the fetch
//! strategy reports how far it has got. Progress is emitted on **stderr** so
//! stdout remains parseable for scripts.

use std::io::Write;

/// A single progress event for a fetch.
#[derive(Clone, Debug)]
pub enum FetchProgressEvent {
    /// Incremental query above the watermark has been issued.
    Querying { watermark: String },
    /// Full pagination: `fetched` records so far out of `total`.
    Paging { fetched: u64, total: u64 },
    /// A page request failed and will be retried.
    Retrying {
        offset: u64,
        attempt: u32,
        max_retries: u32,
    },
}

/// Reports fetch progress. Implementations write to stderr (human or JSON).
pub trait FetchProgressReporter: Send + Sync {
    fn report(&self, event: FetchProgressEvent);
}

/// Human-friendly progress on stderr: "fetch  paging  2,000 / 251,344 records".
pub struct StderrProgress;

impl FetchProgressReporter for StderrProgress {
    fn report(&self, event: FetchProgressEvent) {
        let line = match &event {
            FetchProgressEvent::Querying { watermark } => {
                format!("fetch  querying records after {}\n", watermark)
            }
            FetchProgressEvent::Paging { fetched, total } => format!(
                "fetch  paging  {} / {} records\n",
                format_number(*fetched),
                format_number(*total)
            ),
            FetchProgressEvent::Retrying {
                offset,
                attempt,
                max_retries,
            } => format!(
                "fetch  retry {}/{} for offset {}\n",
                attempt,
                max_retries,
                format_number(*offset)
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl FetchProgressReporter for JsonProgress {
    fn report(&self, event: FetchProgressEvent) {
        let obj = match &event {
            FetchProgressEvent::Querying { watermark } => serde_json::json!({
                "event": "progress",
                "phase": "querying",
                "watermark": watermark
            }),
            FetchProgressEvent::Paging { fetched, total } => serde_json::json!({
                "event": "progress",
                "phase": "paging",
                "n": fetched,
                "total": total
            }),
            FetchProgressEvent::Retrying {
                offset,
                attempt,
                max_retries,
            } => serde_json::json!({
                "event": "retry",
                "offset": offset,
                "attempt": attempt,
                "max_retries": max_retries
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl FetchProgressReporter for NoProgress {
    fn report(&self, _event: FetchProgressEvent) {}
}

/// Format an integer with thousands separators.
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Parse a `--progress` value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "off" | "none" => Some(ProgressMode::Off),
            "human" => Some(ProgressMode::Human),
            "json" => Some(ProgressMode::Json),
            _ => None,
        }
    }

    pub fn reporter(&self) -> Box<dyn FetchProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(251_344), "251,344");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn parse_progress_mode() {
        assert_eq!(ProgressMode::parse("json"), Some(ProgressMode::Json));
        assert_eq!(ProgressMode::parse("human"), Some(ProgressMode::Human));
        assert_eq!(ProgressMode::parse("off"), Some(ProgressMode::Off));
        assert_eq!(ProgressMode::parse("loud"), None);
    }
}
