//! Fetch strategy: full pagination or incremental query.
//!
//! With no watermark the whole resource is paged through with
//! `datastore_search`. With a watermark a single SQL query asks for records
//! whose `open_date` is strictly newer, oldest first. If that query fails for
//! any reason the strategy falls back to full pagination, so a broken SQL
//! endpoint costs time but never correctness.
//!
//! Page requests are issued one at a time. Each is retried up to
//! `max_retries` more times with a fixed delay, and a fixed delay separates
//! consecutive pages.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::client::{Page, RecordSource};
use crate::config::ApiConfig;
use crate::models::{RawRecord, TEMPORAL_FIELD};
use crate::progress::{FetchProgressEvent, FetchProgressReporter, NoProgress};

/// Pagination and retry parameters.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub page_size: usize,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub page_delay: Duration,
}

impl From<&ApiConfig> for FetchSettings {
    fn from(api: &ApiConfig) -> Self {
        Self {
            page_size: api.page_size,
            max_retries: api.max_retries,
            retry_delay: api.retry_delay(),
            page_delay: api.page_delay(),
        }
    }
}

/// Which path produced the fetched records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchMode {
    /// Full pagination, no watermark was available (or it was ignored).
    Full,
    /// Filtered query above the watermark.
    Incremental,
    /// The incremental query failed and full pagination was used instead.
    FallbackFull,
}

impl FetchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchMode::Full => "full",
            FetchMode::Incremental => "incremental",
            FetchMode::FallbackFull => "fallback_full",
        }
    }
}

#[derive(Debug)]
pub struct FetchOutcome {
    pub records: Vec<RawRecord>,
    pub mode: FetchMode,
}

pub struct FetchStrategy<'a, S: RecordSource + ?Sized> {
    source: &'a S,
    settings: FetchSettings,
    progress: &'a dyn FetchProgressReporter,
}

impl<'a, S: RecordSource + ?Sized> FetchStrategy<'a, S> {
    pub fn new(source: &'a S, settings: FetchSettings) -> Self {
        Self {
            source,
            settings,
            progress: &NoProgress,
        }
    }

    pub fn with_progress(mut self, progress: &'a dyn FetchProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    /// Fetch everything newer than `watermark`, or everything when it is `None`.
    pub fn fetch(&self, watermark: Option<&str>) -> Result<FetchOutcome> {
        let Some(watermark) = watermark else {
            info!("No watermark, fetching full dataset");
            return Ok(FetchOutcome {
                records: self.fetch_all()?,
                mode: FetchMode::Full,
            });
        };

        match self.fetch_incremental(watermark) {
            Ok(records) => {
                info!(watermark, count = records.len(), "Incremental fetch complete");
                Ok(FetchOutcome {
                    records,
                    mode: FetchMode::Incremental,
                })
            }
            Err(err) => {
                warn!(
                    watermark,
                    error = %format!("{err:#}"),
                    "Incremental query failed, falling back to full fetch"
                );
                Ok(FetchOutcome {
                    records: self.fetch_all()?,
                    mode: FetchMode::FallbackFull,
                })
            }
        }
    }

    /// Single query for records strictly newer than `watermark`. Not retried.
    pub fn fetch_incremental(&self, watermark: &str) -> Result<Vec<RawRecord>> {
        self.progress.report(FetchProgressEvent::Querying {
            watermark: watermark.to_string(),
        });
        let sql = incremental_query(self.source.resource_id(), watermark);
        debug!(%sql, "Issuing incremental query");
        self.source.fetch_by_query(&sql)
    }

    /// Page through the whole resource.
    ///
    /// Stops at the first short page or once the running count reaches the
    /// total reported by the first page.
    pub fn fetch_all(&self) -> Result<Vec<RawRecord>> {
        let page_size = self.settings.page_size;
        let mut all: Vec<RawRecord> = Vec::new();
        let mut offset = 0usize;
        let mut total: Option<u64> = None;

        loop {
            let page = self.fetch_page_with_retry(offset)?;
            let count = page.records.len();

            if total.is_none() {
                total = page.total;
                if let Some(t) = total {
                    info!(total = t, "Total records in dataset");
                }
            }

            all.extend(page.records);
            let fetched = all.len() as u64;
            self.progress.report(FetchProgressEvent::Paging {
                fetched,
                total: total.unwrap_or(fetched),
            });

            let reached_total = total.is_some_and(|t| fetched >= t);
            if count < page_size || reached_total {
                break;
            }

            offset += page_size;
            if !self.settings.page_delay.is_zero() {
                std::thread::sleep(self.settings.page_delay);
            }
        }

        Ok(all)
    }

    fn fetch_page_with_retry(&self, offset: usize) -> Result<Page> {
        let max_retries = self.settings.max_retries;
        let mut attempt = 0u32;

        loop {
            match self.source.fetch_page(offset, self.settings.page_size) {
                Ok(page) => {
                    if attempt > 0 {
                        info!(offset, attempt, "Page request succeeded after retry");
                    }
                    return Ok(page);
                }
                Err(err) if attempt < max_retries => {
                    attempt += 1;
                    warn!(
                        offset,
                        attempt,
                        max_retries,
                        error = %format!("{err:#}"),
                        "Page request failed, retrying"
                    );
                    self.progress.report(FetchProgressEvent::Retrying {
                        offset: offset as u64,
                        attempt,
                        max_retries,
                    });
                    if !self.settings.retry_delay.is_zero() {
                        std::thread::sleep(self.settings.retry_delay);
                    }
                }
                Err(err) => {
                    return Err(err.context(format!(
                        "Page at offset {} failed after {} attempt(s)",
                        offset,
                        attempt + 1
                    )));
                }
            }
        }
    }
}

/// SQL for records newer than `watermark`, oldest first.
pub fn incremental_query(resource_id: &str, watermark: &str) -> String {
    format!(
        "SELECT * FROM \"{}\" WHERE \"{field}\" > '{}' ORDER BY \"{field}\" ASC",
        resource_id.replace('"', "\"\""),
        watermark.replace('\'', "''"),
        field = TEMPORAL_FIELD,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use serde_json::json;
    use std::cell::{Cell, RefCell};

    fn record(id: usize) -> RawRecord {
        json!({ "case_id": format!("C{id}"), "open_date": format!("2024-01-{:02}", id % 28 + 1) })
            .as_object()
            .cloned()
            .unwrap()
    }

    /// In-memory DataStore with scripted page failures.
    struct FakeSource {
        rows: Vec<RawRecord>,
        report_total: bool,
        page_failures: Cell<u32>,
        query_fails: bool,
        page_calls: Cell<u32>,
        queries: RefCell<Vec<String>>,
    }

    impl FakeSource {
        fn new(n: usize) -> Self {
            Self {
                rows: (0..n).map(record).collect(),
                report_total: true,
                page_failures: Cell::new(0),
                query_fails: false,
                page_calls: Cell::new(0),
                queries: RefCell::new(Vec::new()),
            }
        }
    }

    impl RecordSource for FakeSource {
        fn fetch_page(&self, offset: usize, limit: usize) -> Result<Page> {
            self.page_calls.set(self.page_calls.get() + 1);
            if self.page_failures.get() > 0 {
                self.page_failures.set(self.page_failures.get() - 1);
                bail!("connection reset by peer");
            }
            let end = (offset + limit).min(self.rows.len());
            let start = offset.min(end);
            Ok(Page {
                records: self.rows[start..end].to_vec(),
                total: self.report_total.then_some(self.rows.len() as u64),
            })
        }

        fn fetch_by_query(&self, sql: &str) -> Result<Vec<RawRecord>> {
            self.queries.borrow_mut().push(sql.to_string());
            if self.query_fails {
                bail!("datastore_search_sql returned HTTP 403");
            }
            Ok(self.rows[..1].to_vec())
        }

        fn resource_id(&self) -> &str {
            "res-1"
        }
    }

    fn settings(page_size: usize, max_retries: u32) -> FetchSettings {
        FetchSettings {
            page_size,
            max_retries,
            retry_delay: Duration::ZERO,
            page_delay: Duration::ZERO,
        }
    }

    #[test]
    fn full_fetch_stops_on_short_page() {
        let source = FakeSource::new(5);
        let outcome = FetchStrategy::new(&source, settings(2, 0))
            .fetch(None)
            .unwrap();

        assert_eq!(outcome.mode, FetchMode::Full);
        assert_eq!(outcome.records.len(), 5);
        assert_eq!(source.page_calls.get(), 3);
    }

    #[test]
    fn full_fetch_stops_when_total_reached() {
        let source = FakeSource::new(4);
        let records = FetchStrategy::new(&source, settings(2, 0))
            .fetch_all()
            .unwrap();

        assert_eq!(records.len(), 4);
        assert_eq!(source.page_calls.get(), 2);
    }

    #[test]
    fn full_fetch_without_total_reads_until_empty_page() {
        let mut source = FakeSource::new(4);
        source.report_total = false;
        let records = FetchStrategy::new(&source, settings(2, 0))
            .fetch_all()
            .unwrap();

        assert_eq!(records.len(), 4);
        assert_eq!(source.page_calls.get(), 3);
    }

    #[test]
    fn transient_failures_are_retried_within_budget() {
        let source = FakeSource::new(3);
        source.page_failures.set(2);
        let records = FetchStrategy::new(&source, settings(10, 3))
            .fetch_all()
            .unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(source.page_calls.get(), 3);
    }

    #[test]
    fn exhausted_retries_are_fatal() {
        let source = FakeSource::new(3);
        source.page_failures.set(10);
        let err = FetchStrategy::new(&source, settings(10, 3))
            .fetch(None)
            .unwrap_err();

        assert_eq!(source.page_calls.get(), 4);
        assert!(format!("{err:#}").contains("failed after 4 attempt(s)"));
    }

    #[test]
    fn watermark_uses_incremental_query() {
        let source = FakeSource::new(5);
        let outcome = FetchStrategy::new(&source, settings(2, 0))
            .fetch(Some("2024-01-03"))
            .unwrap();

        assert_eq!(outcome.mode, FetchMode::Incremental);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(source.page_calls.get(), 0);
        let queries = source.queries.borrow();
        assert_eq!(queries.len(), 1);
        assert!(queries[0].contains("\"open_date\" > '2024-01-03'"));
    }

    #[test]
    fn failed_incremental_query_falls_back_to_full_fetch() {
        let mut source = FakeSource::new(5);
        source.query_fails = true;
        let outcome = FetchStrategy::new(&source, settings(2, 0))
            .fetch(Some("2024-01-03"))
            .unwrap();

        assert_eq!(outcome.mode, FetchMode::FallbackFull);
        assert_eq!(outcome.records.len(), 5);
    }

    #[test]
    fn incremental_query_escapes_quotes() {
        let sql = incremental_query("res\"id", "2024-01-01' OR '1'='1");
        assert_eq!(
            sql,
            "SELECT * FROM \"res\"\"id\" WHERE \"open_date\" > '2024-01-01'' OR ''1''=''1' \
             ORDER BY \"open_date\" ASC"
        );
    }
}
