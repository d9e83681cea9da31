//! CKAN DataStore transport.
//!
//! [`RecordSource`] is the seam between the fetch strategy and the network.
//! [`CkanClient`] implements it over `reqwest::blocking` against the two
//! DataStore actions this tool needs:
//!
//! | Action | Used for |
//! |--------|----------|
//! | `datastore_search` | Full paginated fetch (`limit` / `offset`) |
//! | `datastore_search_sql` | Incremental fetch above the watermark |
//!
//! Both actions wrap their payload in `{"success": bool, "result": {...}}`.
//! A body without `success: true` is reported as an error, exactly like a
//! transport failure, so callers only have one failure path to handle.

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use serde_json::Value;

use crate::config::ApiConfig;
use crate::models::RawRecord;

/// One page of a paginated search.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub records: Vec<RawRecord>,
    /// Total number of records in the resource, as reported by the API.
    pub total: Option<u64>,
}

/// A remote source of records.
///
/// Implementations perform a single request per call; retry and pacing
/// belong to [`crate::fetch::FetchStrategy`].
pub trait RecordSource {
    /// Fetch `limit` records starting at `offset`.
    fn fetch_page(&self, offset: usize, limit: usize) -> Result<Page>;

    /// Run a raw SQL query against the resource.
    fn fetch_by_query(&self, sql: &str) -> Result<Vec<RawRecord>>;

    /// Name of the resource, used to build SQL queries.
    fn resource_id(&self) -> &str;
}

/// HTTP client for a CKAN DataStore resource.
pub struct CkanClient {
    http: reqwest::blocking::Client,
    base_url: String,
    resource_id: String,
}

impl CkanClient {
    pub fn new(api: &ApiConfig) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(api.timeout())
            .user_agent(api.user_agent.clone())
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: api.base_url.trim_end_matches('/').to_string(),
            resource_id: api.resource_id.clone(),
        })
    }

    fn get_json(&self, action: &str, query: &[(&str, String)]) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, action);
        let response = self
            .http
            .get(&url)
            .query(query)
            .send()
            .with_context(|| format!("Request to {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            bail!("{} returned HTTP {}: {}", action, status, truncate(&body, 200));
        }

        response
            .json::<Value>()
            .with_context(|| format!("{} returned invalid JSON", action))
    }
}

impl RecordSource for CkanClient {
    fn fetch_page(&self, offset: usize, limit: usize) -> Result<Page> {
        let body = self.get_json(
            "datastore_search",
            &[
                ("resource_id", self.resource_id.clone()),
                ("limit", limit.to_string()),
                ("offset", offset.to_string()),
            ],
        )?;
        parse_search_response(body).with_context(|| format!("Bad page at offset {}", offset))
    }

    fn fetch_by_query(&self, sql: &str) -> Result<Vec<RawRecord>> {
        let body = self.get_json("datastore_search_sql", &[("sql", sql.to_string())])?;
        Ok(parse_search_response(body)?.records)
    }

    fn resource_id(&self) -> &str {
        &self.resource_id
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    result: Option<SearchResult>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    records: Vec<RawRecord>,
    #[serde(default)]
    total: Option<u64>,
}

/// Unwrap a DataStore response envelope into a [`Page`].
pub fn parse_search_response(body: Value) -> Result<Page> {
    let envelope: Envelope =
        serde_json::from_value(body).context("Unexpected DataStore response shape")?;

    if !envelope.success {
        let detail = envelope
            .error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no error detail".to_string());
        bail!("API returned success=false: {}", detail);
    }

    let result = envelope
        .result
        .ok_or_else(|| anyhow!("API response is missing 'result'"))?;

    Ok(Page {
        records: result.records,
        total: result.total,
    })
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_records_and_total() {
        let page = parse_search_response(json!({
            "success": true,
            "result": {
                "records": [{"case_id": "A"}, {"case_id": "B"}],
                "total": 2,
                "fields": [{"id": "case_id", "type": "text"}]
            }
        }))
        .unwrap();

        assert_eq!(page.records.len(), 2);
        assert_eq!(page.total, Some(2));
    }

    #[test]
    fn sql_results_have_no_total() {
        let page = parse_search_response(json!({
            "success": true,
            "result": { "records": [{"case_id": "A"}] }
        }))
        .unwrap();

        assert_eq!(page.records.len(), 1);
        assert_eq!(page.total, None);
    }

    #[test]
    fn success_false_is_an_error() {
        let err = parse_search_response(json!({
            "success": false,
            "error": {"__type": "Validation Error"}
        }))
        .unwrap_err();

        assert!(err.to_string().contains("success=false"));
    }

    #[test]
    fn missing_success_is_an_error() {
        let err = parse_search_response(json!({ "result": { "records": [] } })).unwrap_err();
        assert!(err.to_string().contains("success=false"));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("abc", 10), "abc");
    }
}
