use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides `output.dir`.
pub const OUTPUT_DIR_ENV: &str = "OUTPUT_DIR";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_resource_id")]
    pub resource_id: String,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            resource_id: default_resource_id(),
            page_size: default_page_size(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            page_delay_ms: default_page_delay_ms(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_base_url() -> String {
    "https://data.boston.gov/api/3/action".to_string()
}
fn default_resource_id() -> String {
    "254adca6-64ab-4c5c-9fc0-a6da622be185".to_string()
}
fn default_page_size() -> usize {
    1000
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_delay_ms() -> u64 {
    5000
}
fn default_page_delay_ms() -> u64 {
    500
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_user_agent() -> String {
    "Boston311-Dashboard/1.0".to_string()
}

impl ApiConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Host part of `base_url`, recorded as the `source` in run metadata.
    pub fn source_host(&self) -> &str {
        let rest = self
            .base_url
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.base_url);
        rest.split('/').next().unwrap_or(rest)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_snapshot_file")]
    pub snapshot_file: String,
    #[serde(default = "default_metadata_file")]
    pub metadata_file: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            snapshot_file: default_snapshot_file(),
            metadata_file: default_metadata_file(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_snapshot_file() -> String {
    "boston_311_requests.csv".to_string()
}
fn default_metadata_file() -> String {
    "metadata.json".to_string()
}

impl OutputConfig {
    pub fn snapshot_path(&self) -> PathBuf {
        self.dir.join(&self.snapshot_file)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.dir.join(&self.metadata_file)
    }
}

impl Config {
    /// Built-in defaults with the environment override applied.
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        apply_env_overrides(&mut config);
        validate(&config)?;
        Ok(config)
    }
}

/// Load the TOML config at `path`, or the defaults when `path` is `None`.
pub fn resolve_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(p) => load_config(p),
        None => Config::from_env(),
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    apply_env_overrides(&mut config);
    validate(&config)?;

    Ok(config)
}

fn apply_env_overrides(config: &mut Config) {
    if let Ok(dir) = std::env::var(OUTPUT_DIR_ENV) {
        if !dir.trim().is_empty() {
            config.output.dir = PathBuf::from(dir);
        }
    }
}

fn validate(config: &Config) -> Result<()> {
    if config.api.page_size == 0 {
        anyhow::bail!("api.page_size must be > 0");
    }

    if config.api.resource_id.trim().is_empty() {
        anyhow::bail!("api.resource_id must not be empty");
    }

    if !config.api.base_url.starts_with("http://") && !config.api.base_url.starts_with("https://")
    {
        anyhow::bail!(
            "api.base_url must be an http(s) URL, got '{}'",
            config.api.base_url
        );
    }

    if config.output.snapshot_file.trim().is_empty() {
        anyhow::bail!("output.snapshot_file must not be empty");
    }

    if config.output.metadata_file.trim().is_empty() {
        anyhow::bail!("output.metadata_file must not be empty");
    }

    if config.output.snapshot_file == config.output.metadata_file {
        anyhow::bail!("output.snapshot_file and output.metadata_file must differ");
    }

    Ok(())
}
