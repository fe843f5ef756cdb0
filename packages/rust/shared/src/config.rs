//! Application configuration for webcatalog.
//!
//! User config lives at `~/.webcatalog/webcatalog.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, Result};
use crate::types::JobConfig;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "webcatalog.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".webcatalog";

// ---------------------------------------------------------------------------
// Config structs (matching webcatalog.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Reconnaissance advisor settings.
    #[serde(default)]
    pub recon: ReconConfig,

    /// Crawl policies.
    #[serde(default)]
    pub crawl_policies: CrawlPoliciesConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Catalog database path.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Default maximum crawl depth.
    #[serde(default = "default_crawl_depth")]
    pub crawl_depth: u32,

    /// Default URL budget per job.
    #[serde(default = "default_max_urls")]
    pub max_urls: u64,

    /// Default concurrent crawl fetches.
    #[serde(default = "default_crawl_concurrency")]
    pub crawl_concurrency: u32,

    /// Default concurrent validations.
    #[serde(default = "default_concurrent_validations")]
    pub concurrent_validations: usize,

    /// Validate URLs while mapping is still crawling.
    #[serde(default = "default_true")]
    pub validate_during_mapping: bool,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            crawl_depth: default_crawl_depth(),
            max_urls: default_max_urls(),
            crawl_concurrency: default_crawl_concurrency(),
            concurrent_validations: default_concurrent_validations(),
            validate_during_mapping: true,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_db_path() -> String {
    "~/.webcatalog/catalog.db".into()
}
fn default_crawl_depth() -> u32 {
    3
}
fn default_max_urls() -> u64 {
    1000
}
fn default_crawl_concurrency() -> u32 {
    4
}
fn default_concurrent_validations() -> usize {
    10
}
fn default_request_timeout() -> u64 {
    15
}
fn default_true() -> bool {
    true
}

/// `[recon]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconConfig {
    /// Analysis endpoint URL. Absent means reconnaissance is disabled and
    /// jobs run with their configured defaults.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Timeout in seconds for the advisor call.
    #[serde(default = "default_recon_timeout")]
    pub timeout_secs: u64,
}

impl Default for ReconConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key_env: default_api_key_env(),
            timeout_secs: default_recon_timeout(),
        }
    }
}

fn default_api_key_env() -> String {
    "WEBCATALOG_RECON_API_KEY".into()
}
fn default_recon_timeout() -> u64 {
    5
}

/// `[crawl_policies]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlPoliciesConfig {
    /// URL include patterns.
    #[serde(default)]
    pub include_patterns: Vec<String>,

    /// URL exclude patterns.
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    /// Minimum ms between requests to the same host.
    #[serde(default)]
    pub rate_limit_ms: u64,
}

impl From<&AppConfig> for JobConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            validate_during_mapping: config.defaults.validate_during_mapping,
            concurrent_validations: config.defaults.concurrent_validations,
            request_timeout_secs: config.defaults.request_timeout_secs,
            crawl_concurrency: config.defaults.crawl_concurrency,
            rate_limit_ms: config.crawl_policies.rate_limit_ms,
            include_patterns: config.crawl_policies.include_patterns.clone(),
            exclude_patterns: config.crawl_policies.exclude_patterns.clone(),
            extra: Default::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.webcatalog/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| CatalogError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.webcatalog/webcatalog.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| CatalogError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| CatalogError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| CatalogError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| CatalogError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| CatalogError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Expand a leading `~` in a configured path against the user's home.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
