//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Traversal and leaf download behavior
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// IPFS node connection settings
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Blob directory and graph snapshot locations
    #[serde(default)]
    pub storage: StorageConfig,

    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Override values from environment variables.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Override values using the given variable lookup.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("IPFS_API_URL") {
            self.resolver.api_url = url;
        }

        if let Some(value) = lookup("MAX_CONCURRENT") {
            match value.parse() {
                Ok(n) => self.crawler.max_concurrent = n,
                Err(_) => log::warn!("Ignoring invalid MAX_CONCURRENT={value}"),
            }
        }

        if let Some(value) = lookup("CRAWL_TIMEOUT_SECS") {
            match value.parse() {
                Ok(secs) => self.crawler.timeout_secs = secs,
                Err(_) => log::warn!("Ignoring invalid CRAWL_TIMEOUT_SECS={value}"),
            }
        }

        if let Some(dir) = lookup("DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.crawler.max_concurrent == 0 {
            return Err(AppError::validation("crawler.max_concurrent must be > 0"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if self.resolver.user_agent.trim().is_empty() {
            return Err(AppError::validation("resolver.user_agent is empty"));
        }
        url::Url::parse(&self.resolver.api_url)
            .map_err(|e| AppError::validation(format!("resolver.api_url is invalid: {e}")))?;
        if self.storage.data_dir.as_os_str().is_empty() {
            return Err(AppError::validation("storage.data_dir is empty"));
        }
        Ok(())
    }
}

/// What to do with non-timeout resolver, store and file errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Stop the whole run on the first such error
    #[default]
    Abort,
    /// Log the error, abandon the branch and keep crawling
    Skip,
}

/// Traversal and leaf download settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// Maximum concurrent leaf download jobs
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Timeout in seconds for each block request
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub error_policy: ErrorPolicy,
}

impl CrawlerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: defaults::max_concurrent(),
            timeout_secs: defaults::timeout(),
            error_policy: ErrorPolicy::default(),
        }
    }
}

/// IPFS HTTP RPC API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Base URL of the node's RPC API
    #[serde(default = "defaults::api_url")]
    pub api_url: String,

    /// User-Agent header for RPC requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            api_url: defaults::api_url(),
            user_agent: defaults::user_agent(),
        }
    }
}

/// Output locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory where leaf blocks are exported
    #[serde(default = "defaults::data_dir")]
    pub data_dir: PathBuf,

    /// JSON snapshot of the block graph
    #[serde(default = "defaults::graph_file")]
    pub graph_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: defaults::data_dir(),
            graph_file: defaults::graph_file(),
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log filter when RUST_LOG is unset
    #[serde(default = "defaults::level")]
    pub level: String,

    /// Write logs to this file instead of stderr
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Append every decoded event batch to this file
    #[serde(default)]
    pub events_file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::level(),
            log_file: None,
            events_file: None,
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    // Crawler defaults
    pub fn max_concurrent() -> usize {
        10
    }
    pub fn timeout() -> u64 {
        10
    }

    // Resolver defaults
    pub fn api_url() -> String {
        "http://127.0.0.1:5001".into()
    }
    pub fn user_agent() -> String {
        concat!("dag-crawler/", env!("CARGO_PKG_VERSION")).into()
    }

    // Storage defaults
    pub fn data_dir() -> PathBuf {
        PathBuf::from("data")
    }
    pub fn graph_file() -> PathBuf {
        PathBuf::from("graph.json")
    }

    pub fn level() -> String {
        "info".into()
    }
}
