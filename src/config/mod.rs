//! Configuration management for the strategy engine.
//!
//! Loads settings from a `.env` file, an optional `config.toml`, and
//! `STRATEGY_ENGINE__*` environment variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Event bus connection and polling
    #[serde(default)]
    pub bus: BusConfig,
    /// Strategy configuration store
    #[serde(default)]
    pub store: StoreConfig,
    /// Strategy catalog refresh behaviour
    #[serde(default)]
    pub catalog: CatalogConfig,
    /// Command dispatch to execution services
    #[serde(default)]
    pub execution: ExecutionConfig,
    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Seconds to wait for in-flight work after a shutdown signal
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Redis connection URL
    #[serde(default = "default_bus_url")]
    pub url: String,
    /// Maximum time a single poll blocks waiting for entries
    #[serde(default = "default_block_ms")]
    pub block_ms: u64,
    /// Maximum entries fetched per stream per poll
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Fixed wait after a failed read before polling again
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite strategy database
    #[serde(default = "default_store_path")]
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Reload active strategies every N seconds (0 = load once at startup)
    #[serde(default)]
    pub refresh_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Send orders with `confirm = false` so services do not commit them
    #[serde(default)]
    pub dry_run: bool,
    /// Client-side timeout for each trade request
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Execution-service base URL per platform tag, layered over the
    /// built-in predict and polymarket endpoints
    #[serde(
        default = "default_endpoints",
        deserialize_with = "deserialize_endpoints"
    )]
    pub endpoints: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Directory for hourly-rolling log files (stdout only when unset)
    #[serde(default)]
    pub directory: Option<String>,
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

// Default value functions
fn default_bus_url() -> String {
    "redis://redis:6379".to_string()
}

fn default_block_ms() -> u64 {
    5000
}

fn default_batch_size() -> usize {
    10
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_store_path() -> String {
    "data/strategies.db".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_endpoints() -> HashMap<String, String> {
    HashMap::from([
        ("predict".to_string(), "http://predict-account:8000".to_string()),
        (
            "polymarket".to_string(),
            "http://polymarket-account:8000".to_string(),
        ),
    ])
}

fn deserialize_endpoints<'de, D>(deserializer: D) -> Result<HashMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let configured = HashMap::<String, String>::deserialize(deserializer)?;
    let mut endpoints = default_endpoints();
    endpoints.extend(configured);
    Ok(endpoints)
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_shutdown_grace_secs() -> u64 {
    2
}

impl Config {
    /// Load configuration from environment variables and config files.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("STRATEGY_ENGINE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.bus.url.is_empty(), "bus.url must be set");
        anyhow::ensure!(self.bus.block_ms > 0, "bus.block_ms must be positive");
        anyhow::ensure!(self.bus.batch_size > 0, "bus.batch_size must be positive");
        anyhow::ensure!(
            self.bus.retry_backoff_ms > 0,
            "bus.retry_backoff_ms must be positive"
        );
        anyhow::ensure!(!self.store.path.is_empty(), "store.path must be set");
        anyhow::ensure!(
            self.execution.request_timeout_secs > 0,
            "execution.request_timeout_secs must be positive"
        );
        anyhow::ensure!(
            !self.execution.endpoints.is_empty(),
            "at least one execution endpoint must be configured"
        );

        for (platform, url) in &self.execution.endpoints {
            reqwest::Url::parse(url)
                .with_context(|| format!("invalid endpoint URL for platform {platform}: {url}"))?;
        }

        Ok(())
    }

    pub fn block_timeout(&self) -> Duration {
        Duration::from_millis(self.bus.block_ms)
    }

    /// Catalog refresh period, `None` when the catalog is a startup snapshot.
    pub fn catalog_refresh_interval(&self) -> Option<Duration> {
        (self.catalog.refresh_interval_secs > 0)
            .then(|| Duration::from_secs(self.catalog.refresh_interval_secs))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bus: BusConfig::default(),
            store: StoreConfig::default(),
            catalog: CatalogConfig::default(),
            execution: ExecutionConfig::default(),
            logging: LoggingConfig::default(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            url: default_bus_url(),
            block_ms: default_block_ms(),
            batch_size: default_batch_size(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 0,
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            request_timeout_secs: default_request_timeout_secs(),
            endpoints: default_endpoints(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.execution.endpoints.len(), 2);
        assert_eq!(config.block_timeout(), Duration::from_secs(5));
        assert_eq!(config.execution.request_timeout_secs, 30);
    }

    #[test]
    fn test_refresh_disabled_by_default() {
        let mut config = Config::default();
        assert_eq!(config.catalog_refresh_interval(), None);

        config.catalog.refresh_interval_secs = 60;
        assert_eq!(
            config.catalog_refresh_interval(),
            Some(Duration::from_secs(60))
        );
    }

    #[test]
    fn test_rejects_bad_endpoint() {
        let mut config = Config::default();
        config
            .execution
            .endpoints
            .insert("predict".to_string(), "not a url".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_endpoint_override_keeps_other_defaults() {
        let execution: ExecutionConfig = serde_json::from_value(serde_json::json!({
            "endpoints": { "predict": "http://localhost:9000" }
        }))
        .unwrap();

        assert_eq!(execution.endpoints["predict"], "http://localhost:9000");
        assert_eq!(
            execution.endpoints["polymarket"],
            "http://polymarket-account:8000"
        );
    }

    #[test]
    fn test_extra_endpoint_is_added() {
        let execution: ExecutionConfig = serde_json::from_value(serde_json::json!({
            "endpoints": { "kalshi": "http://kalshi-account:8000" }
        }))
        .unwrap();

        assert_eq!(execution.endpoints.len(), 3);
        assert_eq!(execution.endpoints["predict"], "http://predict-account:8000");
    }

    #[test]
    fn test_rejects_zero_block() {
        let mut config = Config::default();
        config.bus.block_ms = 0;
        assert!(config.validate().is_err());
    }
}
