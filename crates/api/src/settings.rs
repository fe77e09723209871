//! Service Configuration
//!
//! Built once at startup from, in increasing priority: built-in defaults, an
//! optional config file, and `DATALOG_*` environment variables
//! (`DATALOG_DATABASE__URL`, `DATALOG_RATE_LIMIT__ENABLED`, ...).

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use storage::{DatabaseConfig, MAX_RECENT};

use crate::error::ApiError;
use crate::rate_limit::RateLimitConfig;

/// Default config file, without extension
pub const DEFAULT_CONFIG_PATH: &str = "config/datalog";

/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`]
pub const CONFIG_PATH_ENV: &str = "DATALOG_CONFIG";

/// Top-level service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub query: QueryConfig,
    pub rate_limit: RateLimitConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to bind
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Read-path settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Rows returned per query, never more than 1000
    pub limit: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self { limit: MAX_RECENT }
    }
}

impl QueryConfig {
    /// Configured limit clamped to the storage cap
    pub fn effective_limit(&self) -> usize {
        self.limit.min(MAX_RECENT)
    }
}

/// Prometheus exporter settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Serve `/metrics`
    pub enabled: bool,
}

/// Log output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load from the file named by `DATALOG_CONFIG` (or the default path) and the environment
    pub fn load() -> Result<Self, ApiError> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(&path)
    }

    /// Load from an explicit file path; a missing file is not an error
    pub fn load_from(path: &str) -> Result<Self, ApiError> {
        let config = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("DATALOG")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}
