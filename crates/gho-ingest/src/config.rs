//! Configuration management
//!
//! Each component receives its own section: the page source gets
//! [`SourceConfig`], the driver gets [`PipelineConfig`], storage gets
//! [`DatabaseConfig`]. Values come from defaults, then `.env` / `GHO_*`
//! environment variables, then CLI overrides.

use crate::error::{IngestError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default SQLite database, created next to the working directory if missing.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://gho.db";

/// Default GHO OData API root.
pub const DEFAULT_API_BASE_URL: &str = "https://ghoapi.azureedge.net/api";

/// Life expectancy at birth (years).
pub const DEFAULT_INDICATOR: &str = "WHOSIS_000001";

/// Records requested per page.
pub const DEFAULT_PAGE_SIZE: u64 = 1000;

/// Pause between page requests in milliseconds.
pub const DEFAULT_PAGE_DELAY_MS: u64 = 500;

/// Per-request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Valid records committed per transaction.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Default checkpoint file location.
pub const DEFAULT_CHECKPOINT_PATH: &str = "checkpoint.json";

/// Full configuration for one pipeline run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub source: SourceConfig,
    pub pipeline: PipelineConfig,
}

/// Relational store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Remote page source settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// API root, without trailing slash
    pub base_url: String,
    /// Indicator code appended to the base URL
    pub indicator: String,
    pub page_size: u64,
    /// Pause between consecutive page requests
    pub page_delay: Duration,
    pub request_timeout: Duration,
}

/// Driver settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub batch_size: usize,
    pub checkpoint_path: PathBuf,
    /// Optional ceiling on accepted records per run. Off by default.
    pub max_rows: Option<u64>,
    /// When false, the checkpoint is deleted and extraction restarts at 0.
    pub resume: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_DATABASE_URL.to_string(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            indicator: DEFAULT_INDICATOR.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            page_delay: Duration::from_millis(DEFAULT_PAGE_DELAY_MS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            checkpoint_path: PathBuf::from(DEFAULT_CHECKPOINT_PATH),
            max_rows: None,
            resume: true,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

impl Config {
    /// Load configuration from `.env`, the environment and defaults
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_env();
        config.validate()?;

        Ok(config)
    }

    /// Read `GHO_*` environment variables on top of the defaults
    ///
    /// Unparseable numeric values fall back to their defaults.
    pub fn from_env() -> Self {
        let defaults = SourceConfig::default();

        let database = DatabaseConfig {
            url: std::env::var("GHO_DATABASE_URL")
                .or_else(|_| std::env::var("DATABASE_URL"))
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
        };

        let source = SourceConfig {
            base_url: std::env::var("GHO_API_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            indicator: std::env::var("GHO_INDICATOR").unwrap_or(defaults.indicator),
            page_size: env_parse("GHO_PAGE_SIZE").unwrap_or(defaults.page_size),
            page_delay: env_parse("GHO_PAGE_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.page_delay),
            request_timeout: env_parse("GHO_REQUEST_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
        };

        let pipeline = PipelineConfig {
            batch_size: env_parse("GHO_BATCH_SIZE").unwrap_or(DEFAULT_BATCH_SIZE),
            checkpoint_path: std::env::var("GHO_CHECKPOINT_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CHECKPOINT_PATH)),
            max_rows: env_parse("GHO_MAX_ROWS"),
            resume: true,
        };

        Self {
            database,
            source,
            pipeline,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.database.url.is_empty() {
            return Err(IngestError::config("Database URL cannot be empty"));
        }

        if self.source.base_url.is_empty() {
            return Err(IngestError::config("API base URL cannot be empty"));
        }

        if self.source.indicator.trim().is_empty() {
            return Err(IngestError::config("Indicator code cannot be empty"));
        }

        if self.source.page_size == 0 {
            return Err(IngestError::config("Page size must be greater than 0"));
        }

        if self.source.request_timeout.is_zero() {
            return Err(IngestError::config("Request timeout must be greater than 0"));
        }

        if self.pipeline.batch_size == 0 {
            return Err(IngestError::config("Batch size must be greater than 0"));
        }

        if self.pipeline.max_rows == Some(0) {
            return Err(IngestError::config(
                "max_rows must be greater than 0 (omit it to disable the ceiling)",
            ));
        }

        if self.pipeline.checkpoint_path.as_os_str().is_empty() {
            return Err(IngestError::config("Checkpoint path cannot be empty"));
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "GHO_DATABASE_URL",
        "GHO_API_BASE_URL",
        "GHO_INDICATOR",
        "GHO_PAGE_SIZE",
        "GHO_PAGE_DELAY_MS",
        "GHO_BATCH_SIZE",
        "GHO_MAX_ROWS",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.source.indicator, DEFAULT_INDICATOR);
        assert_eq!(config.pipeline.max_rows, None);
        assert!(config.pipeline.resume);
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        std::env::set_var("GHO_DATABASE_URL", "sqlite://other.db");
        std::env::set_var("GHO_API_BASE_URL", "http://localhost:9000/api/");
        std::env::set_var("GHO_PAGE_SIZE", "250");
        std::env::set_var("GHO_PAGE_DELAY_MS", "0");
        std::env::set_var("GHO_MAX_ROWS", "1000");

        let config = Config::from_env();
        clear_env();

        assert_eq!(config.database.url, "sqlite://other.db");
        assert_eq!(config.source.base_url, "http://localhost:9000/api");
        assert_eq!(config.source.page_size, 250);
        assert!(config.source.page_delay.is_zero());
        assert_eq!(config.pipeline.max_rows, Some(1000));
    }

    #[test]
    #[serial]
    fn test_unparseable_numbers_fall_back() {
        clear_env();
        std::env::set_var("GHO_BATCH_SIZE", "lots");

        let config = Config::from_env();
        clear_env();

        assert_eq!(config.pipeline.batch_size, DEFAULT_BATCH_SIZE);
    }

    #[test]
    fn test_validate_rejects_zero_sizes() {
        let mut config = Config::default();
        config.source.page_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.pipeline.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.pipeline.max_rows = Some(0);
        assert!(config.validate().is_err());
    }
}
