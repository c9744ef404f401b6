//! Crawl configuration.
//!
//! A `CrawlConfig` is fixed for the duration of one crawl. Values come from
//! defaults, then environment variables, then explicit overrides (CLI flags).

use std::time::Duration;

use thiserror::Error;

/// Default number of listing pages to crawl.
pub const DEFAULT_PAGE_COUNT: u32 = 5;

/// Default number of concurrent workers.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Default maximum number of records returned by one crawl.
pub const DEFAULT_RESULT_CAP: usize = 100;

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// IO error while reading a configuration file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file is not valid YAML for the expected shape.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Configuration for one crawl run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlConfig {
    /// Number of pages to crawl, numbered `1..=page_count`.
    pub page_count: u32,
    /// Number of concurrent workers.
    pub concurrency: usize,
    /// Maximum number of records returned.
    pub result_cap: usize,
    /// Optional deadline for the whole crawl.
    pub timeout: Option<Duration>,
    /// Drop records whose link was already collected in this crawl.
    pub dedupe: bool,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            page_count: DEFAULT_PAGE_COUNT,
            concurrency: DEFAULT_CONCURRENCY,
            result_cap: DEFAULT_RESULT_CAP,
            timeout: None,
            dedupe: true,
        }
    }
}

impl CrawlConfig {
    /// Creates a configuration for `page_count` pages and `concurrency`
    /// workers, other values at their defaults.
    pub fn new(page_count: u32, concurrency: usize) -> Self {
        Self {
            page_count,
            concurrency,
            ..Default::default()
        }
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `CRAWL_PAGE_COUNT`: Pages to crawl (default: 5)
    /// - `CRAWL_CONCURRENCY`: Concurrent workers (default: 5)
    /// - `CRAWL_RESULT_CAP`: Maximum records returned (default: 100)
    /// - `CRAWL_TIMEOUT_SECS`: Global deadline in seconds (default: none)
    /// - `CRAWL_DEDUPE`: Drop repeated links (default: true)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value or the
    /// resulting configuration fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self::load_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Reads the same variables as [`CrawlConfig::from_env`] without
    /// validating, so callers can layer further overrides first.
    pub fn load_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("CRAWL_PAGE_COUNT") {
            config.page_count = parse_env_value(&val, "CRAWL_PAGE_COUNT")?;
        }

        if let Ok(val) = std::env::var("CRAWL_CONCURRENCY") {
            config.concurrency = parse_env_value(&val, "CRAWL_CONCURRENCY")?;
        }

        if let Ok(val) = std::env::var("CRAWL_RESULT_CAP") {
            config.result_cap = parse_env_value(&val, "CRAWL_RESULT_CAP")?;
        }

        if let Ok(val) = std::env::var("CRAWL_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "CRAWL_TIMEOUT_SECS")?;
            config.timeout = Some(Duration::from_secs(secs));
        }

        if let Ok(val) = std::env::var("CRAWL_DEDUPE") {
            config.dedupe = parse_env_bool(&val, "CRAWL_DEDUPE")?;
        }

        Ok(config)
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_count == 0 {
            return Err(ConfigError::ValidationFailed(
                "page_count must be at least 1".to_string(),
            ));
        }

        if self.concurrency == 0 {
            return Err(ConfigError::ValidationFailed(
                "concurrency must be at least 1".to_string(),
            ));
        }

        if self.result_cap == 0 {
            return Err(ConfigError::ValidationFailed(
                "result_cap must be at least 1".to_string(),
            ));
        }

        if self.timeout == Some(Duration::ZERO) {
            return Err(ConfigError::ValidationFailed(
                "timeout must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Number of workers actually spawned. Never more than there are pages.
    pub fn effective_workers(&self) -> usize {
        self.concurrency.min(self.page_count as usize).max(1)
    }

    pub fn with_page_count(mut self, page_count: u32) -> Self {
        self.page_count = page_count;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_result_cap(mut self, result_cap: usize) -> Self {
        self.result_cap = result_cap;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_dedupe(mut self, dedupe: bool) -> Self {
        self.dedupe = dedupe;
        self
    }
}

/// Parses an environment variable value into the specified type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })
}

/// Parses a boolean environment variable value.
fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean, got '{}'", value),
        }),
    }
}
