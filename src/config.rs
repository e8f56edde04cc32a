//! Configuration loading and validation.
//!
//! Settings come from a TOML file ([`Config::load`]) or from the environment
//! ([`Config::from_env`], which also reads a `.env` file). Missing sections
//! fall back to defaults suitable for a local backend.
//!
//! ```toml
//! [api]
//! base_url = "http://localhost:8080"
//! timeout_secs = 30
//!
//! [catalog]
//! page_step = 5
//!
//! [logging]
//! level = "warn"
//! ```

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

pub const ENV_API_URL: &str = "SPORTBET_API_URL";
pub const ENV_TIMEOUT_SECS: &str = "SPORTBET_TIMEOUT_SECS";
pub const ENV_LOG: &str = "SPORTBET_LOG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),
    #[error("missing required field: {field}")]
    MissingField { field: &'static str },
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Backend REST API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// Per-request timeout.
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Matches revealed per "load more".
    pub page_step: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self { page_step: 5 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive, overridden by `RUST_LOG`.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl Config {
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse_toml(&content)
    }

    /// Defaults overridden by `SPORTBET_*` variables, after loading `.env` if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(url) = var(ENV_API_URL) {
            self.api.base_url = url;
        }
        if let Some(raw) = var(ENV_TIMEOUT_SECS) {
            self.api.timeout_secs = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                field: "timeout_secs",
                reason: format!("'{raw}' is not a number of seconds"),
            })?;
        }
        if let Some(level) = var(ENV_LOG) {
            self.logging.level = level;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let url = self.api.base_url.trim();
        if url.is_empty() {
            return Err(ConfigError::MissingField { field: "base_url" });
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                field: "base_url",
                reason: format!("'{url}' is not an http(s) URL"),
            });
        }
        if self.api.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "timeout_secs",
                reason: "must be greater than 0".to_string(),
            });
        }
        if self.catalog.page_step == 0 {
            return Err(ConfigError::InvalidValue {
                field: "page_step",
                reason: "must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}
