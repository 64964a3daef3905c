//! Configuration management for the channel quota engine.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{QuotaError, Result};
use crate::ratelimit::DEFAULT_RPM_HISTORY_CAP;

/// Prefix for environment overrides, e.g. `CHANNEL_QUOTA__STORE__REDIS_URL`.
pub const ENV_PREFIX: &str = "CHANNEL_QUOTA";

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Shared store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Shared store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Redis URL; when absent the in-process backend is used
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Timeout applied to each store command, in milliseconds
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            command_timeout_ms: default_command_timeout_ms(),
        }
    }
}

fn default_command_timeout_ms() -> u64 {
    1000
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// RPM timestamps kept for monitoring when a channel's RPM is unlimited
    #[serde(default = "default_rpm_history_cap")]
    pub rpm_history_cap: i64,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            rpm_history_cap: default_rpm_history_cap(),
        }
    }
}

fn default_rpm_history_cap() -> i64 {
    DEFAULT_RPM_HISTORY_CAP
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl QuotaConfig {
    /// Get the Redis URL, treating an empty value as unset.
    pub fn redis_url(&self) -> Option<&str> {
        self.store
            .redis_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: QuotaConfig = serde_yaml::from_str(yaml)
            .map_err(|e| QuotaError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an optional file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            if !path.exists() {
                return Err(QuotaError::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: QuotaConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| QuotaError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the limiter cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.store.command_timeout_ms == 0 {
            return Err(QuotaError::Config(
                "store.command_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.rate_limiting.rpm_history_cap <= 0 {
            return Err(QuotaError::Config(
                "rate_limiting.rpm_history_cap must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
