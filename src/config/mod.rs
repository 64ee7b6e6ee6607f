//! Configuration management for the batch engine
//!
//! This module handles loading, validation, and management of engine configuration.

pub mod models;
pub mod validation;

pub use models::*;
pub use validation::Validate;

use crate::utils::error::{BatchError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Main configuration struct for the engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote store connection
    #[serde(default)]
    pub client: ClientConfig,
    /// Batch sizing and dispatch
    #[serde(default)]
    pub batch: BatchConfig,
    /// Retry policy
    #[serde(default)]
    pub retry: RetryConfig,
    /// Dispatch throttling
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Logging
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from: {:?}", path);

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| BatchError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| BatchError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;

        debug!("Configuration loaded successfully");
        Ok(config)
    }

    /// Load configuration from environment variables on top of the defaults
    pub fn from_env() -> Result<Self> {
        info!("Loading configuration from environment variables");
        Self::default().apply_env()
    }

    /// Overlay `VECBATCH_*` environment variables
    pub fn apply_env(self) -> Result<Self> {
        self.apply_lookup(|key| std::env::var(key).ok())
    }

    /// Overlay variables resolved through `lookup`
    pub fn apply_lookup<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("VECBATCH_URL") {
            self.client.url = url;
        }
        if let Some(api_key) = lookup("VECBATCH_API_KEY") {
            self.client.api_key = Some(api_key);
        }
        if let Some(timeout) = lookup("VECBATCH_TIMEOUT") {
            self.client.timeout = parse_var("VECBATCH_TIMEOUT", &timeout)?;
        }
        if let Some(level) = lookup("VECBATCH_CONSISTENCY_LEVEL") {
            self.client.consistency_level = Some(level.parse().map_err(BatchError::Config)?);
        }
        if let Some(size) = lookup("VECBATCH_BATCH_SIZE") {
            self.batch.sizing = BatchSizing::Fixed {
                size: parse_var("VECBATCH_BATCH_SIZE", &size)?,
            };
        }
        if let Some(concurrency) = lookup("VECBATCH_CONCURRENCY") {
            self.batch.concurrency = parse_var("VECBATCH_CONCURRENCY", &concurrency)?;
        }
        if let Some(max_retries) = lookup("VECBATCH_MAX_RETRIES") {
            self.retry.max_retries = parse_var("VECBATCH_MAX_RETRIES", &max_retries)?;
        }
        if let Some(timeout_retries) = lookup("VECBATCH_TIMEOUT_RETRIES") {
            self.retry.timeout_retries = parse_var("VECBATCH_TIMEOUT_RETRIES", &timeout_retries)?;
        }
        if let Some(rpm) = lookup("VECBATCH_REQUESTS_PER_MINUTE") {
            self.rate_limit.requests_per_minute =
                Some(parse_var("VECBATCH_REQUESTS_PER_MINUTE", &rpm)?);
        }
        if let Some(level) = lookup("VECBATCH_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = lookup("VECBATCH_LOG_JSON") {
            self.logging.json = matches!(json.to_lowercase().as_str(), "true" | "1" | "yes" | "on");
        }

        self.validate()?;
        Ok(self)
    }

    /// Validate the whole configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(BatchError::Config)
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| BatchError::Config(format!("Invalid value for {}: {}", key, e)))
}
