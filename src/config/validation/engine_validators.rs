//! Engine configuration validators

use super::trait_def::Validate;
use crate::config::Config;
use crate::config::models::*;
use tracing::debug;
use url::Url;

const MAX_BATCH_SIZE: usize = 10_000;
const MAX_CONCURRENCY: usize = 256;

impl Validate for Config {
    fn validate(&self) -> Result<(), String> {
        debug!("Validating engine configuration");

        self.client.validate()?;
        self.batch.validate()?;
        self.retry.validate()?;
        self.rate_limit.validate()?;
        self.logging.validate()?;

        Ok(())
    }
}

impl Validate for ClientConfig {
    fn validate(&self) -> Result<(), String> {
        if self.url.is_empty() {
            return Err("Store URL cannot be empty".to_string());
        }

        let url = Url::parse(&self.url).map_err(|e| format!("Store URL is invalid: {}", e))?;
        match url.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(format!(
                    "Store URL must use http:// or https:// scheme, got: {}",
                    scheme
                ));
            }
        }

        if self.timeout == 0 {
            return Err("Request timeout must be greater than 0".to_string());
        }

        if let Some(api_key) = &self.api_key {
            if api_key.trim().is_empty() {
                return Err("API key cannot be blank when set".to_string());
            }
        }

        Ok(())
    }
}

impl Validate for BatchSizing {
    fn validate(&self) -> Result<(), String> {
        match self {
            BatchSizing::Fixed { size } => {
                if *size == 0 {
                    return Err("Batch size must be greater than 0".to_string());
                }
                if *size > MAX_BATCH_SIZE {
                    return Err(format!("Batch size should not exceed {}", MAX_BATCH_SIZE));
                }
            }
            BatchSizing::Dynamic(dynamic) => {
                if dynamic.min_size == 0 {
                    return Err("Dynamic min_size must be greater than 0".to_string());
                }
                if dynamic.max_size > MAX_BATCH_SIZE {
                    return Err(format!(
                        "Dynamic max_size should not exceed {}",
                        MAX_BATCH_SIZE
                    ));
                }
                if dynamic.min_size > dynamic.max_size {
                    return Err("Dynamic min_size cannot exceed max_size".to_string());
                }
                if dynamic.initial_size < dynamic.min_size
                    || dynamic.initial_size > dynamic.max_size
                {
                    return Err("Dynamic initial_size must lie within [min_size, max_size]".to_string());
                }
                if dynamic.target_duration_ms == 0 {
                    return Err("Dynamic target_duration_ms must be greater than 0".to_string());
                }
                if dynamic.increase_step == 0 {
                    return Err("Dynamic increase_step must be greater than 0".to_string());
                }
                if !(dynamic.decrease_factor > 0.0 && dynamic.decrease_factor < 1.0) {
                    return Err("Dynamic decrease_factor must be between 0 and 1".to_string());
                }
            }
        }
        Ok(())
    }
}

impl Validate for BatchConfig {
    fn validate(&self) -> Result<(), String> {
        self.sizing.validate()?;

        if self.concurrency == 0 {
            return Err("Concurrency must be greater than 0".to_string());
        }
        if self.concurrency > MAX_CONCURRENCY {
            return Err(format!("Concurrency should not exceed {}", MAX_CONCURRENCY));
        }
        if self.max_in_flight_batches == 0 {
            return Err("max_in_flight_batches must be greater than 0".to_string());
        }
        if let Some(max_queue_len) = self.max_queue_len {
            if max_queue_len == 0 {
                return Err("max_queue_len must be greater than 0 when set".to_string());
            }
        }
        if self.flush_interval_ms == 0 {
            return Err("flush_interval_ms must be greater than 0".to_string());
        }
        if self.drain_timeout_secs == Some(0) {
            return Err("drain_timeout_secs must be greater than 0 when set".to_string());
        }

        Ok(())
    }
}

impl Validate for RetryConfig {
    fn validate(&self) -> Result<(), String> {
        if self.backoff_multiplier < 1.0 || !self.backoff_multiplier.is_finite() {
            return Err("Backoff multiplier must be a finite value >= 1.0".to_string());
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err("Base delay cannot exceed max delay".to_string());
        }
        Ok(())
    }
}

impl Validate for RateLimitConfig {
    fn validate(&self) -> Result<(), String> {
        if self.requests_per_minute == Some(0) {
            return Err("requests_per_minute must be greater than 0 when set".to_string());
        }
        if self.poll_interval_ms == 0 {
            return Err("poll_interval_ms must be greater than 0".to_string());
        }
        Ok(())
    }
}

impl Validate for LoggingConfig {
    fn validate(&self) -> Result<(), String> {
        if self.level.trim().is_empty() {
            return Err("Log level cannot be empty".to_string());
        }
        Ok(())
    }
}
