//! Remote store connection configuration

use super::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Remote store connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the store
    #[serde(default = "default_url")]
    pub url: String,
    /// API key sent as a bearer token
    #[serde(default)]
    pub api_key: Option<String>,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Replication consistency requested on writes
    #[serde(default)]
    pub consistency_level: Option<ConsistencyLevel>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            api_key: None,
            timeout: default_timeout(),
            consistency_level: None,
        }
    }
}

impl ClientConfig {
    /// Request timeout as a duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

/// Write consistency level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsistencyLevel {
    One,
    Quorum,
    All,
}

impl ConsistencyLevel {
    /// Query parameter value
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsistencyLevel::One => "ONE",
            ConsistencyLevel::Quorum => "QUORUM",
            ConsistencyLevel::All => "ALL",
        }
    }
}

impl std::str::FromStr for ConsistencyLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ONE" => Ok(ConsistencyLevel::One),
            "QUORUM" => Ok(ConsistencyLevel::Quorum),
            "ALL" => Ok(ConsistencyLevel::All),
            _ => Err(format!("Invalid consistency level: {}", s)),
        }
    }
}
