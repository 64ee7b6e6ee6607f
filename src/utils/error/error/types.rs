//! Error types for the batch engine

use super::classify::ErrorClass;
use thiserror::Error;

/// Result type alias for the batch engine
pub type Result<T> = std::result::Result<T, BatchError>;

/// Main error type for the batch engine
#[derive(Error, Debug)]
pub enum BatchError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP client errors
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Network errors (connection reset, refused, stream torn down)
    #[error("Network error: {0}")]
    Network(String),

    /// Timeout errors
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// Non-success status returned by the remote store for a whole request
    #[error("Remote store error ({status}): {message}")]
    Remote { status: u16, message: String },

    /// Malformed or unexpected response body
    #[error("Parsing error: {0}")]
    Parsing(String),

    /// Validation errors raised client-side
    #[error("Validation error: {0}")]
    Validation(String),

    /// The session no longer accepts work
    #[error("Session closed: {0}")]
    SessionClosed(String),

    /// A single-shot write ended in terminal failure
    #[error("Item {id} failed ({class}): {message}")]
    ItemFailed {
        id: u64,
        class: ErrorClass,
        message: String,
    },

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BatchError {
    /// Whether the error leaves the outcome of an already sent request unknown.
    ///
    /// Connection resets, read timeouts and undecodable responses all fall in
    /// this bucket: the store may or may not have applied the writes.
    pub fn is_ambiguous(&self) -> bool {
        match self {
            BatchError::Network(_)
            | BatchError::Timeout(_)
            | BatchError::Parsing(_)
            | BatchError::Serialization(_) => true,
            BatchError::HttpClient(e) => {
                e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() || e.is_decode()
            }
            BatchError::Io(_) => true,
            _ => false,
        }
    }

    /// Classify an error that applies to every item of a request
    pub fn class(&self) -> ErrorClass {
        match self {
            BatchError::Remote { status, message } => {
                super::classify::classify(Some(&status.to_string()), message)
            }
            BatchError::Validation(_) | BatchError::Config(_) => ErrorClass::Validation,
            e if e.is_ambiguous() => ErrorClass::Network,
            _ => ErrorClass::Transient,
        }
    }
}
