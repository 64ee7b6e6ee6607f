//! Error classification for item-level and request-level failures

use serde::{Deserialize, Serialize};
use std::fmt;

/// Failure taxonomy driving the retry decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Malformed payload, unknown property, bad identifier. Never retried.
    Validation,
    /// Identity already exists with different content. Never retried.
    Conflict,
    /// Server-side hiccup, 5xx or throttling. Retried.
    Transient,
    /// Connection reset or timeout. Reconciled, then retried.
    Network,
    /// Retry budget used up.
    Exhausted,
}

impl ErrorClass {
    /// Whether a failure of this class ends the item's lifecycle immediately
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ErrorClass::Validation | ErrorClass::Conflict | ErrorClass::Exhausted
        )
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorClass::Validation => "validation",
            ErrorClass::Conflict => "conflict",
            ErrorClass::Transient => "transient",
            ErrorClass::Network => "network",
            ErrorClass::Exhausted => "exhausted",
        };
        f.write_str(name)
    }
}

const VALIDATION_MARKERS: &[&str] = &[
    "no such prop",
    "unknown property",
    "invalid",
    "malformed",
    "could not parse",
    "cannot parse",
    "not a valid uuid",
    "validation",
    "wrong type",
    "data type",
    "unprocessable",
    "does not exist in class",
    "class not found",
    "collection not found",
];

const CONFLICT_MARKERS: &[&str] = &["already exists", "conflict", "duplicate id"];

/// Classify a store-reported error from its optional code and message.
///
/// Codes win over message text. Numeric codes follow HTTP semantics; textual
/// codes follow the gRPC status names the streaming transport reports.
pub fn classify(code: Option<&str>, message: &str) -> ErrorClass {
    if let Some(code) = code {
        if let Ok(status) = code.trim().parse::<u16>() {
            match status {
                409 => return ErrorClass::Conflict,
                400 | 401 | 403 | 404 | 405 | 413 | 422 => return ErrorClass::Validation,
                408 | 425 | 429 | 500..=599 => return ErrorClass::Transient,
                _ => {}
            }
        } else {
            match code.trim().to_ascii_lowercase().as_str() {
                "invalid_argument" | "validation" | "failed_precondition" | "not_found"
                | "unauthenticated" | "permission_denied" => return ErrorClass::Validation,
                "already_exists" | "conflict" => return ErrorClass::Conflict,
                "unavailable" | "resource_exhausted" | "internal" | "aborted" => {
                    return ErrorClass::Transient;
                }
                "deadline_exceeded" => return ErrorClass::Network,
                _ => {}
            }
        }
    }

    let message = message.to_lowercase();
    if CONFLICT_MARKERS.iter().any(|m| message.contains(m)) {
        ErrorClass::Conflict
    } else if VALIDATION_MARKERS.iter().any(|m| message.contains(m)) {
        ErrorClass::Validation
    } else {
        ErrorClass::Transient
    }
}
