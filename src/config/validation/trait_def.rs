//! Validation trait definition

/// Validation trait for configuration structures
pub trait Validate {
    /// Check internal consistency, returning a human readable reason on failure
    fn validate(&self) -> Result<(), String>;
}
