//! Logging utilities
//!
//! Installs the global `tracing` subscriber used by the CLI and by callers
//! that want the engine's diagnostics without wiring their own.

use crate::config::LoggingConfig;
use crate::utils::error::{BatchError, Result};
use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber.
///
/// `RUST_LOG` overrides the configured level when set. Installing twice is not
/// an error, so tests and embedding applications can call this freely.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| BatchError::config(format!("Invalid log filter '{}': {}", config.level, e)))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target)
        .with_thread_ids(false);

    // Already installed
    let _ = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    Ok(())
}
