//! # vecbatch
//!
//! Concurrent batch ingestion engine for vector stores.
//!
//! Callers add object and reference writes to a session; the engine groups
//! them into bounded batches, sends them through a fixed worker pool, retries
//! what failed transiently, reconciles what timed out and records exactly one
//! terminal outcome per item.
//!
//! ## Features
//!
//! - **Fixed or adaptive batch sizing**: constant size, or additive-increase /
//!   multiplicative-decrease steered by request latency
//! - **Bounded concurrency**: N workers fed from a bounded channel
//! - **Retries with backoff**: one exponential backoff sleep per retry round
//! - **Reconciliation**: ambiguous timeouts resolved by asking the store
//! - **Backpressure**: requests-per-minute budget and store indexing backlog
//! - **REST and streaming transports**
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vecbatch::{BatchClient, Config, ObjectItem};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = BatchClient::from_config(Config::from_env()?)?;
//!
//!     let (_, summary) = client
//!         .with_session(async |session| {
//!             for i in 0..1000 {
//!                 session
//!                     .add_object(ObjectItem::new("Article", json!({ "title": format!("doc {}", i) })))
//!                     .await?;
//!             }
//!             Ok(())
//!         })
//!         .await?;
//!
//!     println!("{} stored, {} failed", summary.succeeded, client.number_errors());
//!     Ok(())
//! }
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_inception)]

pub mod config;
pub mod core;
pub mod storage;
pub mod utils;

// Re-export main types
pub use config::Config;
pub use utils::error::{BatchError, ErrorClass, Result};

// Export the batch engine
pub use core::batch::{
    BatchClient, BatchOutcome, BatchSession, BatchSummary, ContentMatch, ExistenceOnly,
    FailedObject, FailedReference, Item, ItemError, ItemId, ObjectItem, OutcomeStatus,
    Reconciler, ReferenceItem, Verdict,
};

// Export transports
pub use storage::vector::{
    BatchTransport, DrainTarget, RestTransport, ShardStatus, StoredObject, StreamTransport,
};

// Version information
/// Current version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Name of the crate
pub const NAME: &str = env!("CARGO_PKG_NAME");
