//! Remote vector store access
//!
//! This module provides the transport boundary used by the batch engine and
//! its REST and streaming implementations.

mod backend;
mod rest;
mod stream;
mod types;
pub mod wire;

// Re-export public types and traits
pub use backend::BatchTransport;
pub use rest::RestTransport;
pub use stream::{
    ClientMessage, ServerMessage, StreamConnection, StreamConnector, StreamItem, StreamPeer,
    StreamTransport,
};
pub use types::{DrainTarget, ShardStatus, StoredObject};
