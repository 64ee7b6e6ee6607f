//! Type definitions for the remote vector store

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Object as currently held by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredObject {
    /// Object id
    pub id: Uuid,
    /// Collection the object lives in
    #[serde(rename = "class", alias = "collection", default)]
    pub collection: String,
    /// Stored properties
    #[serde(default)]
    pub properties: serde_json::Value,
    /// Stored vector, when requested and present
    #[serde(default)]
    pub vector: Option<Vec<f32>>,
    /// Owning tenant
    #[serde(default)]
    pub tenant: Option<String>,
}

/// Status of a single shard as reported by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardStatus {
    /// Shard name
    pub name: String,
    /// Shard status, e.g. `READY` or `READONLY`
    #[serde(default)]
    pub status: String,
    /// Objects waiting for async vector indexing
    #[serde(rename = "vectorQueueSize", default)]
    pub vector_queue_size: u64,
}

impl ShardStatus {
    pub fn new(name: impl Into<String>, vector_queue_size: u64) -> Self {
        Self {
            name: name.into(),
            status: "READY".to_string(),
            vector_queue_size,
        }
    }

    /// Whether the shard has no indexing backlog
    pub fn is_drained(&self) -> bool {
        self.vector_queue_size == 0
    }
}

/// A `(collection, tenant)` pair whose shards are polled for drain
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DrainTarget {
    pub collection: String,
    #[serde(default)]
    pub tenant: Option<String>,
}

impl DrainTarget {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            tenant: None,
        }
    }

    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }
}
