//! Transport boundary between the batch engine and the remote store

use crate::core::batch::{DispatchOutcome, ObjectItem, ReferenceItem};
use crate::utils::error::Result;
use async_trait::async_trait;
use uuid::Uuid;

use super::types::{ShardStatus, StoredObject};

/// Remote store operations used by the batch engine.
///
/// `send_objects` and `send_references` return exactly one outcome per input
/// item, in input order. Implementations receiving id-keyed responses must
/// realign them before returning. An `Err` applies to the whole request; when
/// [`BatchError::is_ambiguous`](crate::utils::error::BatchError::is_ambiguous)
/// holds, the store may or may not have applied the writes.
#[async_trait]
pub trait BatchTransport: Send + Sync + 'static {
    /// Create a group of objects
    async fn send_objects(&self, objects: &[ObjectItem]) -> Result<Vec<DispatchOutcome>>;

    /// Create a group of references
    async fn send_references(&self, references: &[ReferenceItem])
    -> Result<Vec<DispatchOutcome>>;

    /// Whether the object exists
    async fn object_exists(&self, collection: &str, id: Uuid, tenant: Option<&str>)
    -> Result<bool>;

    /// Fetch the object as currently stored
    async fn get_object(
        &self,
        collection: &str,
        id: Uuid,
        tenant: Option<&str>,
    ) -> Result<Option<StoredObject>>;

    /// Shard status for a collection, optionally scoped to one tenant
    async fn shards(&self, collection: &str, tenant: Option<&str>) -> Result<Vec<ShardStatus>>;

    /// Readiness check
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
