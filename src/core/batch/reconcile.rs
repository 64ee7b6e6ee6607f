//! Reconciliation of ambiguous dispatch failures
//!
//! After a timeout or dropped connection the store may or may not have
//! applied a write. A [`Reconciler`] looks at what the store currently holds
//! and decides whether the item still needs to be sent.

use super::types::ObjectItem;
use crate::storage::vector::{BatchTransport, StoredObject};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

/// What the store holds for an object whose write outcome is unknown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Stored with the content that was sent
    Stored,
    /// Not stored
    Missing,
    /// Stored, but with different content
    Stale,
    /// The store could not be asked
    Unknown,
}

impl Verdict {
    pub fn is_stored(self) -> bool {
        self == Verdict::Stored
    }
}

/// Strategy deciding whether an ambiguously sent object is already stored
#[async_trait]
pub trait Reconciler: Send + Sync + 'static {
    async fn reconcile(&self, transport: &dyn BatchTransport, object: &ObjectItem) -> Verdict;
}

/// Treats any existing object with the same id as stored
#[derive(Debug, Clone, Copy, Default)]
pub struct ExistenceOnly;

#[async_trait]
impl Reconciler for ExistenceOnly {
    async fn reconcile(&self, transport: &dyn BatchTransport, object: &ObjectItem) -> Verdict {
        let Some(id) = object.uuid else {
            return Verdict::Unknown;
        };

        match transport
            .object_exists(&object.collection, id, object.tenant.as_deref())
            .await
        {
            Ok(true) => Verdict::Stored,
            Ok(false) => Verdict::Missing,
            Err(e) => {
                debug!("Existence check for {} failed: {}", id, e);
                Verdict::Unknown
            }
        }
    }
}

/// Requires every sent property, and the vector when both sides carry one,
/// to match what the store returns. Properties the store added are ignored.
#[derive(Debug, Clone, Copy)]
pub struct ContentMatch {
    /// Relative tolerance for vector components and floating point properties
    pub tolerance: f64,
}

impl Default for ContentMatch {
    fn default() -> Self {
        Self { tolerance: 1e-5 }
    }
}

impl ContentMatch {
    /// Whether `stored` carries the content of `sent`
    pub fn matches(&self, sent: &ObjectItem, stored: &StoredObject) -> bool {
        if !self.value_matches(&sent.properties, &stored.properties) {
            return false;
        }

        match (&sent.vector, &stored.vector) {
            (Some(sent), Some(stored)) => {
                sent.len() == stored.len()
                    && sent
                        .iter()
                        .zip(stored)
                        .all(|(a, b)| self.close(f64::from(*a), f64::from(*b)))
            }
            _ => true,
        }
    }

    fn value_matches(&self, sent: &Value, stored: &Value) -> bool {
        match (sent, stored) {
            (Value::Object(sent), Value::Object(stored)) => sent.iter().all(|(key, value)| {
                stored
                    .get(key)
                    .is_some_and(|stored| self.value_matches(value, stored))
            }),
            (Value::Object(sent), Value::Null) => sent.is_empty(),
            (Value::Array(sent), Value::Array(stored)) => {
                sent.len() == stored.len()
                    && sent
                        .iter()
                        .zip(stored)
                        .all(|(a, b)| self.value_matches(a, b))
            }
            (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
                (Some(a), Some(b)) => self.close(a, b),
                _ => a == b,
            },
            (Value::Null, _) => true,
            (a, b) => a == b,
        }
    }

    fn close(&self, a: f64, b: f64) -> bool {
        (a - b).abs() <= self.tolerance * a.abs().max(b.abs()).max(1.0)
    }
}

#[async_trait]
impl Reconciler for ContentMatch {
    async fn reconcile(&self, transport: &dyn BatchTransport, object: &ObjectItem) -> Verdict {
        let Some(id) = object.uuid else {
            return Verdict::Unknown;
        };
        let tenant = object.tenant.as_deref();

        match transport.object_exists(&object.collection, id, tenant).await {
            Ok(true) => {}
            Ok(false) => return Verdict::Missing,
            Err(e) => {
                debug!("Existence check for {} failed: {}", id, e);
                return Verdict::Unknown;
            }
        }

        match transport.get_object(&object.collection, id, tenant).await {
            Ok(Some(stored)) if self.matches(object, &stored) => Verdict::Stored,
            Ok(Some(_)) => Verdict::Stale,
            Ok(None) => Verdict::Missing,
            Err(e) => {
                debug!("Fetch of {} failed: {}", id, e);
                Verdict::Unknown
            }
        }
    }
}
