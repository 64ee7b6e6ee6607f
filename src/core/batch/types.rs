//! Batch engine types and data structures

use crate::utils::error::{ErrorClass, classify};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Client-assigned correlation id, unique per client across sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub u64);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Item lanes; objects and references are batched independently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Object,
    Reference,
}

impl ItemKind {
    pub const ALL: [ItemKind; 2] = [ItemKind::Object, ItemKind::Reference];
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKind::Object => f.write_str("object"),
            ItemKind::Reference => f.write_str("reference"),
        }
    }
}

/// Object creation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectItem {
    /// Target collection
    pub collection: String,
    /// Object id, generated on enqueue when absent
    #[serde(default)]
    pub uuid: Option<Uuid>,
    /// Property map
    #[serde(default)]
    pub properties: serde_json::Value,
    /// Caller-supplied vector
    #[serde(default)]
    pub vector: Option<Vec<f32>>,
    /// Tenant for multi-tenant collections
    #[serde(default)]
    pub tenant: Option<String>,
}

impl ObjectItem {
    /// Create a new object for `collection`
    pub fn new(collection: impl Into<String>, properties: serde_json::Value) -> Self {
        Self {
            collection: collection.into(),
            uuid: None,
            properties,
            vector: None,
            tenant: None,
        }
    }

    pub fn with_uuid(mut self, uuid: Uuid) -> Self {
        self.uuid = Some(uuid);
        self
    }

    pub fn with_vector(mut self, vector: Vec<f32>) -> Self {
        self.vector = Some(vector);
        self
    }

    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }
}

/// Reference creation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceItem {
    pub from_collection: String,
    pub from_uuid: Uuid,
    pub from_property: String,
    #[serde(default)]
    pub to_collection: Option<String>,
    pub to_uuid: Uuid,
    #[serde(default)]
    pub tenant: Option<String>,
}

impl ReferenceItem {
    /// Create a reference from `from_collection/from_uuid.from_property` to `to_uuid`
    pub fn new(
        from_collection: impl Into<String>,
        from_uuid: Uuid,
        from_property: impl Into<String>,
        to_uuid: Uuid,
    ) -> Self {
        Self {
            from_collection: from_collection.into(),
            from_uuid,
            from_property: from_property.into(),
            to_collection: None,
            to_uuid,
            tenant: None,
        }
    }

    pub fn with_to_collection(mut self, collection: impl Into<String>) -> Self {
        self.to_collection = Some(collection.into());
        self
    }

    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }
}

/// One pending write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Item {
    Object(ObjectItem),
    Reference(ReferenceItem),
}

impl Item {
    pub fn kind(&self) -> ItemKind {
        match self {
            Item::Object(_) => ItemKind::Object,
            Item::Reference(_) => ItemKind::Reference,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectItem> {
        match self {
            Item::Object(object) => Some(object),
            Item::Reference(_) => None,
        }
    }

    pub fn as_reference(&self) -> Option<&ReferenceItem> {
        match self {
            Item::Reference(reference) => Some(reference),
            Item::Object(_) => None,
        }
    }

    /// Collection and tenant the write lands in
    pub fn target(&self) -> (&str, Option<&str>) {
        match self {
            Item::Object(o) => (&o.collection, o.tenant.as_deref()),
            Item::Reference(r) => (&r.from_collection, r.tenant.as_deref()),
        }
    }
}

/// An item travelling through the pipeline, tagged with its attempt generation
#[derive(Debug, Clone)]
pub struct Envelope {
    pub id: ItemId,
    /// Bumped on every resubmission; outcomes from older generations are stale
    pub generation: u32,
    pub item: Arc<Item>,
}

impl Envelope {
    pub fn new(id: ItemId, item: Item) -> Self {
        Self {
            id,
            generation: 0,
            item: Arc::new(item),
        }
    }

    pub fn kind(&self) -> ItemKind {
        self.item.kind()
    }
}

/// Homogeneous, size-bounded group of items sent in one request
#[derive(Debug, Clone)]
pub struct Batch {
    pub kind: ItemKind,
    pub entries: Vec<Envelope>,
}

impl Batch {
    pub fn new(kind: ItemKind, entries: Vec<Envelope>) -> Self {
        debug_assert!(entries.iter().all(|e| e.kind() == kind));
        Self { kind, entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Object payloads, in batch order
    pub fn objects(&self) -> Vec<ObjectItem> {
        self.entries
            .iter()
            .filter_map(|e| e.item.as_object().cloned())
            .collect()
    }

    /// Reference payloads, in batch order
    pub fn references(&self) -> Vec<ReferenceItem> {
        self.entries
            .iter()
            .filter_map(|e| e.item.as_reference().cloned())
            .collect()
    }
}

/// Store-reported error for a single item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemError {
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
}

impl ItemError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Failure class used by the retry decision
    pub fn class(&self) -> ErrorClass {
        classify(self.code.as_deref(), &self.message)
    }
}

impl fmt::Display for ItemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "[{}] {}", code, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Per-item result of one dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Success,
    Error(ItemError),
    /// The store may or may not have applied the write
    Ambiguous(String),
}

impl DispatchOutcome {
    pub fn error(message: impl Into<String>) -> Self {
        DispatchOutcome::Error(ItemError::new(message))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, DispatchOutcome::Success)
    }
}

/// Terminal status of an item
#[derive(Debug, Clone, PartialEq)]
pub enum OutcomeStatus {
    Succeeded,
    Failed {
        error: ItemError,
        class: ErrorClass,
        /// Resubmissions made before giving up
        retries: u32,
    },
    /// Discarded by an explicit abort
    Aborted,
}

/// Terminal record of one item
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub id: ItemId,
    pub item: Arc<Item>,
    pub status: OutcomeStatus,
    pub recorded_at: DateTime<Utc>,
}

impl BatchOutcome {
    pub fn new(id: ItemId, item: Arc<Item>, status: OutcomeStatus) -> Self {
        Self {
            id,
            item,
            status,
            recorded_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, OutcomeStatus::Succeeded)
    }
}

/// Caller-visible terminal failure
#[derive(Debug, Clone, PartialEq)]
pub struct FailedItem<T> {
    pub id: ItemId,
    pub item: T,
    pub error: ItemError,
    pub class: ErrorClass,
    pub retries: u32,
}

pub type FailedObject = FailedItem<ObjectItem>;
pub type FailedReference = FailedItem<ReferenceItem>;

/// Summary of a batch session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    /// Items accepted by the session
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub aborted: u64,
    /// Resubmissions, across item errors and reconciliation
    pub retried: u64,
    /// Requests sent to the store
    pub batches_sent: u64,
    /// Items carried by requests the store answered
    pub items_processed: u64,
}
