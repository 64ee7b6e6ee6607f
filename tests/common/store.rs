//! In-memory vector store for driving the engine in tests
//!
//! Every call is counted. Per-item failures are decided by an item policy,
//! request-level faults by a call policy. Stored objects feed reconciliation
//! lookups; with indexing enabled each stored object also adds to a backlog
//! that drains a fixed amount per shard poll.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use uuid::Uuid;
use vecbatch::core::batch::DispatchOutcome;
use vecbatch::{
    BatchError, BatchTransport, ItemError, ObjectItem, ReferenceItem, Result, ShardStatus,
    StoredObject,
};

/// What the store sees when deciding one object's fate
pub struct ItemCtx<'a> {
    /// 1-based request number across all batch calls
    pub call: usize,
    /// Position of the object in its batch
    pub position: usize,
    /// 1-based submission count of this object
    pub attempt: usize,
    pub object: &'a ObjectItem,
}

/// Request-level fault injected for one call
#[derive(Debug, Clone, PartialEq)]
pub enum CallFault {
    None,
    /// Store the objects at these positions, then time out
    Timeout { store_positions: Vec<usize> },
    /// Hang for the given time, then answer normally
    Hang(Duration),
    /// Connection refused
    Unreachable,
}

type ItemPolicy = Box<dyn Fn(&ItemCtx<'_>) -> Option<ItemError> + Send + Sync>;
type CallPolicy = Box<dyn Fn(usize) -> CallFault + Send + Sync>;

#[derive(Default)]
struct StoreState {
    calls: usize,
    submissions: HashMap<Uuid, usize>,
    stored: HashMap<Uuid, StoredObject>,
    references: usize,
    batch_sizes: Vec<usize>,
    sending: HashSet<Uuid>,
    overlaps: usize,
    backlog: u64,
    shard_polls: usize,
}

pub struct MockStore {
    state: Mutex<StoreState>,
    item_policy: ItemPolicy,
    call_policy: CallPolicy,
    latency: Duration,
    drain_per_poll: Option<u64>,
    lookups_down: AtomicBool,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStore {
    /// A store that accepts everything instantly
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            item_policy: Box::new(|_| None),
            call_policy: Box::new(|_| CallFault::None),
            latency: Duration::ZERO,
            drain_per_poll: None,
            lookups_down: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_item_policy<F>(mut self, policy: F) -> Self
    where
        F: Fn(&ItemCtx<'_>) -> Option<ItemError> + Send + Sync + 'static,
    {
        self.item_policy = Box::new(policy);
        self
    }

    pub fn with_call_policy<F>(mut self, policy: F) -> Self
    where
        F: Fn(usize) -> CallFault + Send + Sync + 'static,
    {
        self.call_policy = Box::new(policy);
        self
    }

    /// Delay every batch call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Index asynchronously, draining `per_poll` objects per shard poll
    pub fn with_indexing(mut self, per_poll: u64) -> Self {
        self.drain_per_poll = Some(per_poll);
        self
    }

    /// Make existence and fetch lookups fail
    pub fn set_lookups_down(&self, down: bool) {
        self.lookups_down.store(down, Ordering::SeqCst);
    }

    /// Store `object` as if an earlier write had landed
    pub fn seed(&self, object: &ObjectItem) {
        let mut state = self.state.lock();
        put(&mut state, object);
    }

    pub fn set_backlog(&self, backlog: u64) {
        self.state.lock().backlog = backlog;
    }

    pub fn backlog(&self) -> u64 {
        self.state.lock().backlog
    }

    /// Batch calls received, objects and references together
    pub fn calls(&self) -> usize {
        self.state.lock().calls
    }

    /// Times `id` was sent
    pub fn submissions(&self, id: Uuid) -> usize {
        self.state.lock().submissions.get(&id).copied().unwrap_or(0)
    }

    /// Object sends across all calls
    pub fn total_submissions(&self) -> usize {
        self.state.lock().submissions.values().sum()
    }

    pub fn stored_count(&self) -> usize {
        self.state.lock().stored.len()
    }

    pub fn stored(&self, id: Uuid) -> Option<StoredObject> {
        self.state.lock().stored.get(&id).cloned()
    }

    pub fn references_stored(&self) -> usize {
        self.state.lock().references
    }

    /// Size of every batch call, in arrival order
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.state.lock().batch_sizes.clone()
    }

    /// Objects received while an earlier send of the same object was still open
    pub fn overlaps(&self) -> usize {
        self.state.lock().overlaps
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn shard_polls(&self) -> usize {
        self.state.lock().shard_polls
    }

    /// Count the call and the sends; the returned guard closes the call when dropped
    fn begin(&self, size: usize, ids: Vec<Uuid>) -> (OpenCall<'_>, Vec<usize>) {
        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(in_flight, Ordering::SeqCst);

        let mut state = self.state.lock();
        state.calls += 1;
        state.batch_sizes.push(size);
        let mut attempts = Vec::with_capacity(ids.len());
        for id in &ids {
            if !state.sending.insert(*id) {
                state.overlaps += 1;
            }
            let count = state.submissions.entry(*id).or_default();
            *count += 1;
            attempts.push(*count);
        }

        let call = OpenCall {
            store: self,
            number: state.calls,
            ids,
        };
        (call, attempts)
    }

    async fn handle_objects(
        &self,
        call: usize,
        attempts: &[usize],
        objects: &[ObjectItem],
    ) -> Result<Vec<DispatchOutcome>> {
        let fault = (self.call_policy)(call);
        if let CallFault::Hang(delay) = &fault {
            tokio::time::sleep(*delay).await;
        }

        let mut state = self.state.lock();
        let mut outcomes = Vec::with_capacity(objects.len());
        for (position, object) in objects.iter().enumerate() {
            match &fault {
                CallFault::Unreachable => {}
                CallFault::Timeout { store_positions } => {
                    if store_positions.contains(&position) {
                        self.store(&mut state, object);
                    }
                }
                CallFault::None | CallFault::Hang(_) => {
                    let ctx = ItemCtx {
                        call,
                        position,
                        attempt: attempts.get(position).copied().unwrap_or(1),
                        object,
                    };
                    match (self.item_policy)(&ctx) {
                        Some(error) => outcomes.push(DispatchOutcome::Error(error)),
                        None => {
                            self.store(&mut state, object);
                            outcomes.push(DispatchOutcome::Success);
                        }
                    }
                }
            }
        }

        match fault {
            CallFault::Unreachable => Err(BatchError::network("connection refused")),
            CallFault::Timeout { .. } => Err(BatchError::timeout("read timed out")),
            CallFault::None | CallFault::Hang(_) => Ok(outcomes),
        }
    }

    fn store(&self, state: &mut StoreState, object: &ObjectItem) {
        put(state, object);
        if self.drain_per_poll.is_some() {
            state.backlog += 1;
        }
    }
}

fn put(state: &mut StoreState, object: &ObjectItem) {
    let id = object.uuid.unwrap_or_else(Uuid::new_v4);
    state.stored.insert(
        id,
        StoredObject {
            id,
            collection: object.collection.clone(),
            properties: object.properties.clone(),
            vector: object.vector.clone(),
            tenant: object.tenant.clone(),
        },
    );
}

#[async_trait]
impl BatchTransport for MockStore {
    async fn send_objects(&self, objects: &[ObjectItem]) -> Result<Vec<DispatchOutcome>> {
        let ids: Vec<Uuid> = objects.iter().filter_map(|o| o.uuid).collect();
        let (call, attempts) = self.begin(objects.len(), ids);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        self.handle_objects(call.number, &attempts, objects).await
    }

    async fn send_references(&self, references: &[ReferenceItem]) -> Result<Vec<DispatchOutcome>> {
        let (call, _) = self.begin(references.len(), Vec::new());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match (self.call_policy)(call.number) {
            CallFault::Unreachable => Err(BatchError::network("connection refused")),
            CallFault::Timeout { .. } => Err(BatchError::timeout("read timed out")),
            CallFault::None | CallFault::Hang(_) => {
                self.state.lock().references += references.len();
                Ok(vec![DispatchOutcome::Success; references.len()])
            }
        }
    }

    async fn object_exists(&self, _collection: &str, id: Uuid, _tenant: Option<&str>) -> Result<bool> {
        if self.lookups_down.load(Ordering::SeqCst) {
            return Err(BatchError::network("connection refused"));
        }
        Ok(self.state.lock().stored.contains_key(&id))
    }

    async fn get_object(
        &self,
        _collection: &str,
        id: Uuid,
        _tenant: Option<&str>,
    ) -> Result<Option<StoredObject>> {
        if self.lookups_down.load(Ordering::SeqCst) {
            return Err(BatchError::network("connection refused"));
        }
        Ok(self.state.lock().stored.get(&id).cloned())
    }

    async fn shards(&self, collection: &str, _tenant: Option<&str>) -> Result<Vec<ShardStatus>> {
        let mut state = self.state.lock();
        state.shard_polls += 1;
        let reported = state.backlog;
        if let Some(per_poll) = self.drain_per_poll {
            state.backlog = state.backlog.saturating_sub(per_poll);
        }
        Ok(vec![ShardStatus::new(format!("{}-shard-0", collection), reported)])
    }
}

/// A batch call in progress; closing it is tied to drop so that calls
/// cancelled by a request timeout are closed too
struct OpenCall<'a> {
    store: &'a MockStore,
    number: usize,
    ids: Vec<Uuid>,
}

impl Drop for OpenCall<'_> {
    fn drop(&mut self) {
        self.store.in_flight.fetch_sub(1, Ordering::SeqCst);
        let mut state = self.store.state.lock();
        for id in &self.ids {
            state.sending.remove(id);
        }
    }
}
