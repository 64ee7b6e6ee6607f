//! Rate and backpressure governor

use super::types::Item;
use crate::config::RateLimitConfig;
use crate::storage::vector::{BatchTransport, DrainTarget};
use crate::utils::error::{BatchError, Result};
use crate::utils::net::SlidingWindow;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Collections and tenants written to, shared across sessions of a client
pub type TargetSet = Arc<Mutex<BTreeSet<DrainTarget>>>;

/// Backlog poller shared by every session attached to a governor
#[derive(Debug, Default)]
struct Poller {
    sessions: usize,
    handle: Option<JoinHandle<()>>,
}

/// Gates batch dispatch on a requests-per-minute budget and on the store's
/// reported indexing backlog
///
/// One governor serves all sessions of a client, so the budget, the
/// saturation flag and the backlog poller are shared between them.
#[derive(Debug)]
pub struct RateGovernor {
    window: Option<SlidingWindow>,
    max_queue_depth: Option<u64>,
    poll_interval: Duration,
    saturated: AtomicBool,
    cleared: Notify,
    targets: TargetSet,
    poller: Mutex<Poller>,
}

impl RateGovernor {
    pub fn new(config: &RateLimitConfig, targets: TargetSet) -> Self {
        Self {
            window: config.requests_per_minute.map(SlidingWindow::per_minute),
            max_queue_depth: config.max_queue_depth,
            poll_interval: config.poll_interval(),
            saturated: AtomicBool::new(false),
            cleared: Notify::new(),
            targets,
            poller: Mutex::new(Poller::default()),
        }
    }

    /// Remember where an item is written
    pub fn observe(&self, item: &Item) {
        let (collection, tenant) = item.target();
        let target = DrainTarget {
            collection: collection.to_string(),
            tenant: tenant.map(str::to_string),
        };

        self.targets.lock().insert(target);
    }

    /// Every target observed so far
    pub fn targets(&self) -> Vec<DrainTarget> {
        self.targets.lock().iter().cloned().collect()
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn is_saturated(&self) -> bool {
        self.saturated.load(Ordering::SeqCst)
    }

    pub fn set_saturated(&self, saturated: bool) {
        let was = self.saturated.swap(saturated, Ordering::SeqCst);
        if was && !saturated {
            info!("Store backlog cleared, resuming dispatch");
            self.cleared.notify_waiters();
        } else if !was && saturated {
            warn!("Store backlog above threshold, pausing dispatch");
        }
    }

    /// Wait until another batch may be dispatched
    pub async fn acquire_slot(&self) {
        loop {
            let notified = self.cleared.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if !self.is_saturated() {
                break;
            }
            notified.await;
        }

        if let Some(window) = &self.window {
            window.acquire().await;
        }
    }

    /// Poll shard backlog once and update saturation; returns the total backlog
    pub async fn poll_once(&self, transport: &dyn BatchTransport) -> Result<u64> {
        let mut depth = 0;
        for target in self.targets() {
            let shards = transport
                .shards(&target.collection, target.tenant.as_deref())
                .await?;
            depth += shards.iter().map(|s| s.vector_queue_size).sum::<u64>();
        }

        if let Some(max_depth) = self.max_queue_depth {
            self.set_saturated(depth > max_depth);
        }
        Ok(depth)
    }

    /// Register a session with the backlog poller, starting it for the first
    /// one. Returns false when no depth threshold is set and nothing polls.
    pub fn attach_poller(self: &Arc<Self>, transport: Arc<dyn BatchTransport>) -> bool {
        if self.max_queue_depth.is_none() {
            return false;
        }

        let mut poller = self.poller.lock();
        poller.sessions += 1;
        if poller.handle.is_none() {
            debug!("Starting backlog poller every {:?}", self.poll_interval);
            poller.handle = Some(self.spawn_poller(transport));
        }
        true
    }

    /// Unregister a session; the last one out stops the poller
    pub fn detach_poller(&self) {
        let mut poller = self.poller.lock();
        poller.sessions = poller.sessions.saturating_sub(1);
        if poller.sessions == 0 {
            if let Some(handle) = poller.handle.take() {
                debug!("Stopping backlog poller");
                handle.abort();
            }
        }
    }

    /// Whether a backlog poller is currently running
    pub fn is_polling(&self) -> bool {
        self.poller.lock().handle.is_some()
    }

    fn spawn_poller(self: &Arc<Self>, transport: Arc<dyn BatchTransport>) -> JoinHandle<()> {
        let governor = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(governor.poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match governor.poll_once(&*transport).await {
                    Ok(depth) => debug!("Store vector backlog: {}", depth),
                    Err(e) => {
                        warn!("Shard poll failed, not holding dispatch: {}", e);
                        governor.set_saturated(false);
                    }
                }
            }
        })
    }
}

/// Block until every shard of every target reports an empty vector queue
pub async fn wait_until_drained(
    transport: &dyn BatchTransport,
    targets: &[DrainTarget],
    interval: Duration,
    timeout: Duration,
) -> Result<()> {
    let deadline = Instant::now() + timeout;

    loop {
        let mut backlog = 0;
        for target in targets {
            match transport
                .shards(&target.collection, target.tenant.as_deref())
                .await
            {
                Ok(shards) => backlog += shards.iter().map(|s| s.vector_queue_size).sum::<u64>(),
                Err(e) => {
                    warn!("Shard status for {} unavailable: {}", target.collection, e);
                    backlog += 1;
                }
            }
        }

        if backlog == 0 {
            info!("Vector indexing drained for {} targets", targets.len());
            return Ok(());
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(BatchError::timeout(format!(
                "Vector indexing not drained after {:?}, {} objects pending",
                timeout, backlog
            )));
        }

        debug!("Waiting for {} objects to be indexed", backlog);
        tokio::time::sleep(interval.min(deadline - now)).await;
    }
}
