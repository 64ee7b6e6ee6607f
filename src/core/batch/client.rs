//! Caller-facing batch client

use super::governor::{RateGovernor, TargetSet, wait_until_drained};
use super::reconcile::{ContentMatch, Reconciler};
use super::results::{OutcomeCallback, ResultSink};
use super::session::{BatchSession, SessionContext};
use super::types::{BatchOutcome, BatchSummary, FailedObject, FailedReference, ItemId, ObjectItem};
use crate::config::{BatchConfig, Config, FailureMode, RateLimitConfig, RetryConfig};
use crate::storage::vector::{BatchTransport, DrainTarget, RestTransport};
use crate::utils::error::{BatchError, Result};
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Duration;
use tracing::{debug, info};

/// Entry point of the batch engine.
///
/// The client holds the transport, the configuration and the result sink
/// shared by all of its sessions. Failure lists and counters accumulate across
/// sessions until [`BatchClient::clear_failed`].
///
/// # Example
/// ```rust,ignore
/// use vecbatch::{BatchClient, Config, ObjectItem};
///
/// let client = BatchClient::from_config(Config::from_env()?)?;
/// let (_, summary) = client
///     .with_session(async |session| {
///         for doc in docs {
///             session.add_object(ObjectItem::new("Article", doc)).await?;
///         }
///         Ok(())
///     })
///     .await?;
/// println!("{} stored, {} failed", summary.succeeded, client.number_errors());
/// ```
pub struct BatchClient {
    transport: Arc<dyn BatchTransport>,
    reconciler: Arc<dyn Reconciler>,
    config: Config,
    sink: Arc<ResultSink>,
    governor: Arc<RateGovernor>,
    targets: TargetSet,
    ids: Arc<AtomicU64>,
}

impl std::fmt::Debug for BatchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchClient")
            .field("config", &self.config)
            .field("sink", &self.sink)
            .finish()
    }
}

impl BatchClient {
    /// Create a client over an arbitrary transport
    pub fn new(transport: Arc<dyn BatchTransport>, config: Config) -> Result<Self> {
        config.validate()?;

        let targets = TargetSet::default();
        let governor = Arc::new(RateGovernor::new(&config.rate_limit, targets.clone()));
        Ok(Self {
            transport,
            reconciler: Arc::new(ContentMatch::default()),
            config,
            sink: Arc::new(ResultSink::new()),
            governor,
            targets,
            ids: Arc::new(AtomicU64::new(1)),
        })
    }

    /// Create a client talking to the store over REST
    pub fn from_config(config: Config) -> Result<Self> {
        let transport = RestTransport::new(&config.client)?;
        Self::new(Arc::new(transport), config)
    }

    /// Use a different reconciliation strategy for ambiguous failures
    pub fn with_reconciler(mut self, reconciler: Arc<dyn Reconciler>) -> Self {
        self.reconciler = reconciler;
        self
    }

    /// Invoke `callback` for every terminal outcome
    pub fn on_outcome<F>(&self, callback: F)
    where
        F: Fn(&BatchOutcome) + Send + Sync + 'static,
    {
        let callback: OutcomeCallback = Arc::new(callback);
        self.sink.set_callback(callback);
    }

    /// Replace batching, retry and rate-limit settings for later sessions
    pub fn configure(
        &mut self,
        batch: BatchConfig,
        retry: RetryConfig,
        rate_limit: RateLimitConfig,
    ) -> Result<()> {
        let mut config = self.config.clone();
        config.batch = batch;
        config.retry = retry;
        config.rate_limit = rate_limit;
        config.validate()?;

        self.governor = Arc::new(RateGovernor::new(&config.rate_limit, self.targets.clone()));
        self.config = config;
        debug!("Batch client reconfigured");
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn transport(&self) -> &Arc<dyn BatchTransport> {
        &self.transport
    }

    fn context(&self, retry: RetryConfig) -> SessionContext {
        SessionContext {
            transport: self.transport.clone(),
            reconciler: self.reconciler.clone(),
            sink: self.sink.clone(),
            governor: self.governor.clone(),
            ids: self.ids.clone(),
            batch: self.config.batch.clone(),
            retry,
            request_timeout: self.config.client.request_timeout(),
        }
    }

    /// Open a session; close it to drain
    pub fn session(&self) -> BatchSession {
        BatchSession::start(self.context(self.config.retry.clone()))
    }

    /// Run `body` inside a session that is drained on the way out, even when
    /// `body` fails. The body's error takes precedence over a drain error.
    pub async fn with_session<T, F>(&self, body: F) -> Result<(T, BatchSummary)>
    where
        F: AsyncFnOnce(&BatchSession) -> Result<T>,
    {
        let session = self.session();
        let result = body(&session).await;
        let closed = session.close().await;

        match (result, closed) {
            (Ok(value), Ok(summary)) => Ok((value, summary)),
            (Err(e), _) | (Ok(_), Err(e)) => Err(e),
        }
    }

    /// Create one object through the full pipeline without automatic retry,
    /// failing if the object ends in terminal failure
    pub async fn create_object(&self, object: ObjectItem) -> Result<ItemId> {
        let retry = self.config.retry.clone().with_mode(FailureMode::ReportOnly);
        let session = BatchSession::start(self.context(retry));

        let id = match session.add_object(object).await {
            Ok(id) => id,
            Err(e) => {
                session.abort();
                return Err(e);
            }
        };
        let closed = session.close().await;

        if let Some((error, class)) = self.sink.failure_for(id) {
            return Err(BatchError::ItemFailed {
                id: id.0,
                class,
                message: error.to_string(),
            });
        }
        closed?;
        Ok(id)
    }

    /// Objects that ended in terminal failure
    pub fn failed_objects(&self) -> Vec<FailedObject> {
        self.sink.failed_objects()
    }

    /// References that ended in terminal failure
    pub fn failed_references(&self) -> Vec<FailedReference> {
        self.sink.failed_references()
    }

    pub fn clear_failed(&self) {
        self.sink.clear_failed();
    }

    /// Terminal failures so far
    pub fn number_errors(&self) -> u64 {
        self.sink.number_errors()
    }

    /// Keep terminal outcomes, payloads included, until [`Self::pop_results`]
    /// takes them. Off by default; turning it off drops anything buffered.
    pub fn retain_outcomes(&self, retain: bool) {
        self.sink.retain_outcomes(retain);
    }

    /// Take every outcome retained since the last call
    pub fn pop_results(&self) -> Vec<BatchOutcome> {
        self.sink.pop_all()
    }

    /// Lifetime totals across sessions
    pub fn summary(&self) -> BatchSummary {
        self.sink.summary()
    }

    /// Collections and tenants written to so far
    pub fn targets(&self) -> Vec<DrainTarget> {
        self.governor.targets()
    }

    /// Wait until the store has indexed everything written to `targets`
    /// (every target written to when `None`)
    pub async fn wait_for_vector_indexing(
        &self,
        targets: Option<Vec<DrainTarget>>,
        timeout: Duration,
    ) -> Result<()> {
        let targets = targets.unwrap_or_else(|| self.targets());
        info!("Waiting for vector indexing on {} targets", targets.len());
        wait_until_drained(
            &*self.transport,
            &targets,
            self.config.rate_limit.poll_interval(),
            timeout,
        )
        .await
    }

    /// Check that the store is ready
    pub async fn health_check(&self) -> Result<()> {
        self.transport.health_check().await
    }
}
