//! Streaming transport
//!
//! Writes travel over a bidirectional message stream. The client sends its
//! items followed by `Stop`; the server answers with `Ack` and `Error`
//! messages keyed by item id and finally `Stop`, which the client must answer
//! with `StopAck` before the stream is torn down. Items the server never
//! answered for are reported as ambiguous.

use crate::core::batch::{DispatchOutcome, ItemError, ObjectItem, ReferenceItem};
use crate::utils::error::{BatchError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::backend::BatchTransport;
use super::types::{ShardStatus, StoredObject};

/// Item sent over the stream with the id the server acknowledges it by
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamItem<T> {
    pub id: String,
    pub item: T,
}

/// Client to server messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Objects { items: Vec<StreamItem<ObjectItem>> },
    References { items: Vec<StreamItem<ReferenceItem>> },
    /// No more items follow
    Stop,
    /// Answer to a server `Stop`
    StopAck,
}

/// Server to client messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Ack {
        ids: Vec<String>,
    },
    Error {
        id: String,
        message: String,
        #[serde(default)]
        code: Option<String>,
    },
    /// End of stream; must be answered with `StopAck`
    Stop,
}

/// Client half of an open stream
#[derive(Debug)]
pub struct StreamConnection {
    pub tx: mpsc::Sender<ClientMessage>,
    pub rx: mpsc::Receiver<ServerMessage>,
}

/// Server half of an in-process stream
#[derive(Debug)]
pub struct StreamPeer {
    pub rx: mpsc::Receiver<ClientMessage>,
    pub tx: mpsc::Sender<ServerMessage>,
}

impl StreamConnection {
    /// Connected in-process pair
    pub fn pair(buffer: usize) -> (StreamConnection, StreamPeer) {
        let (client_tx, server_rx) = mpsc::channel(buffer.max(1));
        let (server_tx, client_rx) = mpsc::channel(buffer.max(1));
        (
            StreamConnection {
                tx: client_tx,
                rx: client_rx,
            },
            StreamPeer {
                rx: server_rx,
                tx: server_tx,
            },
        )
    }
}

/// Opens streams to the store
#[async_trait]
pub trait StreamConnector: Send + Sync + 'static {
    async fn connect(&self) -> Result<StreamConnection>;
}

/// Batch transport writing over message streams.
///
/// Existence, fetch and shard lookups go through `lookup`.
pub struct StreamTransport {
    connector: Arc<dyn StreamConnector>,
    lookup: Arc<dyn BatchTransport>,
    ack_timeout: Duration,
}

impl StreamTransport {
    pub fn new(connector: Arc<dyn StreamConnector>, lookup: Arc<dyn BatchTransport>) -> Self {
        Self {
            connector,
            lookup,
            ack_timeout: Duration::from_secs(30),
        }
    }

    /// Longest silence tolerated while waiting for acknowledgements
    pub fn with_ack_timeout(mut self, ack_timeout: Duration) -> Self {
        self.ack_timeout = ack_timeout;
        self
    }

    async fn exchange(&self, message: ClientMessage, ids: Vec<String>) -> Result<Vec<DispatchOutcome>> {
        let mut connection = self.connector.connect().await?;

        connection
            .tx
            .send(message)
            .await
            .map_err(|_| BatchError::network("Stream closed before items were sent"))?;
        connection
            .tx
            .send(ClientMessage::Stop)
            .await
            .map_err(|_| BatchError::network("Stream closed before stop was sent"))?;

        // The same uuid may appear more than once in a batch
        let mut positions: HashMap<&str, Vec<usize>> = HashMap::new();
        for (position, id) in ids.iter().enumerate() {
            positions.entry(id.as_str()).or_default().push(position);
        }
        let mut outcomes: Vec<Option<DispatchOutcome>> = vec![None; ids.len()];

        loop {
            let message = match tokio::time::timeout(self.ack_timeout, connection.rx.recv()).await {
                Ok(Some(message)) => message,
                Ok(None) => break,
                Err(_) => {
                    warn!("No stream message within {:?}", self.ack_timeout);
                    break;
                }
            };

            match message {
                ServerMessage::Ack { ids: acked } => {
                    for id in acked {
                        match positions.get(id.as_str()) {
                            Some(slots) => {
                                for &position in slots {
                                    outcomes[position] = Some(DispatchOutcome::Success);
                                }
                            }
                            None => debug!("Ignoring ack for unknown item {}", id),
                        }
                    }
                }
                ServerMessage::Error { id, message, code } => match positions.get(id.as_str()) {
                    Some(slots) => {
                        let error = ItemError { message, code };
                        for &position in slots {
                            outcomes[position] = Some(DispatchOutcome::Error(error.clone()));
                        }
                    }
                    None => debug!("Ignoring error for unknown item {}", id),
                },
                ServerMessage::Stop => {
                    connection
                        .tx
                        .send(ClientMessage::StopAck)
                        .await
                        .map_err(|_| BatchError::network("Stream closed before stop ack"))?;
                    break;
                }
            }
        }

        let unanswered = outcomes.iter().filter(|o| o.is_none()).count();
        if unanswered > 0 {
            warn!("{} of {} streamed items unacknowledged", unanswered, ids.len());
        }

        Ok(outcomes
            .into_iter()
            .map(|outcome| {
                outcome.unwrap_or_else(|| {
                    DispatchOutcome::Ambiguous("No acknowledgement before stream end".to_string())
                })
            })
            .collect())
    }
}

#[async_trait]
impl BatchTransport for StreamTransport {
    async fn send_objects(&self, objects: &[ObjectItem]) -> Result<Vec<DispatchOutcome>> {
        let items: Vec<StreamItem<ObjectItem>> = objects
            .iter()
            .enumerate()
            .map(|(position, object)| StreamItem {
                id: object
                    .uuid
                    .map(|u| u.to_string())
                    .unwrap_or_else(|| format!("#{}", position)),
                item: object.clone(),
            })
            .collect();
        let ids = items.iter().map(|i| i.id.clone()).collect();
        self.exchange(ClientMessage::Objects { items }, ids).await
    }

    async fn send_references(
        &self,
        references: &[ReferenceItem],
    ) -> Result<Vec<DispatchOutcome>> {
        let items: Vec<StreamItem<ReferenceItem>> = references
            .iter()
            .enumerate()
            .map(|(position, reference)| StreamItem {
                id: format!("#{}", position),
                item: reference.clone(),
            })
            .collect();
        let ids = items.iter().map(|i| i.id.clone()).collect();
        self.exchange(ClientMessage::References { items }, ids).await
    }

    async fn object_exists(
        &self,
        collection: &str,
        id: Uuid,
        tenant: Option<&str>,
    ) -> Result<bool> {
        self.lookup.object_exists(collection, id, tenant).await
    }

    async fn get_object(
        &self,
        collection: &str,
        id: Uuid,
        tenant: Option<&str>,
    ) -> Result<Option<StoredObject>> {
        self.lookup.get_object(collection, id, tenant).await
    }

    async fn shards(&self, collection: &str, tenant: Option<&str>) -> Result<Vec<ShardStatus>> {
        self.lookup.shards(collection, tenant).await
    }

    async fn health_check(&self) -> Result<()> {
        self.lookup.health_check().await
    }
}
