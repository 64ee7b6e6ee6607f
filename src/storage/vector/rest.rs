//! REST transport for the remote vector store

use crate::config::{ClientConfig, ConsistencyLevel};
use crate::core::batch::{DispatchOutcome, ObjectItem, ReferenceItem};
use crate::utils::error::{BatchError, Result};
use crate::utils::truncate_string;
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde_json::{Map, Value, json};
use tracing::{debug, info};
use uuid::Uuid;

use super::backend::BatchTransport;
use super::types::{ShardStatus, StoredObject};
use super::wire::decode_outcomes;

const BEACON_PREFIX: &str = "weaviate://localhost";
const MAX_ERROR_BODY: usize = 512;

/// Vector store reached over its REST API
#[derive(Debug, Clone)]
pub struct RestTransport {
    url: String,
    api_key: Option<String>,
    consistency_level: Option<ConsistencyLevel>,
    client: reqwest::Client,
}

impl RestTransport {
    /// Create a new REST transport
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        info!("REST transport configured for {}", config.url);
        Ok(Self {
            url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            consistency_level: config.consistency_level,
            client,
        })
    }

    /// Base URL of the store
    pub fn url(&self) -> &str {
        &self.url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.url, path);
        let mut request = self.client.request(method, &url);

        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        request
    }

    fn batch_request(&self, path: &str) -> RequestBuilder {
        let mut request = self.request(Method::POST, path);
        if let Some(level) = self.consistency_level {
            request = request.query(&[("consistency_level", level.as_str())]);
        }
        request
    }

    async fn send_batch(
        &self,
        path: &str,
        payload: Value,
        keys: &[Option<String>],
    ) -> Result<Vec<DispatchOutcome>> {
        let response = self.batch_request(path).json(&payload).send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(BatchError::remote(
                status.as_u16(),
                truncate_string(&body, MAX_ERROR_BODY),
            ));
        }

        let value: Value = serde_json::from_str(&body)?;
        let outcomes = decode_outcomes(&value, keys)?;
        debug!(
            "Batch {} answered: {}/{} succeeded",
            path,
            outcomes.iter().filter(|o| o.is_success()).count(),
            outcomes.len()
        );
        Ok(outcomes)
    }
}

fn object_payload(object: &ObjectItem) -> Value {
    let mut entry = Map::new();
    entry.insert("class".to_string(), json!(object.collection));
    if let Some(uuid) = object.uuid {
        entry.insert("id".to_string(), json!(uuid.to_string()));
    }
    entry.insert("properties".to_string(), object.properties.clone());
    if let Some(vector) = &object.vector {
        entry.insert("vector".to_string(), json!(vector));
    }
    if let Some(tenant) = &object.tenant {
        entry.insert("tenant".to_string(), json!(tenant));
    }
    Value::Object(entry)
}

fn reference_payload(reference: &ReferenceItem) -> Value {
    let from = format!(
        "{}/{}/{}/{}",
        BEACON_PREFIX, reference.from_collection, reference.from_uuid, reference.from_property
    );
    let to = match &reference.to_collection {
        Some(collection) => format!("{}/{}/{}", BEACON_PREFIX, collection, reference.to_uuid),
        None => format!("{}/{}", BEACON_PREFIX, reference.to_uuid),
    };

    let mut entry = Map::new();
    entry.insert("from".to_string(), json!(from));
    entry.insert("to".to_string(), json!(to));
    if let Some(tenant) = &reference.tenant {
        entry.insert("tenant".to_string(), json!(tenant));
    }
    Value::Object(entry)
}

fn object_path(collection: &str, id: Uuid) -> String {
    format!("/v1/objects/{}/{}", collection, id)
}

#[async_trait]
impl BatchTransport for RestTransport {
    async fn send_objects(&self, objects: &[ObjectItem]) -> Result<Vec<DispatchOutcome>> {
        let keys: Vec<Option<String>> = objects
            .iter()
            .map(|o| o.uuid.map(|u| u.to_string()))
            .collect();
        let payload = json!({ "objects": objects.iter().map(object_payload).collect::<Vec<_>>() });
        self.send_batch("/v1/batch/objects", payload, &keys).await
    }

    async fn send_references(
        &self,
        references: &[ReferenceItem],
    ) -> Result<Vec<DispatchOutcome>> {
        // Reference responses are positional
        let keys = vec![None; references.len()];
        let payload = Value::Array(references.iter().map(reference_payload).collect());
        self.send_batch("/v1/batch/references", payload, &keys).await
    }

    async fn object_exists(
        &self,
        collection: &str,
        id: Uuid,
        tenant: Option<&str>,
    ) -> Result<bool> {
        let mut request = self.request(Method::HEAD, &object_path(collection, id));
        if let Some(tenant) = tenant {
            request = request.query(&[("tenant", tenant)]);
        }

        let response = request.send().await?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(BatchError::remote(
                status.as_u16(),
                format!("Existence check for {} failed", id),
            )),
        }
    }

    async fn get_object(
        &self,
        collection: &str,
        id: Uuid,
        tenant: Option<&str>,
    ) -> Result<Option<StoredObject>> {
        let mut request = self
            .request(Method::GET, &object_path(collection, id))
            .query(&[("include", "vector")]);
        if let Some(tenant) = tenant {
            request = request.query(&[("tenant", tenant)]);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = response.text().await?;
        if !status.is_success() {
            return Err(BatchError::remote(
                status.as_u16(),
                truncate_string(&body, MAX_ERROR_BODY),
            ));
        }

        Ok(Some(serde_json::from_str(&body)?))
    }

    async fn shards(&self, collection: &str, tenant: Option<&str>) -> Result<Vec<ShardStatus>> {
        let mut request = self.request(Method::GET, &format!("/v1/schema/{}/shards", collection));
        if let Some(tenant) = tenant {
            request = request.query(&[("tenant", tenant)]);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(BatchError::remote(
                status.as_u16(),
                truncate_string(&body, MAX_ERROR_BODY),
            ));
        }

        Ok(serde_json::from_str(&body)?)
    }

    async fn health_check(&self) -> Result<()> {
        let response = self
            .request(Method::GET, "/v1/.well-known/ready")
            .send()
            .await
            .map_err(|e| BatchError::network(format!("Store unreachable: {}", e)))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(BatchError::remote(
                response.status().as_u16(),
                "Store is not ready",
            ))
        }
    }
}
