//! The search-index storage capability and a thin Elasticsearch adapter.
//!
//! The operation engine only needs a handful of calls: single/multi get,
//! bounded query, conditional create, full index, partial update, delete.
//! Anything beyond that stays behind the remote index.

use crate::domain::result::HandlingError;
use crate::infra::config;
use anyhow::Context;
use serde_json::{json, Value as JsonValue};

/// Outcome of a conditional create: the index either took the document or
/// already held one under that id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

#[async_trait::async_trait]
pub trait SearchClient: Send + Sync {
    /// Fetches a document source; a missing id is a miss, not an error.
    async fn get(&self, index: &str, id: &str) -> anyhow::Result<Option<JsonValue>>;

    /// Fetches many document sources, preserving id order; misses are `None`.
    async fn mget(&self, index: &str, ids: &[String]) -> anyhow::Result<Vec<Option<JsonValue>>>;

    /// Runs a bounded query; `None` means match-all.
    async fn search(
        &self,
        index: &str,
        query: Option<JsonValue>,
        size: usize,
    ) -> anyhow::Result<Vec<JsonValue>>;

    /// Atomic insert-if-absent.
    async fn create(&self, index: &str, id: &str, body: &JsonValue)
        -> anyhow::Result<CreateOutcome>;

    /// Full document replace.
    async fn index(&self, index: &str, id: &str, body: &JsonValue) -> anyhow::Result<()>;

    /// Partial document update.
    async fn update(&self, index: &str, id: &str, doc: &JsonValue) -> anyhow::Result<()>;

    async fn delete(&self, index: &str, id: &str) -> anyhow::Result<()>;
}

enum Credentials {
    Basic { username: String, password: String },
    ApiKey(String),
    None,
}

/// Elasticsearch adapter over its JSON REST API. Writes use
/// `refresh=wait_for` so the engine's read-after-write assumption holds.
pub struct ElasticClient {
    http: reqwest::Client,
    node: String,
    credentials: Credentials,
}

impl ElasticClient {
    /// Builds a client from `ELASTIC_HOST` plus either
    /// `ELASTIC_USER_NAME`/`ELASTIC_PASSWORD` or `ELASTIC_API_KEY`.
    pub fn from_env() -> anyhow::Result<Self> {
        let node = config::elastic_host()?;
        let credentials = match (config::elastic_username(), config::elastic_password()) {
            (Some(username), Some(password)) => Credentials::Basic { username, password },
            _ => match config::elastic_api_key() {
                Some(key) => Credentials::ApiKey(key),
                None => {
                    tracing::warn!("elasticsearch credentials are not set");
                    Credentials::None
                }
            },
        };
        Ok(ElasticClient { http: reqwest::Client::new(), node, credentials })
    }

    pub fn new(node: &str) -> Self {
        ElasticClient {
            http: reqwest::Client::new(),
            node: node.to_string(),
            credentials: Credentials::None,
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.credentials {
            Credentials::Basic { username, password } => {
                request.basic_auth(username, Some(password))
            }
            Credentials::ApiKey(key) => request.header("Authorization", format!("ApiKey {}", key)),
            Credentials::None => request,
        }
    }

    async fn expect_ok(response: reqwest::Response, what: &str) -> anyhow::Result<JsonValue> {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        if status >= 400 {
            return Err(HandlingError::new(status, format!("{}: {}", what, body)).into());
        }
        serde_json::from_str(&body).with_context(|| format!("malformed {} response", what))
    }
}

#[async_trait::async_trait]
impl SearchClient for ElasticClient {
    async fn get(&self, index: &str, id: &str) -> anyhow::Result<Option<JsonValue>> {
        let url = format!("{}/{}/_doc/{}", self.node, index, id);
        let response = self.authorize(self.http.get(&url)).send().await?;
        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        let body = Self::expect_ok(response, "get").await?;
        Ok(Some(body["_source"].clone()))
    }

    async fn mget(&self, index: &str, ids: &[String]) -> anyhow::Result<Vec<Option<JsonValue>>> {
        let url = format!("{}/{}/_mget", self.node, index);
        let response = self
            .authorize(self.http.post(&url))
            .json(&json!({ "ids": ids }))
            .send()
            .await?;
        let body = Self::expect_ok(response, "mget").await?;
        let docs = body["docs"].as_array().cloned().unwrap_or_default();
        Ok(docs
            .into_iter()
            .map(|doc| {
                if doc["found"] == JsonValue::Bool(true) {
                    Some(doc["_source"].clone())
                } else {
                    None
                }
            })
            .collect())
    }

    async fn search(
        &self,
        index: &str,
        query: Option<JsonValue>,
        size: usize,
    ) -> anyhow::Result<Vec<JsonValue>> {
        let url = format!("{}/{}/_search", self.node, index);
        let mut request = json!({ "size": size });
        if let Some(query) = query {
            request["query"] = query;
        }
        let response = self.authorize(self.http.post(&url)).json(&request).send().await?;
        let body = Self::expect_ok(response, "search").await?;
        let hits = body["hits"]["hits"].as_array().cloned().unwrap_or_default();
        Ok(hits.into_iter().map(|hit| hit["_source"].clone()).collect())
    }

    async fn create(
        &self,
        index: &str,
        id: &str,
        body: &JsonValue,
    ) -> anyhow::Result<CreateOutcome> {
        let url = format!("{}/{}/_create/{}?refresh=wait_for", self.node, index, id);
        let response = self.authorize(self.http.put(&url)).json(body).send().await?;
        if response.status().as_u16() == 409 {
            return Ok(CreateOutcome::AlreadyExists);
        }
        Self::expect_ok(response, "create").await?;
        Ok(CreateOutcome::Created)
    }

    async fn index(&self, index: &str, id: &str, body: &JsonValue) -> anyhow::Result<()> {
        let url = format!("{}/{}/_doc/{}?refresh=wait_for", self.node, index, id);
        let response = self.authorize(self.http.put(&url)).json(body).send().await?;
        Self::expect_ok(response, "index").await?;
        Ok(())
    }

    async fn update(&self, index: &str, id: &str, doc: &JsonValue) -> anyhow::Result<()> {
        let url = format!("{}/{}/_update/{}?refresh=wait_for", self.node, index, id);
        let response = self
            .authorize(self.http.post(&url))
            .json(&json!({ "doc": doc }))
            .send()
            .await?;
        Self::expect_ok(response, "update").await?;
        Ok(())
    }

    async fn delete(&self, index: &str, id: &str) -> anyhow::Result<()> {
        let url = format!("{}/{}/_doc/{}?refresh=wait_for", self.node, index, id);
        let response = self.authorize(self.http.delete(&url)).send().await?;
        let status = response.status().as_u16();
        if status >= 400 && status != 404 {
            let body = response.text().await.unwrap_or_default();
            return Err(HandlingError::new(status, body).into());
        }
        Ok(())
    }
}
