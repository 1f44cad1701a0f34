//! Cloudflare Workers KV adapter for the key-value storage capability.
//!
//! Speaks the v4 REST API: `GET /keys` for listing, `GET|PUT|DELETE
//! /values/{key}` for single keys. Metadata rides along as a multipart form
//! field on writes and comes back from the listing endpoint. A 404 on read
//! is an unambiguous miss; other error statuses surface as `HandlingError`
//! so the request processor can map them onto a transport status.

use crate::domain::result::HandlingError;
use crate::infra::config;
use crate::storage::kv::{KeyValueStore, ListEntry, ListOptions, ListPage, PutOptions};
use anyhow::Context;
use serde_json::Value as JsonValue;
use std::time::Duration;

pub struct WorkerKvStore {
    http: reqwest::Client,
    namespaced_url: String,
    token: String,
}

impl WorkerKvStore {
    /// Builds an adapter from `WORKER_ACCOUNT`, `WORKER_KV_NAMESPACE` and
    /// `WORKER_KV_TOKEN`.
    pub fn from_env() -> anyhow::Result<Self> {
        let account = config::worker_account()?;
        let namespace = config::worker_kv_namespace()?;
        let token = config::worker_kv_token()?;
        Ok(Self::new(&account, &namespace, &token))
    }

    pub fn new(account: &str, namespace: &str, token: &str) -> Self {
        WorkerKvStore {
            http: reqwest::Client::new(),
            namespaced_url: format!(
                "https://api.cloudflare.com/client/v4/accounts/{}/storage/kv/namespaces/{}",
                account, namespace
            ),
            token: token.to_string(),
        }
    }

    /// Sends a request, waiting out 429 rate-limit responses.
    async fn send(&self, build: impl Fn() -> reqwest::RequestBuilder) -> anyhow::Result<reqwest::Response> {
        loop {
            let response = build()
                .bearer_auth(&self.token)
                .send()
                .await
                .context("workers kv request failed")?;
            if response.status().as_u16() == 429 {
                tracing::warn!("workers kv rate limited, retrying");
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
            return Ok(response);
        }
    }

    async fn read_value(&self, key: &str) -> anyhow::Result<Option<String>> {
        let url = format!("{}/values/{}", self.namespaced_url, key);
        let response = self.send(|| self.http.get(&url)).await?;
        let status = response.status().as_u16();
        if status == 404 {
            return Ok(None);
        }
        let text = response.text().await?;
        if status >= 400 {
            return Err(HandlingError::new(status, text).into());
        }
        Ok(Some(text))
    }
}

#[async_trait::async_trait]
impl KeyValueStore for WorkerKvStore {
    async fn list(&self, options: ListOptions) -> anyhow::Result<ListPage> {
        let mut params = Vec::new();
        if let Some(limit) = options.limit {
            // The API rejects limits below 10.
            params.push(format!("limit={}", limit.max(10)));
        }
        if let Some(cursor) = &options.cursor {
            params.push(format!("cursor={}", cursor));
        }
        if let Some(prefix) = &options.prefix {
            params.push(format!("prefix={}", prefix));
        }
        let url = if params.is_empty() {
            format!("{}/keys", self.namespaced_url)
        } else {
            format!("{}/keys?{}", self.namespaced_url, params.join("&"))
        };

        let response = self.send(|| self.http.get(&url)).await?;
        let status = response.status().as_u16();
        let body: JsonValue = response.json().await?;
        if status >= 400 || body["success"] != JsonValue::Bool(true) {
            return Err(HandlingError::new(status.max(500), body.to_string()).into());
        }

        let keys: Vec<ListEntry> = serde_json::from_value(body["result"].clone())
            .context("malformed workers kv listing")?;
        let cursor = body["result_info"]["cursor"]
            .as_str()
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        let list_complete = cursor.is_none() || keys.is_empty();
        Ok(ListPage { keys, cursor, list_complete })
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        self.read_value(key).await
    }

    async fn get_with_metadata(
        &self,
        key: &str,
    ) -> anyhow::Result<(Option<String>, Option<JsonValue>)> {
        // The values endpoint does not return metadata; recover it from a
        // prefix listing on the exact key.
        let value = self.read_value(key).await?;
        let page = self.list(ListOptions::prefixed(key)).await?;
        let metadata = page.keys.into_iter().next().and_then(|e| e.metadata);
        Ok((value, metadata))
    }

    async fn put(&self, key: &str, value: String, options: PutOptions) -> anyhow::Result<()> {
        let mut form = reqwest::multipart::Form::new().text("value", value);
        if let Some(metadata) = &options.metadata {
            form = form.text("metadata", metadata.to_string());
        }

        let mut params = Vec::new();
        if let Some(expiration) = options.expiration {
            params.push(format!("expiration={}", expiration));
        } else if let Some(ttl) = options.expiration_ttl {
            params.push(format!("expiration_ttl={}", ttl));
        }
        let url = if params.is_empty() {
            format!("{}/values/{}", self.namespaced_url, key)
        } else {
            format!("{}/values/{}?{}", self.namespaced_url, key, params.join("&"))
        };

        // multipart::Form is not cloneable, so the rate-limit retry loop is
        // not reusable here; a single 429 on write is surfaced as an error.
        let metadata = options.metadata.clone();
        let response = self
            .http
            .put(&url)
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await
            .context("workers kv put failed")?;
        let status = response.status().as_u16();
        if status >= 400 {
            let text = response.text().await.unwrap_or_default();
            tracing::warn!(status, key, has_metadata = metadata.is_some(), "workers kv put rejected");
            return Err(HandlingError::new(status, text).into());
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        let url = format!("{}/values/{}", self.namespaced_url, key);
        let response = self.send(|| self.http.delete(&url)).await?;
        let status = response.status().as_u16();
        if status >= 400 && status != 404 {
            let text = response.text().await.unwrap_or_default();
            return Err(HandlingError::new(status, text).into());
        }
        Ok(())
    }
}
