//! The key-value storage capability: the minimal interface a concrete store
//! must expose to be usable by the key-value operation engine.
//!
//! Keys are UTF-8 strings of the form `{prefix}:records:{id}`; values are
//! UTF-8 JSON text regardless of backend. Implementations must give
//! read-after-write visibility within the calling process and must report an
//! absent key as a miss, never as an error, so the engine can distinguish
//! "missing" from "denied".

pub mod memory;
pub mod worker;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub use memory::MemoryStore;
pub use worker::WorkerKvStore;

/// A listable key with its stamped metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JsonValue>,
}

/// One page of a key listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListPage {
    pub keys: Vec<ListEntry>,
    /// Opaque resume token; absent when there is nothing further to list.
    pub cursor: Option<String>,
    pub list_complete: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub prefix: Option<String>,
    pub limit: Option<usize>,
    pub cursor: Option<String>,
}

impl ListOptions {
    pub fn prefixed(prefix: &str) -> Self {
        ListOptions { prefix: Some(prefix.to_string()), ..Default::default() }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    pub metadata: Option<JsonValue>,
    /// Absolute unix-seconds expiration.
    pub expiration: Option<u64>,
    /// Relative time-to-live in seconds; ignored when `expiration` is set.
    pub expiration_ttl: Option<u64>,
}

impl PutOptions {
    pub fn with_metadata(metadata: JsonValue) -> Self {
        PutOptions { metadata: Some(metadata), ..Default::default() }
    }
}

#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn list(&self, options: ListOptions) -> anyhow::Result<ListPage>;

    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    /// Fetches the value together with the metadata stamped at put time.
    async fn get_with_metadata(
        &self,
        key: &str,
    ) -> anyhow::Result<(Option<String>, Option<JsonValue>)>;

    async fn put(&self, key: &str, value: String, options: PutOptions) -> anyhow::Result<()>;

    async fn delete(&self, key: &str) -> anyhow::Result<()>;
}

impl std::fmt::Debug for dyn KeyValueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn KeyValueStore")
    }
}

/// The sole addressing scheme across backend families: prefix partitioning
/// lets multiple logical resources share one physical store.
pub fn record_key(prefix: &str, id: &str) -> String {
    format!("{}:records:{}", prefix, id)
}

/// The listing prefix covering every record of a resource.
pub fn record_prefix(prefix: &str) -> String {
    format!("{}:records", prefix)
}
