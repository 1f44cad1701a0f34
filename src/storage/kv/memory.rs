//! In-memory reference implementation of the key-value storage capability.
//!
//! Two parallel insertion-ordered maps: value-by-key and list-entry-by-key.
//! `list` is an ordered linear scan with prefix filtering and a resume-at
//! cursor; iteration order is insertion order and callers must not assume
//! anything stronger than "stable for the lifetime of the process".

use crate::storage::kv::{KeyValueStore, ListEntry, ListOptions, ListPage, PutOptions};
use chrono::Utc;
use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    values: IndexMap<String, String>,
    entries: IndexMap<String, ListEntry>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

#[async_trait::async_trait]
impl KeyValueStore for MemoryStore {
    async fn list(&self, options: ListOptions) -> anyhow::Result<ListPage> {
        let inner = self.inner.read().await;
        let limit = options.limit.unwrap_or(usize::MAX).max(1);

        let mut keys = Vec::new();
        let mut next_cursor = None;
        // The cursor names the first key of the requested page; skip
        // everything before it. An unknown cursor yields an empty page.
        let mut seeking = options.cursor.clone();

        for entry in inner.entries.values() {
            if let Some(cursor) = &seeking {
                if entry.name != *cursor {
                    continue;
                }
                seeking = None;
            }
            if let Some(prefix) = &options.prefix {
                if !entry.name.starts_with(prefix.as_str()) {
                    continue;
                }
            }
            if keys.len() == limit {
                next_cursor = Some(entry.name.clone());
                break;
            }
            keys.push(entry.clone());
        }

        let list_complete = next_cursor.is_none();
        Ok(ListPage { keys, cursor: next_cursor, list_complete })
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let inner = self.inner.read().await;
        Ok(inner.values.get(key).cloned())
    }

    async fn get_with_metadata(
        &self,
        key: &str,
    ) -> anyhow::Result<(Option<String>, Option<JsonValue>)> {
        let inner = self.inner.read().await;
        let value = inner.values.get(key).cloned();
        let metadata = inner.entries.get(key).and_then(|e| e.metadata.clone());
        Ok((value, metadata))
    }

    async fn put(&self, key: &str, value: String, options: PutOptions) -> anyhow::Result<()> {
        let expiration = options.expiration.or_else(|| {
            options
                .expiration_ttl
                .map(|ttl| Utc::now().timestamp() as u64 + ttl)
        });
        let mut inner = self.inner.write().await;
        inner.values.insert(key.to_string(), value);
        inner.entries.insert(
            key.to_string(),
            ListEntry {
                name: key.to_string(),
                expiration,
                metadata: options.metadata,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        let mut inner = self.inner.write().await;
        // shift_remove keeps the scan order of the surviving entries stable.
        inner.values.shift_remove(key);
        inner.entries.shift_remove(key);
        Ok(())
    }
}
