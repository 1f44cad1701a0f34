//! Explicit registry of key-value store instances.
//!
//! Stores are memoized per name with an explicit create/destroy lifecycle.
//! The registry is owned by the engine's construction root, so tests can run
//! against independent registries without sharing state.

use crate::storage::kv::{KeyValueStore, MemoryStore, WorkerKvStore};
use anyhow::anyhow;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct StoreRegistry {
    stores: RwLock<HashMap<String, Arc<dyn KeyValueStore>>>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        StoreRegistry::default()
    }

    /// Registers a custom store under a name so contracts can select it via
    /// `implementation.backend`.
    pub async fn register(&self, name: &str, store: Arc<dyn KeyValueStore>) {
        self.stores.write().await.insert(name.to_string(), store);
    }

    /// Resolves a store by name, lazily creating the built-in ones
    /// (`memory`, `worker`) on first use.
    pub async fn resolve(&self, name: &str) -> anyhow::Result<Arc<dyn KeyValueStore>> {
        if let Some(store) = self.stores.read().await.get(name) {
            return Ok(store.clone());
        }

        let created: Arc<dyn KeyValueStore> = match name {
            "memory" => Arc::new(MemoryStore::new()),
            "worker" => Arc::new(WorkerKvStore::from_env()?),
            other => return Err(anyhow!("Unknown key value backend: '{}'", other)),
        };

        let mut stores = self.stores.write().await;
        // A concurrent resolve may have won; keep the first instance.
        let store = stores.entry(name.to_string()).or_insert(created).clone();
        Ok(store)
    }

    /// Drops a memoized instance. The next resolve creates a fresh one.
    pub async fn destroy(&self, name: &str) {
        self.stores.write().await.remove(name);
    }
}
