//! Storage capabilities: the key-value interface with its reference and
//! remote implementations, the search-index client seam, and the store
//! registry.

pub mod kv;
pub mod registry;
pub mod search;

pub use kv::{KeyValueStore, ListEntry, ListOptions, ListPage, MemoryStore, PutOptions, WorkerKvStore};
pub use registry::StoreRegistry;
pub use search::{CreateOutcome, ElasticClient, SearchClient};
