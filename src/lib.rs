pub mod app;
pub mod backend;
pub mod domain;
pub mod infra;
pub mod storage;
pub mod transport;

// Convenience re-exports (keeps call-sites clean)
pub use app::{CrudEngine, HandleResponse, ProcessedContract};
pub use backend::{Backend, IdArg, KeyValueBackend, SearchBackend};
pub use domain::{
    AuthInput, AuthPolicy, BasicValidator, Contract, ContractHandler, CrudResult, ErrorEnvelope,
    HandlingError, HttpMethod, Implementation, ManagedFields, SchemaValidator, Success,
};
pub use storage::{ElasticClient, KeyValueStore, MemoryStore, StoreRegistry, WorkerKvStore};
