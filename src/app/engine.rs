//! Engine construction root.
//!
//! Owns the store registry, the optional search client, the validator, and
//! any custom operation engines. Resolves a contract's `implementation` to a
//! concrete handler via exhaustive match and wraps it with schema validation
//! and the request processor.

use crate::app::processor::ProcessedContract;
use crate::backend::{Backend, IdArg, KeyValueBackend, SearchBackend};
use crate::domain::contract::{Contract, ContractHandler, HandlerAuth, HttpMethod, Implementation};
use crate::domain::result::CrudResult;
use crate::domain::schema::SchemaValidator;
use crate::domain::validation::ValidatedContract;
use crate::storage::registry::StoreRegistry;
use crate::storage::search::SearchClient;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;

pub struct CrudEngine {
    registry: Arc<StoreRegistry>,
    validator: Arc<dyn SchemaValidator>,
    kv: Arc<KeyValueBackend>,
    search: Option<Arc<SearchBackend>>,
    custom: HashMap<String, Arc<dyn Backend>>,
}

impl CrudEngine {
    pub fn new(registry: Arc<StoreRegistry>, validator: Arc<dyn SchemaValidator>) -> Self {
        CrudEngine {
            kv: Arc::new(KeyValueBackend::new(registry.clone())),
            registry,
            validator,
            search: None,
            custom: HashMap::new(),
        }
    }

    pub fn with_search_client(mut self, client: Arc<dyn SearchClient>) -> Self {
        self.search = Some(Arc::new(SearchBackend::new(client)));
        self
    }

    /// Registers a custom operation engine selectable via
    /// `Implementation::Custom { name }`.
    pub fn with_custom_backend(mut self, name: &str, backend: Arc<dyn Backend>) -> Self {
        self.custom.insert(name.to_string(), backend);
        self
    }

    pub fn registry(&self) -> &Arc<StoreRegistry> {
        &self.registry
    }

    fn resolve_handler(&self, contract: &Arc<Contract>) -> Option<Arc<dyn ContractHandler>> {
        let backend: Arc<dyn Backend> = match &contract.implementation {
            Implementation::Manual => return contract.handler.clone(),
            Implementation::KeyValue { .. } => self.kv.clone(),
            Implementation::SearchIndex { .. } => {
                let search = self.search.as_ref()?;
                search.clone()
            }
            Implementation::Custom { name } => self.custom.get(name)?.clone(),
        };
        Some(Arc::new(BackendHandler { backend, contract: contract.clone() }))
    }

    /// Wraps a contract's resolved handler with input/output validation.
    /// A contract whose implementation cannot be resolved (manual without a
    /// handler, search-index without a client) yields `Not implemented`.
    pub fn validated(&self, contract: Contract) -> ValidatedContract {
        let contract = Arc::new(contract);
        let handler = self.resolve_handler(&contract);
        ValidatedContract::new(contract, handler, self.validator.clone())
    }

    /// Full stack for one contract: processor over validation over backend.
    pub fn process(&self, contract: Contract) -> ProcessedContract {
        ProcessedContract::new(self.validated(contract))
    }
}

/// Adapts a backend operation engine to the contract-handler interface,
/// extracting the id argument from the request body and dispatching on the
/// contract's method.
struct BackendHandler {
    backend: Arc<dyn Backend>,
    contract: Arc<Contract>,
}

#[async_trait::async_trait]
impl ContractHandler for BackendHandler {
    async fn handle(&self, input: JsonValue, auth: HandlerAuth) -> anyhow::Result<CrudResult> {
        let contract = &self.contract;
        let id = IdArg::from_value(input.get("id"));
        match contract.method {
            HttpMethod::Get => self.backend.get(contract, &auth.auth, id, &input).await,
            HttpMethod::Post => {
                let id = match id {
                    None => None,
                    Some(IdArg::One(id)) => Some(id),
                    Some(IdArg::Many(_)) => {
                        return Ok(CrudResult::bad_input(
                            "Cannot create multiple records at once",
                            input,
                        ))
                    }
                };
                self.backend.post(contract, &auth.auth, id, &input).await
            }
            HttpMethod::Put | HttpMethod::Patch => {
                let Some(IdArg::One(id)) = id else {
                    return Ok(CrudResult::bad_input("Id must be provided", input));
                };
                match contract.method {
                    HttpMethod::Put => self.backend.put(contract, &auth.auth, &id, &input).await,
                    _ => self.backend.patch(contract, &auth.auth, &id, &input).await,
                }
            }
            HttpMethod::Delete => {
                let Some(id) = id else {
                    return Ok(CrudResult::bad_input("Id must be provided", input));
                };
                self.backend.delete(contract, &auth.auth, id).await
            }
        }
    }
}
