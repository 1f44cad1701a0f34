//! Backend operation engines: one per backend family, all implementing the
//! same abstract operation contract.

pub mod kv;
pub mod search;

use crate::domain::contract::{AuthInput, Contract};
use crate::domain::result::CrudResult;
use serde_json::{json, Value as JsonValue};

pub use kv::KeyValueBackend;
pub use search::SearchBackend;

/// An id argument: one record or a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdArg {
    One(String),
    Many(Vec<String>),
}

impl IdArg {
    /// Reads an id from a request body field: a string, or an array of
    /// strings for batch operations.
    pub fn from_value(value: Option<&JsonValue>) -> Option<IdArg> {
        match value? {
            JsonValue::String(id) => Some(IdArg::One(id.clone())),
            JsonValue::Array(items) => Some(IdArg::Many(
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect(),
            )),
            _ => None,
        }
    }
}

/// The abstract operation contract every backend family implements.
///
/// Expected conditions (not found, forbidden, conflict, bad input) come back
/// as error envelopes inside `Ok`; `Err` is reserved for unexpected faults
/// such as an unreachable store.
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    async fn get(
        &self,
        contract: &Contract,
        auth: &AuthInput,
        id: Option<IdArg>,
        body: &JsonValue,
    ) -> anyhow::Result<CrudResult>;

    async fn post(
        &self,
        contract: &Contract,
        auth: &AuthInput,
        id: Option<String>,
        body: &JsonValue,
    ) -> anyhow::Result<CrudResult>;

    async fn put(
        &self,
        contract: &Contract,
        auth: &AuthInput,
        id: &str,
        body: &JsonValue,
    ) -> anyhow::Result<CrudResult>;

    async fn patch(
        &self,
        contract: &Contract,
        auth: &AuthInput,
        id: &str,
        body: &JsonValue,
    ) -> anyhow::Result<CrudResult>;

    async fn delete(
        &self,
        contract: &Contract,
        auth: &AuthInput,
        id: IdArg,
    ) -> anyhow::Result<CrudResult>;
}

/// Folds per-item batch-delete outcomes into one result.
///
/// Successful items stay applied. Any failure turns the aggregate into a
/// `forbidden` envelope whose `errors` holds exactly the failed items'
/// reasons, so a 20-item batch with 3 denied items reports 3 errors.
pub(crate) fn aggregate_delete(items: Vec<(String, CrudResult)>) -> CrudResult {
    let ids: Vec<&String> = items.iter().map(|(id, _)| id).collect();
    let data = json!({ "id": ids });

    let mut removed = Vec::new();
    let mut errors = Vec::new();
    for (id, outcome) in &items {
        match outcome {
            CrudResult::Success(success) => removed.push(success.result.clone()),
            CrudResult::Error(envelope) => {
                errors.push(json!(format!("{}: {}", id, envelope.error_type)));
            }
        }
    }

    if errors.is_empty() {
        CrudResult::ok(JsonValue::Array(removed))
    } else {
        CrudResult::forbidden(data, errors)
    }
}
