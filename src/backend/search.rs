//! Search-index operation engine.
//!
//! Structurally mirrors the key-value engine, but listing trusts the remote
//! index's query-time filtering: the ownership predicate is folded into the
//! query instead of filtered client-side after fetch. The two families
//! intentionally diverge here because their storage primitives differ.

use crate::backend::{aggregate_delete, Backend, IdArg};
use crate::domain::access::{authorized_by_permission, filter_to_access, owner_fields};
use crate::domain::contract::{AuthInput, Contract, Implementation};
use crate::domain::result::CrudResult;
use crate::storage::search::{CreateOutcome, SearchClient};
use anyhow::anyhow;
use serde_json::{json, Map, Value as JsonValue};
use std::sync::Arc;

pub const DEFAULT_MAX_RESULTS: usize = 64;

struct IndexTarget {
    index: String,
    max_results: usize,
}

pub struct SearchBackend {
    client: Arc<dyn SearchClient>,
}

impl SearchBackend {
    pub fn new(client: Arc<dyn SearchClient>) -> Self {
        SearchBackend { client }
    }

    fn target(contract: &Contract) -> anyhow::Result<IndexTarget> {
        match &contract.implementation {
            Implementation::SearchIndex { index, max_results } => Ok(IndexTarget {
                index: index.to_lowercase(),
                max_results: max_results.unwrap_or(DEFAULT_MAX_RESULTS),
            }),
            other => Err(anyhow!(
                "contract '{}' is not search-index backed: {:?}",
                contract.name,
                other
            )),
        }
    }

    /// Ownership predicate in the index's own query language: any owner
    /// field equal to the caller's subject.
    fn owner_filter(contract: &Contract, auth: &AuthInput) -> JsonValue {
        let terms: Vec<JsonValue> = owner_fields(&contract.manage_fields)
            .into_iter()
            .map(|field| json!({ "term": { field: auth.sub } }))
            .collect();
        json!({ "bool": { "should": terms } })
    }

    async fn fetch_checked(
        &self,
        target: &IndexTarget,
        contract: &Contract,
        auth: &AuthInput,
        id: &str,
    ) -> anyhow::Result<Result<JsonValue, CrudResult>> {
        match self.client.get(&target.index, id).await? {
            None => Ok(Err(CrudResult::not_found(json!({ "id": id })))),
            Some(record) => {
                let visible = filter_to_access(
                    vec![record],
                    &contract.authentication,
                    auth,
                    &contract.manage_fields,
                );
                match visible.into_iter().next() {
                    Some(record) => Ok(Ok(record)),
                    None => Ok(Err(CrudResult::forbidden(json!({ "id": id }), vec![]))),
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl Backend for SearchBackend {
    async fn get(
        &self,
        contract: &Contract,
        auth: &AuthInput,
        id: Option<IdArg>,
        body: &JsonValue,
    ) -> anyhow::Result<CrudResult> {
        let target = Self::target(contract)?;
        match id {
            Some(IdArg::Many(ids)) => {
                if ids.is_empty() {
                    return Ok(CrudResult::ok(json!([])));
                }
                let docs = self.client.mget(&target.index, &ids).await?;
                let found: Vec<JsonValue> = docs.into_iter().flatten().collect();
                let visible = filter_to_access(
                    found,
                    &contract.authentication,
                    auth,
                    &contract.manage_fields,
                );
                Ok(CrudResult::ok(JsonValue::Array(visible)))
            }
            Some(IdArg::One(id)) => {
                match self.fetch_checked(&target, contract, auth, &id).await? {
                    Ok(record) => Ok(CrudResult::ok(json!([record]))),
                    Err(error) => Ok(error),
                }
            }
            None => {
                let authorized = authorized_by_permission(&contract.authentication, auth);
                let search_term = body.get("search").and_then(JsonValue::as_str);

                let query = if let Some(term) = search_term {
                    let mut must = vec![json!({ "simple_query_string": { "query": term } })];
                    if !authorized {
                        must.push(Self::owner_filter(contract, auth));
                    }
                    Some(json!({ "bool": { "must": must } }))
                } else if !authorized {
                    Some(Self::owner_filter(contract, auth))
                } else {
                    None
                };

                let hits = self
                    .client
                    .search(&target.index, query, target.max_results)
                    .await?;
                Ok(CrudResult::ok(JsonValue::Array(hits)))
            }
        }
    }

    async fn post(
        &self,
        contract: &Contract,
        auth: &AuthInput,
        id: Option<String>,
        body: &JsonValue,
    ) -> anyhow::Result<CrudResult> {
        if !authorized_by_permission(&contract.authentication, auth) {
            return Ok(CrudResult::forbidden(body.clone(), vec![]));
        }
        let target = Self::target(contract)?;

        let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let mut record = match body {
            JsonValue::Object(map) => map.clone(),
            JsonValue::Null => Map::new(),
            other => return Ok(CrudResult::bad_input("Body must be an object", other.clone())),
        };
        record.insert("id".to_string(), json!(id));
        if contract.manage_fields.created_by {
            record.insert("createdBy".to_string(), json!(auth.sub));
        }
        let record = JsonValue::Object(record);

        // The index's conditional create makes conflict detection atomic,
        // unlike the key-value engine's check-then-act.
        match self.client.create(&target.index, &id, &record).await? {
            CreateOutcome::AlreadyExists => Ok(CrudResult::conflict(json!({ "id": id }))),
            CreateOutcome::Created => Ok(CrudResult::ok(record)),
        }
    }

    async fn put(
        &self,
        contract: &Contract,
        auth: &AuthInput,
        id: &str,
        body: &JsonValue,
    ) -> anyhow::Result<CrudResult> {
        let target = Self::target(contract)?;
        let existing = match self.fetch_checked(&target, contract, auth, id).await? {
            Ok(record) => record,
            Err(error) => return Ok(error),
        };

        let mut record = match body {
            JsonValue::Object(map) => map.clone(),
            other => return Ok(CrudResult::bad_input("Body must be an object", other.clone())),
        };
        record.insert("id".to_string(), json!(id));
        if contract.manage_fields.created_by {
            record.insert(
                "createdBy".to_string(),
                existing.get("createdBy").cloned().unwrap_or(JsonValue::Null),
            );
        }
        let record = JsonValue::Object(record);
        self.client.index(&target.index, id, &record).await?;
        Ok(CrudResult::ok(record))
    }

    async fn patch(
        &self,
        contract: &Contract,
        auth: &AuthInput,
        id: &str,
        body: &JsonValue,
    ) -> anyhow::Result<CrudResult> {
        let target = Self::target(contract)?;
        let existing = match self.fetch_checked(&target, contract, auth, id).await? {
            Ok(record) => record,
            Err(error) => return Ok(error),
        };

        self.client.update(&target.index, id, body).await?;

        let mut merged = match existing {
            JsonValue::Object(map) => map,
            other => return Err(anyhow!("stored record is not an object: {}", other)),
        };
        if let JsonValue::Object(patch) = body {
            for (key, value) in patch {
                merged.insert(key.clone(), value.clone());
            }
        }
        Ok(CrudResult::ok(JsonValue::Object(merged)))
    }

    async fn delete(
        &self,
        contract: &Contract,
        auth: &AuthInput,
        id: IdArg,
    ) -> anyhow::Result<CrudResult> {
        let target = Self::target(contract)?;
        match id {
            IdArg::Many(ids) => {
                let deletes = ids
                    .iter()
                    .map(|id| self.delete_one(&target, contract, auth, id));
                let outcomes = futures::future::join_all(deletes).await;
                let mut items = Vec::with_capacity(ids.len());
                for (id, outcome) in ids.into_iter().zip(outcomes) {
                    items.push((id, outcome?));
                }
                Ok(aggregate_delete(items))
            }
            IdArg::One(id) => self.delete_one(&target, contract, auth, &id).await,
        }
    }
}

impl SearchBackend {
    async fn delete_one(
        &self,
        target: &IndexTarget,
        contract: &Contract,
        auth: &AuthInput,
        id: &str,
    ) -> anyhow::Result<CrudResult> {
        match self.fetch_checked(target, contract, auth, id).await? {
            Err(error) => Ok(error),
            Ok(record) => {
                self.client.delete(&target.index, id).await?;
                Ok(CrudResult::ok(record))
            }
        }
    }
}
