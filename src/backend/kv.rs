//! Key-value operation engine.
//!
//! Implements the five operations against any `KeyValueStore`. Each record
//! occupies one logical key plus a side metadata slot holding the
//! engine-stamped fields (`createdBy`, `createdAt`, `updatedAt`,
//! `updatedBy`); the stamped `createdBy` is what listing consults before
//! paying for a value fetch.

use crate::backend::{aggregate_delete, Backend, IdArg};
use crate::domain::access::{authorized_by_permission, filter_to_access};
use crate::domain::contract::{AuthInput, Contract, Implementation};
use crate::domain::result::CrudResult;
use crate::storage::kv::{record_key, record_prefix, KeyValueStore, ListOptions, PutOptions};
use crate::storage::registry::StoreRegistry;
use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};
use std::sync::Arc;

pub const DEFAULT_LIST_LIMIT: usize = 64;

/// Engine-stamped record metadata, stored in the key's metadata slot and
/// never written by callers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
}

impl RecordMeta {
    fn stamp_new(auth: &AuthInput, track_owner: bool) -> Self {
        let now = Utc::now();
        RecordMeta {
            created_by: if track_owner { auth.sub.clone() } else { None },
            created_at: Some(now),
            updated_at: Some(now),
            updated_by: auth.sub.clone(),
        }
    }

    /// Re-stamps the update fields, preserving creation provenance.
    fn restamped(existing: Option<&JsonValue>, auth: &AuthInput) -> Self {
        let mut meta: RecordMeta = existing
            .and_then(|m| serde_json::from_value(m.clone()).ok())
            .unwrap_or_default();
        meta.updated_at = Some(Utc::now());
        meta.updated_by = auth.sub.clone();
        meta
    }

    fn to_value(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }
}

struct KvTarget {
    store: Arc<dyn KeyValueStore>,
    prefix: String,
    allow_get_all: bool,
}

enum Fetched {
    Missing,
    Denied,
    Found { record: JsonValue, metadata: Option<JsonValue> },
}

pub struct KeyValueBackend {
    registry: Arc<StoreRegistry>,
}

impl KeyValueBackend {
    pub fn new(registry: Arc<StoreRegistry>) -> Self {
        KeyValueBackend { registry }
    }

    async fn target(&self, contract: &Contract) -> anyhow::Result<KvTarget> {
        match &contract.implementation {
            Implementation::KeyValue { backend, prefix, allow_get_all } => Ok(KvTarget {
                store: self.registry.resolve(backend).await?,
                prefix: prefix.clone(),
                allow_get_all: *allow_get_all,
            }),
            other => Err(anyhow!(
                "contract '{}' is not key-value backed: {:?}",
                contract.name,
                other
            )),
        }
    }

    async fn fetch_record(
        target: &KvTarget,
        id: &str,
    ) -> anyhow::Result<Option<(JsonValue, Option<JsonValue>)>> {
        let key = record_key(&target.prefix, id);
        let (value, metadata) = target.store.get_with_metadata(&key).await?;
        match value {
            None => Ok(None),
            Some(text) => {
                let record: JsonValue =
                    serde_json::from_str(&text).context("stored record is not valid JSON")?;
                Ok(Some((record, metadata)))
            }
        }
    }

    /// Fetches a record and applies the single per-record access gate.
    async fn fetch_checked(
        target: &KvTarget,
        contract: &Contract,
        auth: &AuthInput,
        id: &str,
    ) -> anyhow::Result<Fetched> {
        match Self::fetch_record(target, id).await? {
            None => Ok(Fetched::Missing),
            Some((record, metadata)) => {
                let visible = filter_to_access(
                    vec![record],
                    &contract.authentication,
                    auth,
                    &contract.manage_fields,
                );
                match visible.into_iter().next() {
                    Some(record) => Ok(Fetched::Found { record, metadata }),
                    None => Ok(Fetched::Denied),
                }
            }
        }
    }

    async fn write_record(
        target: &KvTarget,
        id: &str,
        record: &JsonValue,
        meta: &RecordMeta,
    ) -> anyhow::Result<()> {
        let key = record_key(&target.prefix, id);
        target
            .store
            .put(&key, record.to_string(), PutOptions::with_metadata(meta.to_value()))
            .await
    }

    /// Two-phase paginated listing: scan keys by stamped metadata first,
    /// then fetch only the values the caller may see. The extra metadata
    /// round-trip buys skipping deserialization of invisible records.
    async fn list_all(
        &self,
        target: &KvTarget,
        contract: &Contract,
        auth: &AuthInput,
        body: &JsonValue,
    ) -> anyhow::Result<CrudResult> {
        let limit = body
            .get("limit")
            .and_then(JsonValue::as_u64)
            .map(|l| l as usize)
            .unwrap_or(DEFAULT_LIST_LIMIT);
        let cursor = body
            .get("cursor")
            .and_then(JsonValue::as_str)
            .map(str::to_string);

        let page = target
            .store
            .list(ListOptions {
                prefix: Some(record_prefix(&target.prefix)),
                limit: Some(limit.max(10)),
                cursor,
            })
            .await?;

        let access_all = authorized_by_permission(&contract.authentication, auth);
        let mut fetches = Vec::new();
        for entry in &page.keys {
            let owner = entry
                .metadata
                .as_ref()
                .and_then(|m| m.get("createdBy"))
                .and_then(JsonValue::as_str);
            if access_all || (owner.is_some() && owner == auth.sub.as_deref()) {
                fetches.push(target.store.get(&entry.name));
            }
        }

        let mut records = Vec::new();
        for value in futures::future::join_all(fetches).await {
            // Tombstones (keys listed but already gone) are dropped.
            if let Some(text) = value? {
                let record: JsonValue =
                    serde_json::from_str(&text).context("stored record is not valid JSON")?;
                records.push(record);
            }
        }

        let more = !page.list_complete;
        let cursor = if page.list_complete || records.len() >= limit {
            None
        } else {
            page.cursor
        };
        Ok(CrudResult::ok_page(JsonValue::Array(records), cursor, more))
    }
}

#[async_trait::async_trait]
impl Backend for KeyValueBackend {
    async fn get(
        &self,
        contract: &Contract,
        auth: &AuthInput,
        id: Option<IdArg>,
        body: &JsonValue,
    ) -> anyhow::Result<CrudResult> {
        let target = self.target(contract).await?;
        match id {
            Some(IdArg::Many(ids)) => {
                if ids.is_empty() {
                    return Ok(CrudResult::ok(json!([])));
                }
                let fetches = ids.iter().map(|id| Self::fetch_record(&target, id));
                let mut records = Vec::new();
                for fetched in futures::future::join_all(fetches).await {
                    if let Some((record, _)) = fetched? {
                        records.push(record);
                    }
                }
                let visible = filter_to_access(
                    records,
                    &contract.authentication,
                    auth,
                    &contract.manage_fields,
                );
                Ok(CrudResult::ok(JsonValue::Array(visible)))
            }
            Some(IdArg::One(id)) => {
                match Self::fetch_checked(&target, contract, auth, &id).await? {
                    Fetched::Missing => Ok(CrudResult::not_found(json!({ "id": id }))),
                    Fetched::Denied => Ok(CrudResult::forbidden(json!({ "id": id }), vec![])),
                    Fetched::Found { record, .. } => Ok(CrudResult::ok(json!([record]))),
                }
            }
            None => {
                if !target.allow_get_all {
                    return Ok(CrudResult::bad_input(
                        "Get all is disabled, id must be provided",
                        body.clone(),
                    ));
                }
                self.list_all(&target, contract, auth, body).await
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
        // Ownership cannot authorize a create; only the permission check applies.
        if !authorized_by_permission(&contract.authentication, auth) {
            return Ok(CrudResult::forbidden(body.clone(), vec![]));
        }
        let target = self.target(contract).await?;

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

        // Check-then-act: two concurrent creates with the same id can both
        // observe "absent" and the later write wins. Stores with a native
        // conditional create should be preferred where this matters.
        let key = record_key(&target.prefix, &id);
        if target.store.get(&key).await?.is_some() {
            return Ok(CrudResult::conflict(json!({ "id": id })));
        }

        let record = JsonValue::Object(record);
        let meta = RecordMeta::stamp_new(auth, contract.manage_fields.created_by);
        Self::write_record(&target, &id, &record, &meta).await?;
        tracing::debug!(contract = %contract.name, %id, "record created");
        Ok(CrudResult::ok(record))
    }

    async fn put(
        &self,
        contract: &Contract,
        auth: &AuthInput,
        id: &str,
        body: &JsonValue,
    ) -> anyhow::Result<CrudResult> {
        let target = self.target(contract).await?;
        match Self::fetch_checked(&target, contract, auth, id).await? {
            Fetched::Missing => Ok(CrudResult::not_found(json!({ "id": id }))),
            Fetched::Denied => Ok(CrudResult::forbidden(json!({ "id": id }), vec![])),
            Fetched::Found { record: existing, metadata } => {
                let mut record = match body {
                    JsonValue::Object(map) => map.clone(),
                    other => {
                        return Ok(CrudResult::bad_input("Body must be an object", other.clone()))
                    }
                };
                record.insert("id".to_string(), json!(id));
                if contract.manage_fields.created_by {
                    // Full replace, but provenance is not caller-writable.
                    record.insert(
                        "createdBy".to_string(),
                        existing.get("createdBy").cloned().unwrap_or(JsonValue::Null),
                    );
                }
                let record = JsonValue::Object(record);
                let meta = RecordMeta::restamped(metadata.as_ref(), auth);
                Self::write_record(&target, id, &record, &meta).await?;
                Ok(CrudResult::ok(record))
            }
        }
    }

    async fn patch(
        &self,
        contract: &Contract,
        auth: &AuthInput,
        id: &str,
        body: &JsonValue,
    ) -> anyhow::Result<CrudResult> {
        let target = self.target(contract).await?;
        match Self::fetch_checked(&target, contract, auth, id).await? {
            Fetched::Missing => Ok(CrudResult::not_found(json!({ "id": id }))),
            Fetched::Denied => Ok(CrudResult::forbidden(json!({ "id": id }), vec![])),
            Fetched::Found { record: existing, metadata } => {
                let mut record = match existing {
                    JsonValue::Object(map) => map,
                    other => return Err(anyhow!("stored record is not an object: {}", other)),
                };
                if let JsonValue::Object(patch) = body {
                    // Shallow key overwrite; nested objects are replaced whole.
                    for (key, value) in patch {
                        record.insert(key.clone(), value.clone());
                    }
                }
                let record = JsonValue::Object(record);
                // An empty patch still re-stamps updatedAt/updatedBy.
                let meta = RecordMeta::restamped(metadata.as_ref(), auth);
                Self::write_record(&target, id, &record, &meta).await?;
                Ok(CrudResult::ok(record))
            }
        }
    }

    async fn delete(
        &self,
        contract: &Contract,
        auth: &AuthInput,
        id: IdArg,
    ) -> anyhow::Result<CrudResult> {
        let target = self.target(contract).await?;
        match id {
            IdArg::Many(ids) => {
                let deletes = ids.iter().map(|id| self.delete_one(&target, contract, auth, id));
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

impl KeyValueBackend {
    async fn delete_one(
        &self,
        target: &KvTarget,
        contract: &Contract,
        auth: &AuthInput,
        id: &str,
    ) -> anyhow::Result<CrudResult> {
        match Self::fetch_checked(target, contract, auth, id).await? {
            Fetched::Missing => Ok(CrudResult::not_found(json!({ "id": id }))),
            Fetched::Denied => Ok(CrudResult::forbidden(json!({ "id": id }), vec![])),
            Fetched::Found { record, .. } => {
                target.store.delete(&record_key(&target.prefix, id)).await?;
                tracing::debug!(contract = %contract.name, %id, "record deleted");
                Ok(CrudResult::ok(record))
            }
        }
    }
}
