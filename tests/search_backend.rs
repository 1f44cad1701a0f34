//! Search-index engine against an in-memory fake of the index client.

mod common;

use common::{admin, envelope, success};
use declarative_crud::backend::{Backend, IdArg, SearchBackend};
use declarative_crud::domain::contract::{
    AuthInput, AuthPolicy, Contract, HttpMethod, Implementation, ManagedFields,
};
use declarative_crud::storage::search::{CreateOutcome, SearchClient};
use serde_json::{json, Value as JsonValue};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Single-index fake. `search` honours the subset of the query language the
/// engine emits: `term` equality, `bool.should` (any), `bool.must` (all);
/// `simple_query_string` matches everything.
#[derive(Default)]
struct FakeIndex {
    docs: Mutex<BTreeMap<String, JsonValue>>,
}

fn matches(query: &JsonValue, doc: &JsonValue) -> bool {
    if let Some(term) = query.get("term").and_then(JsonValue::as_object) {
        return term.iter().all(|(field, value)| doc.get(field) == Some(value));
    }
    if let Some(compound) = query.get("bool") {
        if let Some(should) = compound.get("should").and_then(JsonValue::as_array) {
            return should.iter().any(|q| matches(q, doc));
        }
        if let Some(must) = compound.get("must").and_then(JsonValue::as_array) {
            return must.iter().all(|q| matches(q, doc));
        }
    }
    true
}

#[async_trait::async_trait]
impl SearchClient for FakeIndex {
    async fn get(&self, _index: &str, id: &str) -> anyhow::Result<Option<JsonValue>> {
        Ok(self.docs.lock().unwrap().get(id).cloned())
    }

    async fn mget(&self, _index: &str, ids: &[String]) -> anyhow::Result<Vec<Option<JsonValue>>> {
        let docs = self.docs.lock().unwrap();
        Ok(ids.iter().map(|id| docs.get(id).cloned()).collect())
    }

    async fn search(
        &self,
        _index: &str,
        query: Option<JsonValue>,
        size: usize,
    ) -> anyhow::Result<Vec<JsonValue>> {
        let docs = self.docs.lock().unwrap();
        Ok(docs
            .values()
            .filter(|doc| query.as_ref().map(|q| matches(q, doc)).unwrap_or(true))
            .take(size)
            .cloned()
            .collect())
    }

    async fn create(
        &self,
        _index: &str,
        id: &str,
        body: &JsonValue,
    ) -> anyhow::Result<CreateOutcome> {
        let mut docs = self.docs.lock().unwrap();
        if docs.contains_key(id) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        docs.insert(id.to_string(), body.clone());
        Ok(CreateOutcome::Created)
    }

    async fn index(&self, _index: &str, id: &str, body: &JsonValue) -> anyhow::Result<()> {
        self.docs.lock().unwrap().insert(id.to_string(), body.clone());
        Ok(())
    }

    async fn update(&self, _index: &str, id: &str, doc: &JsonValue) -> anyhow::Result<()> {
        let mut docs = self.docs.lock().unwrap();
        if let Some(JsonValue::Object(existing)) = docs.get_mut(id) {
            if let JsonValue::Object(patch) = doc {
                for (key, value) in patch {
                    existing.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(())
    }

    async fn delete(&self, _index: &str, id: &str) -> anyhow::Result<()> {
        self.docs.lock().unwrap().remove(id);
        Ok(())
    }
}

fn contract(method: HttpMethod) -> Contract {
    Contract::new(
        "cat",
        method,
        Implementation::SearchIndex { index: "Cats".to_string(), max_results: Some(50) },
    )
    .with_auth(AuthPolicy::roles_or_owner(&["admin"]))
    .with_manage_fields(ManagedFields::with_created_by())
}

async fn seeded() -> (Arc<FakeIndex>, SearchBackend) {
    let index = Arc::new(FakeIndex::default());
    let backend = SearchBackend::new(index.clone());
    let post = contract(HttpMethod::Post).with_auth(AuthPolicy::Authenticated);
    for (id, sub, name) in [("a1", "userA", "whiskers"), ("b1", "userB", "shadow")] {
        let result = backend
            .post(
                &post,
                &AuthInput::user(sub),
                Some(id.to_string()),
                &json!({ "name": name }),
            )
            .await
            .unwrap();
        assert!(!result.is_error(), "seed post failed: {:?}", result);
    }
    (index, backend)
}

#[tokio::test]
async fn conditional_create_makes_duplicates_a_conflict() {
    let (_index, backend) = seeded().await;
    let post = contract(HttpMethod::Post).with_auth(AuthPolicy::Authenticated);

    let result = backend
        .post(&post, &AuthInput::user("userA"), Some("a1".to_string()), &json!({ "name": "again" }))
        .await
        .unwrap();
    let error = envelope(result);
    assert_eq!(error.status, 409);
    assert_eq!(error.error_type, "conflict");
}

#[tokio::test]
async fn get_by_id_enforces_ownership() {
    let (_index, backend) = seeded().await;
    let get = contract(HttpMethod::Get);

    let mine = backend
        .get(&get, &AuthInput::user("userA"), Some(IdArg::One("a1".to_string())), &json!({}))
        .await
        .unwrap();
    assert_eq!(success(mine).result[0]["name"], json!("whiskers"));

    let foreign = backend
        .get(&get, &AuthInput::user("userA"), Some(IdArg::One("b1".to_string())), &json!({}))
        .await
        .unwrap();
    assert_eq!(envelope(foreign).status, 403);

    let missing = backend
        .get(&get, &admin(), Some(IdArg::One("ghost".to_string())), &json!({}))
        .await
        .unwrap();
    assert_eq!(envelope(missing).status, 404);
}

#[tokio::test]
async fn batched_get_keeps_only_visible_documents() {
    let (_index, backend) = seeded().await;
    let get = contract(HttpMethod::Get);
    let ids = IdArg::Many(vec!["a1".to_string(), "b1".to_string(), "ghost".to_string()]);

    let as_a = backend
        .get(&get, &AuthInput::user("userA"), Some(ids.clone()), &json!({}))
        .await
        .unwrap();
    let result = success(as_a).result;
    assert_eq!(result.as_array().unwrap().len(), 1);
    assert_eq!(result[0]["id"], json!("a1"));

    let as_admin = backend.get(&get, &admin(), Some(ids), &json!({})).await.unwrap();
    assert_eq!(success(as_admin).result.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn listing_folds_ownership_into_the_query() {
    let (_index, backend) = seeded().await;
    let get = contract(HttpMethod::Get);

    let as_a = backend
        .get(&get, &AuthInput::user("userA"), None, &json!({}))
        .await
        .unwrap();
    let result = success(as_a).result;
    assert_eq!(result.as_array().unwrap().len(), 1);
    assert_eq!(result[0]["createdBy"], json!("userA"));

    let as_admin = backend.get(&get, &admin(), None, &json!({})).await.unwrap();
    assert_eq!(success(as_admin).result.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn search_terms_still_carry_the_ownership_filter() {
    let (_index, backend) = seeded().await;
    let get = contract(HttpMethod::Get);

    let result = backend
        .get(&get, &AuthInput::user("userB"), None, &json!({ "search": "shadow" }))
        .await
        .unwrap();
    let result = success(result).result;
    assert_eq!(result.as_array().unwrap().len(), 1);
    assert_eq!(result[0]["createdBy"], json!("userB"));
}

#[tokio::test]
async fn put_preserves_provenance_and_patch_merges() {
    let (index, backend) = seeded().await;

    let put = contract(HttpMethod::Put);
    let replaced = backend
        .put(&put, &admin(), "b1", &json!({ "name": "renamed", "createdBy": "intruder" }))
        .await
        .unwrap();
    assert_eq!(success(replaced).result["createdBy"], json!("userB"));

    let patch = contract(HttpMethod::Patch);
    let merged = backend
        .patch(&patch, &AuthInput::user("userA"), "a1", &json!({ "color": "white" }))
        .await
        .unwrap();
    let record = success(merged).result;
    assert_eq!(record["name"], json!("whiskers"));
    assert_eq!(record["color"], json!("white"));

    let stored = index.docs.lock().unwrap().get("a1").cloned().unwrap();
    assert_eq!(stored["color"], json!("white"));
}

#[tokio::test]
async fn batch_delete_aggregates_denied_items() {
    let (index, backend) = seeded().await;
    let delete = contract(HttpMethod::Delete);

    let result = backend
        .delete(
            &delete,
            &AuthInput::user("userA"),
            IdArg::Many(vec!["a1".to_string(), "b1".to_string()]),
        )
        .await
        .unwrap();
    let error = envelope(result);
    assert_eq!(error.status, 403);
    assert_eq!(error.errors, vec![json!("b1: forbidden")]);

    let docs = index.docs.lock().unwrap();
    assert!(!docs.contains_key("a1"));
    assert!(docs.contains_key("b1"));
}
