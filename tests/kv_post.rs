//! Key-value engine: create semantics, id generation and metadata stamping.

mod common;

use common::{admin, engine, envelope, kv_contract, open_post_contract, success};
use declarative_crud::domain::contract::{AuthInput, HttpMethod};
use declarative_crud::storage::kv::{record_key, KeyValueStore};
use serde_json::json;

#[tokio::test]
async fn created_record_is_stored_with_stamped_metadata() {
    let (registry, engine) = engine();
    let post = engine.validated(open_post_contract());

    let result = post
        .handle(
            json!({ "id": "felix", "name": "Felix" }),
            AuthInput::user("userA"),
        )
        .await
        .unwrap();
    let record = success(result).result;
    assert_eq!(record["id"], json!("felix"));
    assert_eq!(record["createdBy"], json!("userA"));

    let store = registry.resolve("memory").await.unwrap();
    let (value, metadata) = store
        .get_with_metadata(&record_key("cat", "felix"))
        .await
        .unwrap();
    let stored: serde_json::Value = serde_json::from_str(&value.unwrap()).unwrap();
    assert_eq!(stored, record);

    let metadata = metadata.unwrap();
    assert_eq!(metadata["createdBy"], json!("userA"));
    assert_eq!(metadata["updatedBy"], json!("userA"));
    assert!(metadata.get("createdAt").is_some());
    assert!(metadata.get("updatedAt").is_some());
}

#[tokio::test]
async fn an_id_is_generated_when_none_is_supplied() {
    let (_registry, engine) = engine();
    let post = engine.validated(open_post_contract());

    let result = post
        .handle(json!({ "name": "stray" }), AuthInput::user("userA"))
        .await
        .unwrap();
    let record = success(result).result;
    let id = record["id"].as_str().unwrap();
    assert!(!id.is_empty());

    // The generated id is immediately readable.
    let get = engine.validated(kv_contract(HttpMethod::Get));
    let fetched = get
        .handle(json!({ "id": id }), AuthInput::user("userA"))
        .await
        .unwrap();
    assert_eq!(success(fetched).result[0]["name"], json!("stray"));
}

#[tokio::test]
async fn duplicate_id_is_a_conflict() {
    let (_registry, engine) = engine();
    let post = engine.validated(open_post_contract());

    let first = post
        .handle(json!({ "id": "dup", "name": "one" }), AuthInput::user("userA"))
        .await
        .unwrap();
    assert!(!first.is_error());

    let second = post
        .handle(json!({ "id": "dup", "name": "two" }), admin())
        .await
        .unwrap();
    let error = envelope(second);
    assert_eq!(error.status, 409);
    assert_eq!(error.error_type, "conflict");
}

#[tokio::test]
async fn ownership_never_authorizes_a_create() {
    let (_registry, engine) = engine();
    // Role policy with the owner marker: there is no record to own yet, so
    // only the permission check applies.
    let post = engine.validated(kv_contract(HttpMethod::Post));

    let denied = post
        .handle(json!({ "id": "x", "name": "x" }), AuthInput::user("userA"))
        .await
        .unwrap();
    assert_eq!(envelope(denied).status, 403);

    let allowed = post
        .handle(json!({ "id": "x", "name": "x" }), admin())
        .await
        .unwrap();
    assert!(!allowed.is_error());
}

#[tokio::test]
async fn non_object_body_is_bad_input() {
    let (_registry, engine) = engine();
    let post = engine.validated(open_post_contract());

    let result = post.handle(json!(7), AuthInput::user("userA")).await.unwrap();
    let error = envelope(result);
    assert_eq!(error.status, 400);
    assert_eq!(error.error_type, "badInput");
}
