//! Shared helpers for the integration suites: a fresh engine per test plus
//! contract builders around a "cat" resource on the in-memory store.

#![allow(dead_code)]

use declarative_crud::domain::contract::{
    AuthInput, AuthPolicy, Contract, HttpMethod, Implementation, ManagedFields,
};
use declarative_crud::domain::result::{CrudResult, ErrorEnvelope, Success};
use declarative_crud::domain::schema::NoValidation;
use declarative_crud::{CrudEngine, StoreRegistry};
use serde_json::json;
use std::sync::Arc;

/// An engine over its own registry so tests never share store state.
pub fn engine() -> (Arc<StoreRegistry>, CrudEngine) {
    let registry = Arc::new(StoreRegistry::new());
    let engine = CrudEngine::new(registry.clone(), Arc::new(NoValidation));
    (registry, engine)
}

pub fn kv_contract(method: HttpMethod) -> Contract {
    Contract::new(
        "cat",
        method,
        Implementation::KeyValue {
            backend: "memory".to_string(),
            prefix: "cat".to_string(),
            allow_get_all: true,
        },
    )
    .with_auth(AuthPolicy::roles_or_owner(&["admin"]))
    .with_manage_fields(ManagedFields::with_created_by())
}

/// Post contract open to any authenticated caller; used to seed records
/// owned by plain users (a role policy would reject their creates).
pub fn open_post_contract() -> Contract {
    kv_contract(HttpMethod::Post).with_auth(AuthPolicy::Authenticated)
}

pub fn admin() -> AuthInput {
    AuthInput::with_permissions("root", &["admin"])
}

pub fn success(result: CrudResult) -> Success {
    match result {
        CrudResult::Success(success) => success,
        CrudResult::Error(envelope) => panic!("expected success, got {:?}", envelope),
    }
}

pub fn envelope(result: CrudResult) -> ErrorEnvelope {
    match result {
        CrudResult::Error(envelope) => envelope,
        CrudResult::Success(success) => panic!("expected an error, got {:?}", success),
    }
}

/// Seeds `n` records owned by `sub`, with ids `my_id_{sub}{i}`.
pub async fn post_some(engine: &CrudEngine, sub: &str, n: usize) -> Vec<String> {
    let post = engine.validated(open_post_contract());
    let mut ids = Vec::new();
    for i in 0..n {
        let id = format!("my_id_{}{}", sub, i);
        let result = post
            .handle(
                json!({ "id": id, "name": format!("cat {}", i) }),
                AuthInput::user(sub),
            )
            .await
            .unwrap();
        assert!(!result.is_error(), "seed post failed: {:?}", result);
        ids.push(id);
    }
    ids
}
