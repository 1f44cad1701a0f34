//! Thin HTTP glue: turns processed contracts into axum routes.
//!
//! Each contract is served at `/api/{name}` and `/api/{name}/{id}` with its
//! declared method. Caller identity arrives pre-verified in the `x-sub` and
//! `x-permissions` headers (credential verification is an upstream concern,
//! e.g. an auth proxy); everything else is delegated to the request
//! processor.

use crate::app::processor::ProcessedContract;
use crate::domain::contract::{AuthInput, HttpMethod};
use axum::extract::{Path, Query};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{on, MethodFilter};
use axum::{Json, Router};
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::sync::Arc;

fn auth_from_headers(headers: &HeaderMap) -> AuthInput {
    let sub = headers
        .get("x-sub")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let permissions = headers
        .get("x-permissions")
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    AuthInput { sub, permissions }
}

/// Merges query-string parameters (`limit`, `cursor`, `search`, `id`, ...)
/// into the body object; an explicit body field wins.
fn merge_query(body: JsonValue, query: HashMap<String, String>) -> JsonValue {
    let mut body = if body.is_null() { json!({}) } else { body };
    if let Some(object) = body.as_object_mut() {
        for (key, value) in query {
            // Only limit is numeric; ids and cursors stay opaque strings.
            let value = if key == "limit" {
                value.parse::<u64>().map(JsonValue::from).unwrap_or(json!(value))
            } else {
                json!(value)
            };
            object.entry(key).or_insert(value);
        }
    }
    body
}

fn method_filter(method: HttpMethod) -> MethodFilter {
    match method {
        HttpMethod::Get => MethodFilter::GET,
        HttpMethod::Post => MethodFilter::POST,
        HttpMethod::Put => MethodFilter::PUT,
        HttpMethod::Patch => MethodFilter::PATCH,
        HttpMethod::Delete => MethodFilter::DELETE,
    }
}

async fn respond(
    contract: Arc<ProcessedContract>,
    headers: HeaderMap,
    query: HashMap<String, String>,
    id: Option<String>,
    body: JsonValue,
) -> Response {
    let user = auth_from_headers(&headers);
    let body = merge_query(body, query);
    let response = contract.handle(body, id, user).await;
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(response.body)).into_response()
}

pub fn create_router(contracts: Vec<ProcessedContract>) -> Router {
    let mut router = Router::new();
    for contract in contracts {
        let contract = Arc::new(contract);
        let base = contract.route();
        let filter = method_filter(contract.contract().method);

        let without_id = {
            let contract = contract.clone();
            move |headers: HeaderMap,
                  Query(query): Query<HashMap<String, String>>,
                  body: Option<Json<JsonValue>>| async move {
                let body = body.map(|Json(b)| b).unwrap_or(JsonValue::Null);
                respond(contract, headers, query, None, body).await
            }
        };
        let with_id = {
            let contract = contract.clone();
            move |Path(id): Path<String>,
                  headers: HeaderMap,
                  Query(query): Query<HashMap<String, String>>,
                  body: Option<Json<JsonValue>>| async move {
                let body = body.map(|Json(b)| b).unwrap_or(JsonValue::Null);
                respond(contract, headers, query, Some(id), body).await
            }
        };

        router = router
            .route(&base, on(filter, without_id))
            .route(&format!("{}/:id", base), on(filter, with_id));
    }
    router
}
