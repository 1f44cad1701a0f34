// src/bin/api_server.rs

use declarative_crud::domain::contract::{
    AuthPolicy, Contract, HttpMethod, Implementation, ManagedFields,
};
use declarative_crud::{BasicValidator, CrudEngine, StoreRegistry};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// A note resource backed by the in-memory store, exercising every
/// operation the engine supports.
fn note_contracts() -> Vec<Contract> {
    let implementation = Implementation::KeyValue {
        backend: "memory".to_string(),
        prefix: "note".to_string(),
        allow_get_all: true,
    };
    let manage = ManagedFields::with_created_by();
    let auth = AuthPolicy::roles_or_owner(&["admin"]);

    let record = json!({
        "id": "string",
        "createdBy": ["string", "null"],
        "title": "string",
        "body?": "string"
    });
    let list_or_one = json!([{ "$array": record.clone() }, record.clone()]);

    vec![
        Contract::new("note", HttpMethod::Get, implementation.clone())
            .with_auth(auth.clone())
            .with_manage_fields(manage)
            .with_schemas(
                json!({ "id?": ["string", { "$array": "string" }], "limit?": "integer", "cursor?": "string" }),
                list_or_one.clone(),
            ),
        Contract::new("note", HttpMethod::Post, implementation.clone())
            .with_auth(auth.clone())
            .with_manage_fields(manage)
            .with_schemas(
                json!({ "id?": "string", "title": "string", "body?": "string" }),
                record.clone(),
            ),
        Contract::new("note", HttpMethod::Put, implementation.clone())
            .with_auth(auth.clone())
            .with_manage_fields(manage)
            .with_schemas(
                json!({ "id": "string", "title": "string", "body?": "string" }),
                record.clone(),
            ),
        Contract::new("note", HttpMethod::Patch, implementation.clone())
            .with_auth(auth.clone())
            .with_manage_fields(manage)
            .with_schemas(
                json!({ "id": "string", "title?": "string", "body?": "string" }),
                record.clone(),
            ),
        Contract::new("note", HttpMethod::Delete, implementation)
            .with_auth(auth)
            .with_manage_fields(manage)
            .with_schemas(
                json!({ "id": ["string", { "$array": "string" }] }),
                list_or_one,
            ),
    ]
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    println!("> Initializing store registry...");
    let registry = Arc::new(StoreRegistry::new());
    let engine = CrudEngine::new(registry, Arc::new(BasicValidator));

    println!("> Registering contracts...");
    let processed = note_contracts()
        .into_iter()
        .map(|contract| engine.process(contract))
        .collect::<Vec<_>>();
    for contract in &processed {
        println!(
            "> {} {} ({:?})",
            contract.contract().method.as_str(),
            contract.route(),
            contract.contract().implementation
        );
    }

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);
    let app = declarative_crud::transport::http::create_router(processed).layer(cors);

    let address = declarative_crud::infra::config::bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    println!("> API server listening on http://{}", address);
    println!("> Identity is read from the x-sub / x-permissions headers");

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            println!("\n> Shutdown signal received (Ctrl+C)...");
        }
    }

    Ok(())
}
