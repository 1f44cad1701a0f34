//! Centralized configuration (environment variables + defaults).

use anyhow::Context;

fn required(name: &str) -> anyhow::Result<String> {
    std::env::var(name).with_context(|| format!("{} must be set", name))
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Cloudflare account id for the Workers KV adapter.
pub fn worker_account() -> anyhow::Result<String> {
    required("WORKER_ACCOUNT")
}

/// Workers KV namespace id.
pub fn worker_kv_namespace() -> anyhow::Result<String> {
    required("WORKER_KV_NAMESPACE")
}

/// Workers KV API token.
pub fn worker_kv_token() -> anyhow::Result<String> {
    required("WORKER_KV_TOKEN")
}

/// Elasticsearch node URL (required when a search-index contract is used).
pub fn elastic_host() -> anyhow::Result<String> {
    required("ELASTIC_HOST")
}

pub fn elastic_username() -> Option<String> {
    optional("ELASTIC_USER_NAME")
}

pub fn elastic_password() -> Option<String> {
    optional("ELASTIC_PASSWORD")
}

pub fn elastic_api_key() -> Option<String> {
    optional("ELASTIC_API_KEY")
}

/// Bind address for the demo API server.
pub fn bind_address() -> String {
    optional("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string())
}
