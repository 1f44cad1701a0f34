//! Contract definitions: the declarative unit of one resource + operation pair.

use crate::domain::result::CrudResult;
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;

/// HTTP method of a contract; fixes the operation semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// HTTP status for a successful call of this method.
    pub fn success_status(&self) -> u16 {
        match self {
            HttpMethod::Post => 201,
            _ => 200,
        }
    }
}

/// Authorization policy of a contract.
///
/// On the wire this is `false` (open), `true` (any authenticated caller) or a
/// list of role tokens, optionally carrying a `{"createdBy": true}` marker
/// meaning the record owner may act regardless of role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthPolicy {
    /// No authentication required.
    Open,
    /// Any authenticated caller.
    Authenticated,
    /// Callers holding one of `roles`; `created_by` additionally admits the
    /// record owner on per-record operations.
    Roles { roles: Vec<String>, created_by: bool },
}

impl AuthPolicy {
    pub fn roles(roles: &[&str]) -> Self {
        AuthPolicy::Roles {
            roles: roles.iter().map(|r| r.to_string()).collect(),
            created_by: false,
        }
    }

    pub fn roles_or_owner(roles: &[&str]) -> Self {
        AuthPolicy::Roles {
            roles: roles.iter().map(|r| r.to_string()).collect(),
            created_by: true,
        }
    }

    /// Whether a caller identity (`sub`) is required at all.
    pub fn requires_login(&self) -> bool {
        !matches!(self, AuthPolicy::Open)
    }

    fn from_value(value: &JsonValue) -> Result<Self, String> {
        match value {
            JsonValue::Bool(false) => Ok(AuthPolicy::Open),
            JsonValue::Bool(true) => Ok(AuthPolicy::Authenticated),
            JsonValue::Array(items) => {
                let mut roles = Vec::new();
                let mut created_by = false;
                for item in items {
                    match item {
                        JsonValue::String(role) => roles.push(role.clone()),
                        JsonValue::Object(map) => {
                            if map.get("createdBy").and_then(JsonValue::as_bool) == Some(true) {
                                created_by = true;
                            } else {
                                return Err(format!("invalid auth entry: {}", item));
                            }
                        }
                        other => return Err(format!("invalid auth entry: {}", other)),
                    }
                }
                Ok(AuthPolicy::Roles { roles, created_by })
            }
            other => Err(format!("invalid authentication value: {}", other)),
        }
    }

    fn to_value(&self) -> JsonValue {
        match self {
            AuthPolicy::Open => json!(false),
            AuthPolicy::Authenticated => json!(true),
            AuthPolicy::Roles { roles, created_by } => {
                let mut items: Vec<JsonValue> =
                    roles.iter().map(|r| JsonValue::String(r.clone())).collect();
                if *created_by {
                    items.push(json!({ "createdBy": true }));
                }
                JsonValue::Array(items)
            }
        }
    }
}

impl Serialize for AuthPolicy {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for AuthPolicy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = JsonValue::deserialize(deserializer)?;
        AuthPolicy::from_value(&value).map_err(D::Error::custom)
    }
}

/// Flags for the system-managed fields the engine injects on write and uses
/// for ownership filtering on read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedFields {
    #[serde(default)]
    pub id: bool,
    #[serde(default)]
    pub created_by: bool,
}

impl ManagedFields {
    pub fn with_created_by() -> Self {
        ManagedFields { id: true, created_by: true }
    }
}

/// Backend selection for a contract: a closed sum over the supported backend
/// families, each carrying only its own configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Implementation {
    /// The contract supplies its own handler.
    Manual,
    #[serde(rename_all = "camelCase")]
    KeyValue {
        /// Store name resolved through the `StoreRegistry` (`memory`,
        /// `worker`, or a registered custom store).
        backend: String,
        /// Key namespace; records live under `{prefix}:records:{id}`.
        prefix: String,
        #[serde(default)]
        allow_get_all: bool,
    },
    #[serde(rename_all = "camelCase")]
    SearchIndex {
        index: String,
        #[serde(default)]
        max_results: Option<usize>,
    },
    /// A custom operation engine registered on the `CrudEngine` by name.
    Custom { name: String },
}

/// Caller identity for a single call. No `sub` means unauthenticated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<String>,
}

impl AuthInput {
    pub fn anonymous() -> Self {
        AuthInput::default()
    }

    pub fn user(sub: &str) -> Self {
        AuthInput { sub: Some(sub.to_string()), permissions: Vec::new() }
    }

    pub fn with_permissions(sub: &str, permissions: &[&str]) -> Self {
        AuthInput {
            sub: Some(sub.to_string()),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// Identity plus the policy of the contract being invoked, handed to handlers.
#[derive(Debug, Clone)]
pub struct HandlerAuth {
    pub auth: AuthInput,
    pub authentication: AuthPolicy,
}

/// User-supplied handler for `Implementation::Manual` contracts.
///
/// Expected failures are returned as error envelopes inside `CrudResult`;
/// only unexpected faults come back as `Err` and are normalized once, at the
/// request-processor boundary.
#[async_trait::async_trait]
pub trait ContractHandler: Send + Sync {
    async fn handle(&self, input: JsonValue, auth: HandlerAuth) -> anyhow::Result<CrudResult>;
}

/// Declarative description of one resource operation.
#[derive(Clone)]
pub struct Contract {
    pub name: String,
    pub method: HttpMethod,
    pub authentication: AuthPolicy,
    pub manage_fields: ManagedFields,
    /// Schema for valid input shapes (opaque to the engine).
    pub arguments: JsonValue,
    /// Schema for valid output shapes (opaque to the engine).
    pub returns: JsonValue,
    pub implementation: Implementation,
    pub handler: Option<Arc<dyn ContractHandler>>,
}

impl Contract {
    pub fn new(name: &str, method: HttpMethod, implementation: Implementation) -> Self {
        Contract {
            name: name.to_string(),
            method,
            authentication: AuthPolicy::Open,
            manage_fields: ManagedFields::default(),
            arguments: json!("any"),
            returns: json!("any"),
            implementation,
            handler: None,
        }
    }

    pub fn with_auth(mut self, authentication: AuthPolicy) -> Self {
        self.authentication = authentication;
        self
    }

    pub fn with_manage_fields(mut self, manage_fields: ManagedFields) -> Self {
        self.manage_fields = manage_fields;
        self
    }

    pub fn with_schemas(mut self, arguments: JsonValue, returns: JsonValue) -> Self {
        self.arguments = arguments;
        self.returns = returns;
        self
    }

    pub fn with_handler(mut self, handler: Arc<dyn ContractHandler>) -> Self {
        self.handler = Some(handler);
        self
    }
}

impl std::fmt::Debug for Contract {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Contract")
            .field("name", &self.name)
            .field("method", &self.method)
            .field("authentication", &self.authentication)
            .field("manage_fields", &self.manage_fields)
            .field("implementation", &self.implementation)
            .field("handler", &self.handler.as_ref().map(|_| "<fn>"))
            .finish()
    }
}
