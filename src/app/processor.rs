//! Request processor: the outermost layer of a contract call.
//!
//! Responsibilities: authentication gate, id reconciliation between path and
//! body, HTTP status mapping, and normalization of uncaught faults. This is
//! the only place where an `Err` escaping the layers below is converted into
//! the error envelope.

use crate::domain::contract::{AuthInput, AuthPolicy, Contract};
use crate::domain::result::{exception_envelope, CrudResult, ErrorEnvelope};
use crate::domain::validation::ValidatedContract;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;

/// A transport-ready response: status plus JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct HandleResponse {
    pub status: u16,
    pub body: JsonValue,
}

impl HandleResponse {
    fn from_error(envelope: ErrorEnvelope) -> Self {
        HandleResponse {
            status: envelope.status,
            body: serde_json::to_value(&envelope).unwrap_or(JsonValue::Null),
        }
    }
}

/// A contract wrapped with the full processing pipeline, ready to be wired
/// to a route.
pub struct ProcessedContract {
    validated: ValidatedContract,
}

impl ProcessedContract {
    pub fn new(validated: ValidatedContract) -> Self {
        ProcessedContract { validated }
    }

    pub fn contract(&self) -> &Arc<Contract> {
        self.validated.contract()
    }

    /// Route template for the transport layer.
    pub fn route(&self) -> String {
        format!("/api/{}", self.contract().name)
    }

    pub async fn handle(
        &self,
        body: JsonValue,
        id: Option<String>,
        user: AuthInput,
    ) -> HandleResponse {
        let contract = self.contract();

        if contract.authentication.requires_login() {
            if user.sub.is_none() {
                return HandleResponse::from_error(ErrorEnvelope {
                    error_type: "unauthorized".to_string(),
                    data: json!({ "id": id }),
                    status: 401,
                    errors: vec![json!("Only logged in users can do this")],
                });
            }
            if let AuthPolicy::Roles { roles, .. } = &contract.authentication {
                let has_permission =
                    user.permissions.iter().any(|p| roles.iter().any(|r| r == p));
                // With an owner marker the per-record gate may still admit
                // the caller, so only reject outright when neither applies.
                if !has_permission && !contract.manage_fields.created_by {
                    return HandleResponse::from_error(ErrorEnvelope {
                        error_type: "forbidden".to_string(),
                        data: json!({ "id": id }),
                        status: 403,
                        errors: vec![json!("You don't have permission to do this")],
                    });
                }
            }
        }

        let mut body = if body.is_null() { json!({}) } else { body };
        if let Some(id) = &id {
            match body.get("id") {
                Some(in_body) if in_body != &json!(id) => {
                    return HandleResponse::from_error(ErrorEnvelope {
                        error_type: "id mismatch".to_string(),
                        data: json!({ "query": body, "id": id }),
                        status: 400,
                        errors: vec![json!(
                            "Mismatch between the object Id in the body and the URL"
                        )],
                    });
                }
                Some(_) => {}
                None => {
                    if let Some(object) = body.as_object_mut() {
                        object.insert("id".to_string(), json!(id));
                    }
                }
            }
        }

        match self.validated.handle(body, user).await {
            Err(fault) => {
                tracing::warn!(contract = %contract.name, error = %fault, "unexpected fault");
                HandleResponse::from_error(exception_envelope(&fault, json!({ "id": id })))
            }
            Ok(CrudResult::Error(envelope)) => HandleResponse::from_error(envelope),
            Ok(CrudResult::Success(success)) => {
                let status = contract.method.success_status();

                // A by-id call returns the record itself, not a one-element list.
                if id.is_some() {
                    if let JsonValue::Array(items) = &success.result {
                        if items.len() > 1 {
                            tracing::warn!(
                                contract = %contract.name,
                                "results contained more than one entry for single return by id"
                            );
                        }
                        return HandleResponse {
                            status,
                            body: items.first().cloned().unwrap_or(JsonValue::Null),
                        };
                    }
                }

                // Paginated listings keep the envelope so the cursor survives
                // the transport layer; everything else returns the bare result.
                let body = if success.cursor.is_some() || success.more.is_some() {
                    serde_json::to_value(&success).unwrap_or(JsonValue::Null)
                } else {
                    success.result
                };
                HandleResponse { status, body }
            }
        }
    }
}
