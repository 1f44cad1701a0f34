//! The result/error protocol shared by every backend and every caller.
//!
//! A call either succeeds with `{result, cursor?, more?}` or fails with
//! `{errorType, data, status, errors}`. On the wire the two are discriminated
//! by the presence of `errors`. Expected failures are always returned as
//! values; only unexpected faults travel as `anyhow::Error` and are caught
//! once, at the request-processor boundary.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

/// Success envelope. `cursor`/`more` are only populated by paginated listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Success {
    pub result: JsonValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub more: Option<bool>,
}

/// Error envelope. Carries the original request `data` for diagnostics and a
/// `status` suitable for direct transport-layer use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub error_type: String,
    pub data: JsonValue,
    pub status: u16,
    pub errors: Vec<JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CrudResult {
    Error(ErrorEnvelope),
    Success(Success),
}

impl CrudResult {
    pub fn ok(result: JsonValue) -> Self {
        CrudResult::Success(Success { result, cursor: None, more: None })
    }

    pub fn ok_page(result: JsonValue, cursor: Option<String>, more: bool) -> Self {
        CrudResult::Success(Success { result, cursor, more: Some(more) })
    }

    pub fn error(status: u16, error_type: &str, errors: Vec<JsonValue>, data: JsonValue) -> Self {
        CrudResult::Error(ErrorEnvelope {
            error_type: error_type.to_string(),
            data,
            status,
            errors,
        })
    }

    /// Malformed or disallowed request shape.
    pub fn bad_input(message: &str, data: JsonValue) -> Self {
        Self::error(400, "badInput", vec![json!(message)], data)
    }

    /// No identity where one is required.
    pub fn unauthorized(message: &str, data: JsonValue) -> Self {
        Self::error(401, "unauthorized", vec![json!(message)], data)
    }

    /// Identity present but denied by the role + ownership check.
    pub fn forbidden(data: JsonValue, errors: Vec<JsonValue>) -> Self {
        Self::error(403, "forbidden", errors, data)
    }

    pub fn not_found(data: JsonValue) -> Self {
        Self::error(404, "notFound", vec![json!("Key not found")], data)
    }

    /// Create collided with an existing key.
    pub fn conflict(data: JsonValue) -> Self {
        Self::error(409, "conflict", vec![json!("Resource already exists")], data)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, CrudResult::Error(_))
    }

    pub fn into_success(self) -> Option<Success> {
        match self {
            CrudResult::Success(s) => Some(s),
            CrudResult::Error(_) => None,
        }
    }
}

/// An error that carries an HTTP-ish status, raised by storage adapters for
/// remote-service failures. The request processor picks the status up via
/// downcast when normalizing uncaught faults.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct HandlingError {
    pub status: u16,
    pub message: String,
}

impl HandlingError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        HandlingError { status, message: message.into() }
    }
}

/// Clamps a status to the 400–599 range, defaulting to 500.
pub fn normalize_status(status: u16) -> u16 {
    if (400..600).contains(&status) {
        status
    } else {
        500
    }
}

/// Converts an uncaught fault into the generic `exception` error kind.
pub fn exception_envelope(err: &anyhow::Error, data: JsonValue) -> ErrorEnvelope {
    let status = err
        .downcast_ref::<HandlingError>()
        .map(|e| normalize_status(e.status))
        .unwrap_or(500);
    ErrorEnvelope {
        error_type: "exception".to_string(),
        data,
        status,
        errors: vec![json!(err.to_string())],
    }
}
