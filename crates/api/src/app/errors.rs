//! Response envelope and error mapping.
//!
//! Success: `{ "success": true, "message": ..., ...payload }`.
//! Failure: `{ "success": false, "message": ..., "error": code }`.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::{Value, json};

use formhub_core::{DomainError, DomainResult};

pub fn status_for(err: &DomainError) -> StatusCode {
    match err {
        DomainError::Validation(_) | DomainError::LimitExceeded(_) => StatusCode::BAD_REQUEST,
        DomainError::Auth(_) => StatusCode::UNAUTHORIZED,
        DomainError::Forbidden(_) => StatusCode::FORBIDDEN,
        DomainError::NotFound(_) => StatusCode::NOT_FOUND,
        DomainError::Conflict(_) => StatusCode::CONFLICT,
        DomainError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Map a domain error to the failure envelope.
///
/// Internal failures are logged in full; their detail reaches the client only
/// when `expose_internal` is set.
pub fn domain_error_to_response(err: DomainError, expose_internal: bool) -> axum::response::Response {
    let status = status_for(&err);
    let message = match &err {
        DomainError::NotFound(what) => format!("{what} not found"),
        DomainError::Internal(detail) => {
            tracing::error!(%detail, "request failed");
            if expose_internal {
                format!("internal error: {detail}")
            } else {
                "internal server error".to_string()
            }
        }
        other => {
            if status == StatusCode::FORBIDDEN {
                tracing::warn!(reason = other.detail(), "access denied");
            }
            other.detail().to_string()
        }
    };
    json_error(status, err.code(), message)
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "success": false,
            "message": message.into(),
            "error": code,
        })),
    )
        .into_response()
}

/// Success envelope. Object payloads are merged into the top level.
pub fn json_ok(status: StatusCode, message: impl Into<String>, payload: Value) -> axum::response::Response {
    let mut body = serde_json::Map::new();
    body.insert("success".into(), Value::Bool(true));
    body.insert("message".into(), Value::String(message.into()));
    if let Value::Object(fields) = payload {
        body.extend(fields);
    }
    (status, axum::Json(Value::Object(body))).into_response()
}

/// Render a service result, mapping failures through [`domain_error_to_response`].
pub fn respond<T>(
    result: DomainResult<T>,
    expose_internal: bool,
    ok: impl FnOnce(T) -> axum::response::Response,
) -> axum::response::Response {
    match result {
        Ok(value) => ok(value),
        Err(e) => domain_error_to_response(e, expose_internal),
    }
}
