use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::Response};
use serde_json::json;

use crate::app::dto;
use crate::app::errors::{json_error, json_ok, respond};
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

/// Liveness plus store connectivity.
pub async fn health(Extension(services): Extension<Arc<AppServices>>) -> Response {
    match services.store.ping().await {
        Ok(()) => json_ok(StatusCode::OK, "ok", json!({ "store": "up" })),
        Err(e) => {
            tracing::error!(error = %e, "health check failed");
            json_error(StatusCode::SERVICE_UNAVAILABLE, "internal_error", "store unavailable")
        }
    }
}

pub async fn me(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
) -> Response {
    let result = services.accounts.current_account(ctx.principal()).await;
    respond(result, services.expose_internal, |account| {
        json_ok(StatusCode::OK, "profile retrieved", json!({ "user": dto::account_to_json(&account) }))
    })
}
