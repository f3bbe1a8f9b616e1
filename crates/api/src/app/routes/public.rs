//! Anonymous access to published forms.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Extension, Path},
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::{get, post},
    Router,
};
use serde_json::json;

use crate::app::dto::{self, ApiJson};
use crate::app::errors::{json_ok, respond};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/forms", get(published_forms))
        .route("/forms/submit", post(submit))
        .route("/forms/:token", get(published_form))
}

pub async fn published_forms(Extension(services): Extension<Arc<AppServices>>) -> Response {
    let result = services.forms.list_public().await;
    respond(result, services.expose_internal, |forms| {
        json_ok(StatusCode::OK, "forms retrieved", json!({ "forms": forms }))
    })
}

pub async fn published_form(
    Extension(services): Extension<Arc<AppServices>>,
    Path(token): Path<String>,
) -> Response {
    let result = services.forms.get_public(&token).await;
    respond(result, services.expose_internal, |form| {
        json_ok(StatusCode::OK, "form retrieved", json!({ "form": form }))
    })
}

pub async fn submit(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    ApiJson(body): ApiJson<dto::PublicSubmitRequest>,
) -> Response {
    let meta = dto::submission_meta(&headers, peer);
    let result = services
        .submissions
        .submit_public(&body.public_token, body.answers, body.email, meta)
        .await;
    respond(result, services.expose_internal, |submission| {
        json_ok(
            StatusCode::CREATED,
            "submission received",
            json!({ "submissionId": submission.id.to_string() }),
        )
    })
}
