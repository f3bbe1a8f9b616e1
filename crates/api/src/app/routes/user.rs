//! Managed-user surface: assigned forms and own submissions.

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

use formhub_core::{FormId, SubmissionId};

use crate::app::dto::{self, ApiJson};
use crate::app::errors::{json_ok, respond};
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/forms", get(assigned_forms))
        .route("/forms/:id", get(assigned_form))
        .route("/forms/:id/submit", post(submit))
        .route("/submissions", get(my_submissions))
        .route("/submissions/:id", get(my_submission))
}

pub async fn assigned_forms(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
) -> Response {
    let result = services.forms.list_assigned(ctx.principal()).await;
    respond(result, services.expose_internal, |forms| {
        json_ok(StatusCode::OK, "forms retrieved", json!({ "forms": forms }))
    })
}

pub async fn assigned_form(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let result = async {
        let id: FormId = dto::parse_id(&id)?;
        services.forms.get_assigned(ctx.principal(), id).await
    }
    .await;
    respond(result, services.expose_internal, |form| {
        json_ok(StatusCode::OK, "form retrieved", json!({ "form": form }))
    })
}

pub async fn submit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    ApiJson(body): ApiJson<dto::SubmitRequest>,
) -> Response {
    let meta = dto::submission_meta(&headers, peer);
    let result = async {
        let id: FormId = dto::parse_id(&id)?;
        services
            .submissions
            .submit_assigned(ctx.principal(), id, body.answers, meta)
            .await
    }
    .await;
    respond(result, services.expose_internal, |submission| {
        json_ok(StatusCode::CREATED, "submission received", json!({ "submission": submission }))
    })
}

pub async fn my_submissions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
) -> Response {
    let result = services.submissions.list_mine(ctx.principal()).await;
    respond(result, services.expose_internal, |submissions| {
        json_ok(StatusCode::OK, "submissions retrieved", json!({ "submissions": submissions }))
    })
}

pub async fn my_submission(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let result = async {
        let id: SubmissionId = dto::parse_id(&id)?;
        services.submissions.get_mine(ctx.principal(), id).await
    }
    .await;
    respond(result, services.expose_internal, |submission| {
        json_ok(StatusCode::OK, "submission retrieved", json!({ "submission": submission }))
    })
}
