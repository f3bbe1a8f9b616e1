//! Standalone-user forms: authoring, filling and amending.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Extension, Path},
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::{get, patch, post},
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
        .route("/", post(save_form).get(list_forms))
        .route("/submissions", get(my_submissions))
        .route("/submissions/:id", patch(amend_submission))
        .route("/:id", get(get_form).delete(delete_form))
        .route("/:id/submit", post(submit))
        .route("/:id/submissions", get(form_submissions))
}

/// Create, or update when the body carries a `formId`.
pub async fn save_form(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<dto::FormRequest>,
) -> Response {
    let (status, message) = match body.form_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => (StatusCode::OK, "form updated"),
        _ => (StatusCode::CREATED, "form created"),
    };
    let result = async {
        let form_id = match body.form_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => Some(dto::parse_id::<FormId>(id)?),
            _ => None,
        };
        services
            .forms
            .save_standalone(ctx.principal(), form_id, body.into_new_form())
            .await
    }
    .await;
    respond(result, services.expose_internal, |form| {
        json_ok(status, message, json!({ "form": form }))
    })
}

pub async fn list_forms(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
) -> Response {
    let result = services.forms.list_standalone_owned(ctx.principal()).await;
    respond(result, services.expose_internal, |forms| {
        json_ok(StatusCode::OK, "forms retrieved", json!({ "forms": forms }))
    })
}

pub async fn get_form(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let result = async {
        let id: FormId = dto::parse_id(&id)?;
        services.forms.get_standalone(ctx.principal(), id).await
    }
    .await;
    respond(result, services.expose_internal, |form| {
        json_ok(StatusCode::OK, "form retrieved", json!({ "form": form }))
    })
}

pub async fn delete_form(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let result = async {
        let id: FormId = dto::parse_id(&id)?;
        services.forms.delete_standalone(ctx.principal(), id).await
    }
    .await;
    respond(result, services.expose_internal, |removed| {
        json_ok(StatusCode::OK, "form deleted", json!({ "deletedSubmissions": removed }))
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
            .submit_standalone(ctx.principal(), id, body.answers, meta)
            .await
    }
    .await;
    respond(result, services.expose_internal, |submission| {
        json_ok(StatusCode::CREATED, "submission received", json!({ "submission": submission }))
    })
}

pub async fn form_submissions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let result = async {
        let id: FormId = dto::parse_id(&id)?;
        services.submissions.list_for_form(ctx.principal(), id).await
    }
    .await;
    respond(result, services.expose_internal, |submissions| {
        json_ok(StatusCode::OK, "submissions retrieved", json!({ "submissions": submissions }))
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

pub async fn amend_submission(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<dto::SubmitRequest>,
) -> Response {
    let result = async {
        let id: SubmissionId = dto::parse_id(&id)?;
        services.submissions.amend_mine(ctx.principal(), id, body.answers).await
    }
    .await;
    respond(result, services.expose_internal, |submission| {
        json_ok(StatusCode::OK, "submission updated", json!({ "submission": submission }))
    })
}
