//! Tenant-owner administration: managed users, forms and submissions.
//!
//! Role and ownership checks happen in the services; handlers only map
//! requests and responses.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Router,
};
use serde_json::json;

use formhub_core::{FormId, PrincipalId};

use crate::app::dto::{self, ApiJson};
use crate::app::errors::{json_ok, respond};
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/:id", get(get_user).delete(delete_user))
        .route("/users/:id/submissions", get(user_submissions))
        .route("/forms", get(list_forms).post(create_form))
        .route(
            "/forms/:id",
            get(get_form).put(update_form).patch(update_form).delete(delete_form),
        )
        .route("/forms/:id/publish", post(publish_form))
        .route("/forms/:id/assign-users", post(assign_users))
        .route("/forms/:id/submissions", get(form_submissions))
        .route("/submissions", get(tenant_submissions))
}

// ── Users ──

pub async fn list_users(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
) -> Response {
    let result = services.accounts.list_managed_users(ctx.principal()).await;
    respond(result, services.expose_internal, |users| {
        let users: Vec<_> = users.iter().map(dto::account_to_json).collect();
        json_ok(StatusCode::OK, "users retrieved", json!({ "users": users }))
    })
}

pub async fn create_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<dto::CreateUserRequest>,
) -> Response {
    let result = services.accounts.create_managed_user(ctx.principal(), body.into()).await;
    respond(result, services.expose_internal, |user| {
        json_ok(
            StatusCode::CREATED,
            "user created",
            json!({ "user": dto::account_to_json(&user) }),
        )
    })
}

pub async fn get_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let result = async {
        let id: PrincipalId = dto::parse_id(&id)?;
        services.accounts.get_managed_user(ctx.principal(), id).await
    }
    .await;
    respond(result, services.expose_internal, |user| {
        json_ok(StatusCode::OK, "user retrieved", json!({ "user": dto::account_to_json(&user) }))
    })
}

pub async fn delete_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let result = async {
        let id: PrincipalId = dto::parse_id(&id)?;
        services.accounts.delete_managed_user(ctx.principal(), id).await
    }
    .await;
    respond(result, services.expose_internal, |()| {
        json_ok(StatusCode::OK, "user deleted", json!({}))
    })
}

pub async fn user_submissions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let result = async {
        let id: PrincipalId = dto::parse_id(&id)?;
        services.submissions.list_for_user(ctx.principal(), id).await
    }
    .await;
    respond(result, services.expose_internal, |submissions| {
        json_ok(StatusCode::OK, "submissions retrieved", json!({ "submissions": submissions }))
    })
}

// ── Forms ──

pub async fn list_forms(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
) -> Response {
    let result = services.forms.list_owned(ctx.principal()).await;
    respond(result, services.expose_internal, |forms| {
        json_ok(StatusCode::OK, "forms retrieved", json!({ "forms": forms }))
    })
}

pub async fn create_form(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    ApiJson(body): ApiJson<dto::FormRequest>,
) -> Response {
    let result = services.forms.create(ctx.principal(), body.into_new_form()).await;
    respond(result, services.expose_internal, |form| {
        json_ok(StatusCode::CREATED, "form created", json!({ "form": form }))
    })
}

pub async fn get_form(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let result = async {
        let id: FormId = dto::parse_id(&id)?;
        services.forms.owned_form(ctx.principal(), id).await
    }
    .await;
    respond(result, services.expose_internal, |form| {
        json_ok(StatusCode::OK, "form retrieved", json!({ "form": form }))
    })
}

pub async fn update_form(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<dto::FormRequest>,
) -> Response {
    let result = async {
        let id: FormId = dto::parse_id(&id)?;
        services.forms.update(ctx.principal(), id, body.into_changes()).await
    }
    .await;
    respond(result, services.expose_internal, |form| {
        json_ok(StatusCode::OK, "form updated", json!({ "form": form }))
    })
}

pub async fn delete_form(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let result = async {
        let id: FormId = dto::parse_id(&id)?;
        services.forms.delete(ctx.principal(), id).await
    }
    .await;
    respond(result, services.expose_internal, |removed| {
        json_ok(
            StatusCode::OK,
            "form deleted",
            json!({ "deletedSubmissions": removed }),
        )
    })
}

pub async fn publish_form(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> Response {
    let result = async {
        let id: FormId = dto::parse_id(&id)?;
        services.forms.publish(ctx.principal(), id).await
    }
    .await;
    respond(result, services.expose_internal, |published| {
        json_ok(
            StatusCode::OK,
            "form published",
            json!({
                "publicToken": published.form.public_token,
                "publicUrl": published.public_url,
                "form": published.form,
            }),
        )
    })
}

pub async fn assign_users(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<dto::AssignUsersRequest>,
) -> Response {
    let result = async {
        let id: FormId = dto::parse_id(&id)?;
        let users: Vec<PrincipalId> = dto::parse_ids(&body.user_ids)?;
        services.forms.assign_users(ctx.principal(), id, users).await
    }
    .await;
    respond(result, services.expose_internal, |form| {
        json_ok(StatusCode::OK, "users assigned", json!({ "form": form }))
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

pub async fn tenant_submissions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(ctx): Extension<PrincipalContext>,
) -> Response {
    let result = services.submissions.list_for_tenant(ctx.principal()).await;
    respond(result, services.expose_internal, |submissions| {
        json_ok(StatusCode::OK, "submissions retrieved", json!({ "submissions": submissions }))
    })
}
