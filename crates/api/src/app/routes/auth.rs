//! Sign-up, sign-in and password reset. All routes here are public.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::Response,
    routing::post,
    Router,
};
use serde_json::json;

use formhub_infra::services::{OwnerSignup, Session, StandaloneSignup};

use crate::app::dto::{self, ApiJson};
use crate::app::errors::{json_ok, respond};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/auth/tenant/signup", post(tenant_signup))
        .route("/auth/tenant/login", post(tenant_login))
        .route("/auth/user/login", post(managed_login))
        .route("/auth/public-form/login", post(public_form_login))
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/google-login", post(google_login))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password", post(reset_password))
}

fn session(status: StatusCode, message: &'static str) -> impl FnOnce(Session) -> Response {
    move |session| json_ok(status, message, dto::session_to_json(&session))
}

pub async fn tenant_signup(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<dto::TenantSignupRequest>,
) -> Response {
    let result = services
        .accounts
        .register_tenant_owner(OwnerSignup {
            username: body.username,
            email: body.email,
            password: body.password,
            password_confirm: body.password_confirm,
        })
        .await;
    respond(result, services.expose_internal, session(StatusCode::CREATED, "tenant registered"))
}

pub async fn tenant_login(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<dto::LoginRequest>,
) -> Response {
    let result = services.accounts.login_tenant_owner(&body.email, &body.password).await;
    respond(result, services.expose_internal, session(StatusCode::OK, "login successful"))
}

pub async fn managed_login(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<dto::LoginRequest>,
) -> Response {
    let result = services.accounts.login_managed_user(&body.email, &body.password).await;
    respond(result, services.expose_internal, session(StatusCode::OK, "login successful"))
}

pub async fn public_form_login(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<dto::PublicLinkLoginRequest>,
) -> Response {
    let result = services
        .accounts
        .login_via_public_link(&body.public_form_token, &body.email, &body.password)
        .await;
    respond(result, services.expose_internal, session(StatusCode::OK, "login successful"))
}

pub async fn register(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<dto::RegisterRequest>,
) -> Response {
    let result = services
        .accounts
        .register_standalone(StandaloneSignup {
            name: body.name,
            email: body.email,
            password: body.password,
            password_confirm: body.password_confirm,
        })
        .await;
    respond(result, services.expose_internal, session(StatusCode::CREATED, "registration successful"))
}

pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<dto::LoginRequest>,
) -> Response {
    let result = services.accounts.login_standalone(&body.email, &body.password).await;
    respond(result, services.expose_internal, session(StatusCode::OK, "login successful"))
}

pub async fn google_login(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<dto::ExternalLoginRequest>,
) -> Response {
    let result = services.accounts.login_external(&body.external_token).await;
    respond(result, services.expose_internal, session(StatusCode::OK, "login successful"))
}

pub async fn forgot_password(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<dto::ForgotPasswordRequest>,
) -> Response {
    let result = services.accounts.request_password_reset(&body.email).await;
    let message = services.accounts.reset_requested_message();
    respond(result, services.expose_internal, |()| json_ok(StatusCode::OK, message, json!({})))
}

pub async fn reset_password(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<dto::ResetPasswordRequest>,
) -> Response {
    let result = services
        .accounts
        .confirm_password_reset(&body.token, &body.password, body.password_confirm.as_deref())
        .await;
    respond(result, services.expose_internal, |()| {
        json_ok(StatusCode::OK, "password has been reset", json!({}))
    })
}
