use axum::{routing::get, Router};

pub mod admin;
pub mod auth;
pub mod forms;
pub mod public;
pub mod system;
pub mod user;

/// Routes reachable without a session token.
pub fn public_router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .merge(auth::router())
        .nest("/public", public::router())
}

/// Routes behind the bearer-token middleware.
pub fn protected_router() -> Router {
    Router::new()
        .route("/auth/me", get(system::me))
        .nest("/admin", admin::router())
        .nest("/user", user::router())
        .nest("/forms", forms::router())
}
