use axum::{
    Extension, Router,
    extract::DefaultBodyLimit,
    middleware,
    response::Redirect,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::security::{
    self,
    auth::{DEFAULT_REDIRECT, require_login},
    rate_limit::TrustedProxies,
};
use crate::state::AppState;

pub mod account;
pub mod auth;
pub mod notes;

pub fn create_router(proxies: TrustedProxies) -> Router {
    tracing::debug!("Creating application router");

    let protected = Router::new()
        .merge(notes::router())
        .merge(account::router())
        .route("/logout/", post(auth::logout))
        .route_layer(middleware::from_fn(require_login));

    Router::new()
        .route("/", get(|| async { Redirect::to(DEFAULT_REDIRECT) }))
        .merge(auth::router(proxies))
        .merge(protected)
}

/// The complete application: routes plus the layers every request passes through.
pub fn app(state: AppState) -> Router {
    create_router(state.trusted_proxies.clone())
        .layer(middleware::from_fn(security::headers::set_security_headers))
        .layer(DefaultBodyLimit::max(security::form::MAX_BODY_SIZE_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(state))
}
