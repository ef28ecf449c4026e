//! # tokenward_api
//!
//! HTTP transport for Tokenward: routes, cookie delivery of refresh tokens and
//! bearer-token middleware around [`tokenward_core::auth::AuthService`].

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use axum::{
    Router,
    routing::{get, post},
};
use tokenward_core::auth::AuthService;
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::handlers::auth;

/// Route paths.
pub mod routes {
    pub const POST_LOGIN: &str = "/api/authentication/login";
    pub const POST_REGISTER: &str = "/api/authentication/register";
    pub const GET_REFRESH: &str = "/api/authentication/refresh";
    pub const POST_REVOKE: &str = "/api/authentication/revoke";
    pub const GET_ME: &str = "/api/authentication/me";
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthService,
    pub config: ApiConfig,
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route(routes::POST_LOGIN, post(auth::login_handler))
        .route(routes::POST_REGISTER, post(auth::register_handler))
        .route(routes::GET_REFRESH, get(auth::refresh_handler))
        .route(routes::POST_REVOKE, post(auth::revoke_handler));

    let protected = Router::new()
        .route(routes::GET_ME, get(auth::me_handler))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
