//! Authentication request handlers.

use axum::body::Bytes;
use axum::extract::{Extension, State};
use axum::Json;
use axum_extra::extract::cookie::CookieJar;
use tokenward_core::auth::service::Registration;
use tokenward_core::models::auth::{AuthenticationResult, TokenClaims};
use tracing::debug;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{LoginRequest, MessageResponse, RegisterRequest, RevokeRequest};
use crate::services::cookies::{refresh_cookie, refresh_token_from};

/// Turn a service result into a response, setting the refresh cookie when a
/// refresh token is present.
fn respond(
    state: &AppState,
    jar: CookieJar,
    result: AuthenticationResult,
) -> AppResult<(CookieJar, Json<AuthenticationResult>)> {
    if !result.is_authenticated {
        return Err(AppError::AuthenticationFailed(result.message));
    }

    let jar = match (&result.refresh_token, result.refresh_token_expiration) {
        (Some(token), Some(expires_at)) if !token.is_empty() => {
            jar.add(refresh_cookie(token, expires_at, state.config.cookie_secure))
        }
        _ => jar,
    };
    Ok((jar, Json(result)))
}

/// `POST /api/authentication/login`: authenticate with email + password.
pub async fn login_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> AppResult<(CookieJar, Json<AuthenticationResult>)> {
    let result = state.auth.login(&body.email, &body.password).await?;
    respond(&state, jar, result)
}

/// `POST /api/authentication/register`: create a new principal.
pub async fn register_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<RegisterRequest>,
) -> AppResult<(CookieJar, Json<AuthenticationResult>)> {
    let registration = Registration {
        first_name: body.first_name,
        last_name: body.last_name,
        username: body.username,
        password: body.password,
        email: body.email,
    };
    let result = state.auth.register(&registration).await?;
    respond(&state, jar, result)
}

/// `GET /api/authentication/refresh`: rotate the refresh token in the cookie.
pub async fn refresh_handler(
    State(state): State<AppState>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Json<AuthenticationResult>)> {
    let token = refresh_token_from(&jar)
        .ok_or_else(|| AppError::AuthenticationFailed("Invalid client request".into()))?;

    let result = state.auth.refresh_token(&token).await?;
    respond(&state, jar, result)
}

/// `POST /api/authentication/revoke`: revoke the token in the body, or the
/// cookie when the body carries none.
pub async fn revoke_handler(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> AppResult<Json<MessageResponse>> {
    let request: RevokeRequest = if body.is_empty() {
        RevokeRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::Validation(format!("invalid request body: {e}")))?
    };

    let token = request
        .refresh_token
        .filter(|t| !t.is_empty())
        .or_else(|| refresh_token_from(&jar))
        .ok_or_else(|| AppError::Validation("Token is required".into()))?;

    if !state.auth.revoke_token(&token).await? {
        debug!("revoke rejected");
        return Err(AppError::AuthenticationFailed("Invalid client request".into()));
    }

    Ok(Json(MessageResponse {
        message: "Token revoked".into(),
    }))
}

/// `GET /api/authentication/me`: claims of the presented access token.
pub async fn me_handler(Extension(user): Extension<AuthenticatedUser>) -> Json<TokenClaims> {
    Json(user.0)
}
