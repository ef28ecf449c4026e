//! Refresh-token cookie delivery.
//!
//! The refresh token never appears in a JSON body; it is set as an httpOnly
//! cookie that expires together with the token.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Utc};
use time::Duration;

/// Cookie name for the refresh token.
pub const REFRESH_COOKIE: &str = "refreshToken";

/// Build a httpOnly cookie for the refresh token, expiring at `expires_at`.
pub fn refresh_cookie(token: &str, expires_at: DateTime<Utc>, secure: bool) -> Cookie<'static> {
    let remaining = (expires_at - Utc::now()).num_seconds().max(0);
    Cookie::build((REFRESH_COOKIE.to_string(), token.to_string()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .path("/".to_string())
        .max_age(Duration::seconds(remaining))
        .build()
}

/// Refresh token presented by the client, if any.
pub fn refresh_token_from(jar: &CookieJar) -> Option<String> {
    jar.get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}
