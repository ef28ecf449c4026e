//! Authentication domain models.
//!
//! These are internal domain models, distinct from the HTTP DTOs in
//! `tokenward_api` (which own request parsing and cookie delivery).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::uuid::uuidv7;

/// Lifecycle state of a refresh token at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTokenState {
    Active,
    /// Revocation timestamp set by rotation or explicit revoke. Terminal.
    Revoked,
    /// Past expiration without ever being revoked. Terminal, never written.
    Expired,
}

/// One entry of a principal's rotation chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    /// Opaque token value; unique across all principals.
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// `None` until the record is rotated away or revoked.
    pub revoked_at: Option<DateTime<Utc>>,
}

impl RefreshTokenRecord {
    /// State of the record at `now`. Revocation wins over expiry.
    pub fn state_at(&self, now: DateTime<Utc>) -> RefreshTokenState {
        if self.revoked_at.is_some() {
            RefreshTokenState::Revoked
        } else if now >= self.expires_at {
            RefreshTokenState::Expired
        } else {
            RefreshTokenState::Active
        }
    }

    /// Not revoked and not yet expired at `now`.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.state_at(now) == RefreshTokenState::Active
    }

    pub fn is_active(&self) -> bool {
        self.is_active_at(Utc::now())
    }
}

/// A user identity as seen by the token core.
///
/// Store-specific columns (normalized names, concurrency stamps, etc.) are the
/// store's concern and never appear here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// Opaque hash produced by the credential verifier.
    pub password_hash: Option<String>,
    pub roles: Vec<String>,
    /// Additional claims copied into every access token.
    pub claims: BTreeMap<String, String>,
    /// Chronological rotation chain (insertion order).
    pub refresh_tokens: Vec<RefreshTokenRecord>,
}

impl Principal {
    /// Create a principal with a fresh id and an empty token chain.
    pub fn new(username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: uuidv7(),
            username: username.into(),
            email: email.into(),
            first_name: String::new(),
            last_name: String::new(),
            password_hash: None,
            roles: Vec::new(),
            claims: BTreeMap::new(),
            refresh_tokens: Vec::new(),
        }
    }

    pub fn with_names(mut self, first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        self.first_name = first_name.into();
        self.last_name = last_name.into();
        self
    }

    /// First active record in the chain at `now`, if any.
    pub fn active_refresh_token_at(&self, now: DateTime<Utc>) -> Option<&RefreshTokenRecord> {
        self.refresh_tokens.iter().find(|r| r.is_active_at(now))
    }

    pub fn refresh_token(&self, token: &str) -> Option<&RefreshTokenRecord> {
        self.refresh_tokens.iter().find(|r| r.token == token)
    }

    pub(crate) fn refresh_token_mut(&mut self, token: &str) -> Option<&mut RefreshTokenRecord> {
        self.refresh_tokens.iter_mut().find(|r| r.token == token)
    }
}

/// JWT claims embedded in access tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (username).
    pub sub: String,
    /// Unique token id; differs on every issuance.
    pub jti: String,
    pub email: String,
    /// One entry per role held at issuance.
    #[serde(default)]
    pub role: Vec<String>,
    pub iss: String,
    pub aud: String,
    /// Expiry (unix timestamp).
    pub exp: i64,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Custom claims attached to the principal.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Outcome envelope for every public authentication operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationResult {
    /// Populated only on failure.
    pub message: String,
    pub username: String,
    pub email: String,
    pub is_authenticated: bool,
    /// Signed access token.
    pub token: String,
    pub roles: Vec<String>,
    /// Delivered out of band (cookie), never in the response body.
    #[serde(skip)]
    pub refresh_token: Option<String>,
    pub refresh_token_expiration: Option<DateTime<Utc>>,
}

impl AuthenticationResult {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn success(
        principal: &Principal,
        roles: Vec<String>,
        token: String,
        refresh: &RefreshTokenRecord,
    ) -> Self {
        Self {
            message: String::new(),
            username: principal.username.clone(),
            email: principal.email.clone(),
            is_authenticated: true,
            token,
            roles,
            refresh_token: Some(refresh.token.clone()),
            refresh_token_expiration: Some(refresh.expires_at),
        }
    }
}
