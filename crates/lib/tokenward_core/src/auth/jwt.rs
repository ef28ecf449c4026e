//! Access token issuance and verification.

use std::collections::BTreeMap;

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use super::{AuthError, AuthResult};
use crate::config::AuthConfig;
use crate::models::auth::{Principal, TokenClaims};

/// Claim names owned by the issuer; custom claims never override them.
const RESERVED_CLAIMS: &[&str] = &["sub", "jti", "email", "role", "iss", "aud", "exp", "iat", "nbf"];

/// Signs short-lived HS256 bearer tokens.
///
/// Construction validates the configuration, so a bad key fails at startup
/// instead of on the first request.
#[derive(Clone)]
pub struct AccessTokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    lifetime: Duration,
}

impl AccessTokenIssuer {
    pub fn new(config: &AuthConfig) -> AuthResult<Self> {
        config.validate()?;
        Ok(Self {
            encoding: EncodingKey::from_secret(&config.signing_key),
            decoding: DecodingKey::from_secret(&config.signing_key),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            lifetime: Duration::minutes(config.access_token_minutes),
        })
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Build the claim set for `principal` without signing it.
    pub fn claims_for(
        &self,
        principal: &Principal,
        roles: &[String],
        custom_claims: &BTreeMap<String, String>,
    ) -> TokenClaims {
        let now = Utc::now();
        let extra = custom_claims
            .iter()
            .filter(|(name, _)| !RESERVED_CLAIMS.contains(&name.as_str()))
            .map(|(name, value)| (name.clone(), serde_json::Value::String(value.clone())))
            .collect();

        TokenClaims {
            sub: principal.username.clone(),
            jti: Uuid::new_v4().to_string(),
            email: principal.email.clone(),
            role: roles.to_vec(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            exp: (now + self.lifetime).timestamp(),
            iat: now.timestamp(),
            extra,
        }
    }

    /// Generate a signed access token for `principal` holding `roles`.
    pub fn issue(
        &self,
        principal: &Principal,
        roles: &[String],
        custom_claims: &BTreeMap<String, String>,
    ) -> AuthResult<String> {
        let claims = self.claims_for(principal, roles, custom_claims);
        self.sign(&claims)
    }

    pub(crate) fn sign(&self, claims: &TokenClaims) -> AuthResult<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| AuthError::Internal(format!("jwt encode: {e}")))
    }

    /// Verify signature, issuer, audience and expiry (no leeway).
    pub fn verify(&self, token: &str) -> Option<TokenClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);
        decode::<TokenClaims>(token, &self.decoding, &validation)
            .ok()
            .map(|data| data.claims)
    }
}
