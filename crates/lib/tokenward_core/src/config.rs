//! Token configuration.
//!
//! Built once at startup and passed by value into the issuer and lifecycle
//! manager. A missing or malformed signing key is fatal.

use crate::auth::{AuthError, AuthResult};

/// Minimum signing key length for HS256 (256 bits).
pub const MIN_SIGNING_KEY_BYTES: usize = 32;

/// Default access token lifetime in minutes.
pub const DEFAULT_ACCESS_TOKEN_MINUTES: i64 = 15;

/// Default refresh token validity window in days.
pub const DEFAULT_REFRESH_TOKEN_DAYS: i64 = 10;

pub const DEFAULT_ISSUER: &str = "tokenward";
pub const DEFAULT_AUDIENCE: &str = "tokenward-clients";

/// Immutable token configuration.
#[derive(Clone)]
pub struct AuthConfig {
    /// Shared HMAC secret.
    pub signing_key: Vec<u8>,
    pub issuer: String,
    pub audience: String,
    pub access_token_minutes: i64,
    pub refresh_token_days: i64,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("signing_key", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("access_token_minutes", &self.access_token_minutes)
            .field("refresh_token_days", &self.refresh_token_days)
            .finish()
    }
}

impl AuthConfig {
    /// Config with defaults for everything but the key.
    pub fn new(signing_key: impl Into<Vec<u8>>) -> Self {
        Self {
            signing_key: signing_key.into(),
            issuer: DEFAULT_ISSUER.to_string(),
            audience: DEFAULT_AUDIENCE.to_string(),
            access_token_minutes: DEFAULT_ACCESS_TOKEN_MINUTES,
            refresh_token_days: DEFAULT_REFRESH_TOKEN_DAYS,
        }
    }

    /// Reads configuration from environment variables.
    ///
    /// | Variable                  | Default             |
    /// |---------------------------|---------------------|
    /// | `JWT_KEY` / `JWT_SECRET`  | required            |
    /// | `JWT_ISSUER`              | `tokenward`         |
    /// | `JWT_AUDIENCE`            | `tokenward-clients` |
    /// | `JWT_DURATION_MINUTES`    | `15`                |
    /// | `REFRESH_TOKEN_DAYS`      | `10`                |
    pub fn from_env() -> AuthResult<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Same as [`AuthConfig::from_env`] with an arbitrary variable source.
    pub fn from_vars<F>(var: F) -> AuthResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| var(name).filter(|v| !v.trim().is_empty());

        let signing_key = non_empty("JWT_KEY")
            .or_else(|| non_empty("JWT_SECRET"))
            .ok_or_else(|| {
                AuthError::ConfigurationError("JWT_KEY (or JWT_SECRET) must be set".into())
            })?;

        let mut config = Self::new(signing_key.into_bytes());
        if let Some(issuer) = non_empty("JWT_ISSUER") {
            config.issuer = issuer;
        }
        if let Some(audience) = non_empty("JWT_AUDIENCE") {
            config.audience = audience;
        }
        if let Some(minutes) = non_empty("JWT_DURATION_MINUTES") {
            config.access_token_minutes = parse_positive("JWT_DURATION_MINUTES", &minutes)?;
        }
        if let Some(days) = non_empty("REFRESH_TOKEN_DAYS") {
            config.refresh_token_days = parse_positive("REFRESH_TOKEN_DAYS", &days)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that could never sign or expire tokens correctly.
    pub fn validate(&self) -> AuthResult<()> {
        if self.signing_key.is_empty() {
            return Err(AuthError::ConfigurationError("signing key is empty".into()));
        }
        if self.signing_key.len() < MIN_SIGNING_KEY_BYTES {
            return Err(AuthError::ConfigurationError(format!(
                "signing key must be at least {MIN_SIGNING_KEY_BYTES} bytes, got {}",
                self.signing_key.len()
            )));
        }
        if self.issuer.is_empty() || self.audience.is_empty() {
            return Err(AuthError::ConfigurationError(
                "issuer and audience must be set".into(),
            ));
        }
        if self.access_token_minutes <= 0 || self.refresh_token_days <= 0 {
            return Err(AuthError::ConfigurationError(
                "token lifetimes must be positive".into(),
            ));
        }
        Ok(())
    }
}

fn parse_positive(name: &str, value: &str) -> AuthResult<i64> {
    match value.trim().parse::<i64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(AuthError::ConfigurationError(format!(
            "{name} must be a positive integer, got '{value}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    const KEY: &str = "0123456789abcdef0123456789abcdef";

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_only_key_is_set() {
        let config = AuthConfig::from_vars(vars(&[("JWT_KEY", KEY)])).unwrap();
        assert_eq!(config.issuer, DEFAULT_ISSUER);
        assert_eq!(config.audience, DEFAULT_AUDIENCE);
        assert_eq!(config.access_token_minutes, 15);
        assert_eq!(config.refresh_token_days, 10);
    }

    #[test]
    fn jwt_secret_is_accepted_as_fallback() {
        let config = AuthConfig::from_vars(vars(&[("JWT_SECRET", KEY)])).unwrap();
        assert_eq!(config.signing_key, KEY.as_bytes());
    }

    #[test]
    fn missing_key_is_a_configuration_error() {
        let err = AuthConfig::from_vars(vars(&[])).unwrap_err();
        assert!(matches!(err, AuthError::ConfigurationError(_)));
    }

    #[test]
    fn short_key_is_malformed() {
        let err = AuthConfig::from_vars(vars(&[("JWT_KEY", "short")])).unwrap_err();
        assert!(matches!(err, AuthError::ConfigurationError(_)));
    }

    #[test]
    fn durations_must_be_positive_integers() {
        let err = AuthConfig::from_vars(vars(&[("JWT_KEY", KEY), ("JWT_DURATION_MINUTES", "0")]))
            .unwrap_err();
        assert!(matches!(err, AuthError::ConfigurationError(_)));

        let err = AuthConfig::from_vars(vars(&[("JWT_KEY", KEY), ("REFRESH_TOKEN_DAYS", "ten")]))
            .unwrap_err();
        assert!(matches!(err, AuthError::ConfigurationError(_)));
    }

    #[test]
    fn debug_output_redacts_key() {
        let config = AuthConfig::new(KEY.as_bytes().to_vec());
        assert!(!format!("{config:?}").contains(KEY));
    }
}
