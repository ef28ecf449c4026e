//! Token issuance and refresh-token lifecycle.
//!
//! Provides the secure refresh-token generator, the access token issuer, the
//! rotation/revocation state machine and the orchestrating [`AuthService`].

pub mod jwt;
pub mod lifecycle;
pub mod password;
pub mod refresh;
pub mod service;

use thiserror::Error;

use crate::store::StoreError;

pub use jwt::AccessTokenIssuer;
pub use lifecycle::RefreshTokenLifecycle;
pub use password::{BcryptCredentials, CredentialVerifier, PasswordPolicy};
pub use refresh::RefreshTokenGenerator;
pub use service::AuthService;

/// Public message for every refresh-token failure.
pub const INVALID_TOKEN_MESSAGE: &str = "Invalid token!";

/// Public message for every login failure.
pub const INVALID_CREDENTIALS_MESSAGE: &str = "Email or password is incorrect !";

/// Why a refresh-token lookup failed.
///
/// Both variants display identically so callers cannot tell an unknown token
/// from a replayed, revoked or expired one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("Invalid token!")]
    TokenNotFound,

    #[error("Invalid token!")]
    TokenInactive,
}

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("{0}")]
    CredentialError(String),

    #[error(transparent)]
    TokenError(#[from] LookupError),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Whether the message is safe to hand back to the caller.
    pub fn is_disclosable(&self) -> bool {
        matches!(
            self,
            AuthError::ValidationError(_) | AuthError::CredentialError(_) | AuthError::TokenError(_)
        )
    }

    /// Message shown to the caller for disclosable errors.
    pub fn public_message(&self) -> String {
        match self {
            AuthError::ValidationError(m) | AuthError::CredentialError(m) => m.clone(),
            AuthError::TokenError(_) => INVALID_TOKEN_MESSAGE.to_string(),
            _ => "Internal server error".to_string(),
        }
    }
}

pub type AuthResult<T> = Result<T, AuthError>;
