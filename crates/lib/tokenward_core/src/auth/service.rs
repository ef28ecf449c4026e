//! Authentication orchestration: login, registration, refresh and revoke.
//!
//! Business failures (bad input, bad credentials, bad refresh token) come back
//! as an unauthenticated [`AuthenticationResult`] carrying a message that is
//! safe to show. Only infrastructure failures surface as `Err`.

use std::sync::Arc;

use tracing::{error, info};

use super::jwt::AccessTokenIssuer;
use super::lifecycle::RefreshTokenLifecycle;
use super::password::CredentialVerifier;
use super::{AuthError, AuthResult, INVALID_CREDENTIALS_MESSAGE, LookupError};
use crate::config::AuthConfig;
use crate::models::auth::{AuthenticationResult, Principal};
use crate::store::{PrincipalStore, StoreError};

/// Role granted to every newly registered principal.
pub const DEFAULT_ROLE: &str = "User";

/// Input for [`AuthService::register`].
#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub password: String,
    pub email: String,
}

/// Coordinates the credential verifier, principal store, lifecycle manager
/// and access token issuer.
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn PrincipalStore>,
    credentials: Arc<dyn CredentialVerifier>,
    issuer: AccessTokenIssuer,
    lifecycle: RefreshTokenLifecycle,
}

impl AuthService {
    /// Fails with `ConfigurationError` when the signing key is unusable.
    pub fn new(
        config: &AuthConfig,
        store: Arc<dyn PrincipalStore>,
        credentials: Arc<dyn CredentialVerifier>,
    ) -> AuthResult<Self> {
        Ok(Self {
            issuer: AccessTokenIssuer::new(config)?,
            lifecycle: RefreshTokenLifecycle::new(store.clone(), config),
            store,
            credentials,
        })
    }

    pub fn issuer(&self) -> &AccessTokenIssuer {
        &self.issuer
    }

    pub fn lifecycle(&self) -> &RefreshTokenLifecycle {
        &self.lifecycle
    }

    /// Authenticate with email + password.
    pub async fn login(&self, email: &str, password: &str) -> AuthResult<AuthenticationResult> {
        settle("login", self.try_login(email, password).await)
    }

    /// Register a new principal with the default role.
    pub async fn register(&self, registration: &Registration) -> AuthResult<AuthenticationResult> {
        settle("register", self.try_register(registration).await)
    }

    /// Exchange a refresh token for a new access token and a new refresh token.
    pub async fn refresh_token(&self, token: &str) -> AuthResult<AuthenticationResult> {
        settle("refresh", self.try_refresh(token).await)
    }

    /// Revoke a refresh token. `false` for unknown or inactive tokens.
    pub async fn revoke_token(&self, token: &str) -> AuthResult<bool> {
        match self.lifecycle.revoke(token).await {
            Ok(()) => Ok(true),
            Err(AuthError::TokenError(_)) => Ok(false),
            Err(e) => {
                error!(error = %e, "revoke failed");
                Err(e)
            }
        }
    }

    /// Sign an access token for `principal` with its current roles.
    pub async fn create_token(&self, principal: &Principal) -> AuthResult<(String, Vec<String>)> {
        let roles = self.store.get_roles(principal).await?;
        let token = self.issuer.issue(principal, &roles, &principal.claims)?;
        Ok((token, roles))
    }

    async fn try_login(&self, email: &str, password: &str) -> AuthResult<AuthenticationResult> {
        if email.is_empty() || password.is_empty() {
            return Err(invalid_credentials());
        }

        let mut principal = self
            .store
            .find_by_email(email)
            .await?
            .ok_or_else(invalid_credentials)?;

        if !self.credentials.check_password(&principal, password)? {
            return Err(invalid_credentials());
        }

        let (token, roles) = self.create_token(&principal).await?;
        let refresh = self
            .lifecycle
            .issue_first_or_reuse_active(&mut principal)
            .await?;

        info!(user = %principal.username, "login succeeded");
        Ok(AuthenticationResult::success(&principal, roles, token, &refresh))
    }

    async fn try_register(&self, registration: &Registration) -> AuthResult<AuthenticationResult> {
        if registration.email.is_empty()
            || registration.username.is_empty()
            || registration.password.is_empty()
        {
            return Err(AuthError::ValidationError(
                "Username, email and password are required!".into(),
            ));
        }

        if self.store.find_by_email(&registration.email).await?.is_some() {
            return Err(AuthError::CredentialError(
                "Email is already registered!".into(),
            ));
        }
        if self
            .store
            .find_by_username(&registration.username)
            .await?
            .is_some()
        {
            return Err(AuthError::CredentialError(
                "Username is already registered!".into(),
            ));
        }

        self.credentials
            .validate_password_policy(&registration.password)
            .map_err(|errors| AuthError::ValidationError(errors.join(" ")))?;

        let mut principal = Principal::new(&registration.username, &registration.email)
            .with_names(&registration.first_name, &registration.last_name);
        principal.password_hash = Some(self.credentials.hash_password(&registration.password)?);

        match self.store.create(&principal).await {
            Ok(()) => {}
            Err(StoreError::Duplicate(message)) => return Err(AuthError::CredentialError(message)),
            Err(e) => return Err(e.into()),
        }

        let refresh = self.lifecycle.issue_and_append(&mut principal).await?;
        self.store.add_role(&principal, DEFAULT_ROLE).await?;
        let (token, roles) = self.create_token(&principal).await?;

        info!(user = %principal.username, "registered principal");
        Ok(AuthenticationResult::success(&principal, roles, token, &refresh))
    }

    async fn try_refresh(&self, token: &str) -> AuthResult<AuthenticationResult> {
        if token.is_empty() {
            return Err(LookupError::TokenNotFound.into());
        }

        let (principal, refresh) = self.lifecycle.rotate(token).await?;
        let (access, roles) = self.create_token(&principal).await?;
        Ok(AuthenticationResult::success(&principal, roles, access, &refresh))
    }
}

fn invalid_credentials() -> AuthError {
    AuthError::CredentialError(INVALID_CREDENTIALS_MESSAGE.into())
}

/// Turn disclosable failures into unauthenticated results; log the rest.
fn settle(
    operation: &str,
    result: AuthResult<AuthenticationResult>,
) -> AuthResult<AuthenticationResult> {
    match result {
        Ok(result) => Ok(result),
        Err(e) if e.is_disclosable() => Ok(AuthenticationResult::failure(e.public_message())),
        Err(e) => {
            error!(operation, error = %e, "authentication operation failed");
            Err(e)
        }
    }
}
