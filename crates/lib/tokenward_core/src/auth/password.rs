//! Password hashing via bcrypt and password policy checks.

use super::{AuthError, AuthResult};
use crate::models::auth::Principal;

/// bcrypt cost factor.
const BCRYPT_COST: u32 = 10;

/// Hash a password with bcrypt (cost 10).
pub fn hash_password(password: &str) -> AuthResult<String> {
    bcrypt::hash(password, BCRYPT_COST)
        .map_err(|e| AuthError::Internal(format!("bcrypt hash: {e}")))
}

/// Verify a password against a bcrypt hash.
pub fn verify_password(password: &str, hash: &str) -> AuthResult<bool> {
    bcrypt::verify(password, hash).map_err(|e| AuthError::Internal(format!("bcrypt verify: {e}")))
}

/// Verifies secrets and enforces the password policy.
pub trait CredentialVerifier: Send + Sync {
    fn hash_password(&self, secret: &str) -> AuthResult<String>;

    /// `false` for a wrong secret or a principal without a password.
    fn check_password(&self, principal: &Principal, secret: &str) -> AuthResult<bool>;

    /// Every violated rule, in a fixed order.
    fn validate_password_policy(&self, secret: &str) -> Result<(), Vec<String>>;
}

/// Password composition rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordPolicy {
    pub required_length: usize,
    pub require_non_alphanumeric: bool,
    pub require_digit: bool,
    pub require_lowercase: bool,
    pub require_uppercase: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            required_length: 8,
            require_non_alphanumeric: true,
            require_digit: true,
            require_lowercase: true,
            require_uppercase: true,
        }
    }
}

impl PasswordPolicy {
    /// Character classes are ASCII ranges, as in ASP.NET Core Identity's
    /// `PasswordValidator`, so `'ä'` counts as non alphanumeric.
    pub fn validate(&self, secret: &str) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if secret.chars().count() < self.required_length {
            errors.push(format!(
                "Passwords must be at least {} characters.",
                self.required_length
            ));
        }
        if self.require_non_alphanumeric && secret.chars().all(|c| c.is_ascii_alphanumeric()) {
            errors.push("Passwords must have at least one non alphanumeric character.".into());
        }
        if self.require_digit && !secret.chars().any(|c| c.is_ascii_digit()) {
            errors.push("Passwords must have at least one digit ('0'-'9').".into());
        }
        if self.require_lowercase && !secret.chars().any(|c| c.is_ascii_lowercase()) {
            errors.push("Passwords must have at least one lowercase ('a'-'z').".into());
        }
        if self.require_uppercase && !secret.chars().any(|c| c.is_ascii_uppercase()) {
            errors.push("Passwords must have at least one uppercase ('A'-'Z').".into());
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// bcrypt-backed [`CredentialVerifier`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BcryptCredentials {
    pub policy: PasswordPolicy,
}

impl BcryptCredentials {
    pub fn new(policy: PasswordPolicy) -> Self {
        Self { policy }
    }
}

impl CredentialVerifier for BcryptCredentials {
    fn hash_password(&self, secret: &str) -> AuthResult<String> {
        hash_password(secret)
    }

    fn check_password(&self, principal: &Principal, secret: &str) -> AuthResult<bool> {
        match &principal.password_hash {
            Some(hash) => verify_password(secret, hash),
            None => Ok(false),
        }
    }

    fn validate_password_policy(&self, secret: &str) -> Result<(), Vec<String>> {
        self.policy.validate(secret)
    }
}
