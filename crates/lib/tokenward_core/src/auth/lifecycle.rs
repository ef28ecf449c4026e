//! Refresh token lifecycle: issuance, rotation and revocation.
//!
//! Each record moves from Active to either Revoked (rotation or explicit
//! revoke) or Expired (time passing). Both are terminal. A principal holds at
//! most one active record once rotation has begun.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::refresh::{RefreshTokenGenerator, timestamp_now};
use super::{AuthResult, LookupError};
use crate::config::AuthConfig;
use crate::models::auth::{Principal, RefreshTokenRecord};
use crate::store::PrincipalStore;

/// Owns the rotation/revocation state machine over a [`PrincipalStore`].
#[derive(Clone)]
pub struct RefreshTokenLifecycle {
    store: Arc<dyn PrincipalStore>,
    generator: RefreshTokenGenerator,
}

impl RefreshTokenLifecycle {
    pub fn new(store: Arc<dyn PrincipalStore>, config: &AuthConfig) -> Self {
        Self {
            store,
            generator: RefreshTokenGenerator::new(config.refresh_token_days),
        }
    }

    /// Login path: hand back the principal's active record unchanged, or
    /// append and persist a new one when none is active. The store re-checks
    /// under its own lock, so a rotation that lands first is honoured.
    pub async fn issue_first_or_reuse_active(
        &self,
        principal: &mut Principal,
    ) -> AuthResult<RefreshTokenRecord> {
        if let Some(active) = principal.active_refresh_token_at(Utc::now()) {
            debug!(principal_id = %principal.id, "reusing active refresh token");
            return Ok(active.clone());
        }

        let candidate = self.generator.generate();
        let record = self
            .store
            .append_refresh_token_unless_active(principal.id, &candidate, timestamp_now())
            .await?;

        if record.token == candidate.token {
            debug!(principal_id = %principal.id, expires_at = %record.expires_at, "issued refresh token");
        } else {
            debug!(principal_id = %principal.id, "reusing refresh token held by the store");
        }
        if principal.refresh_token(&record.token).is_none() {
            principal.refresh_tokens.push(record.clone());
        }
        Ok(record)
    }

    /// Registration path: unconditionally append and persist a new record.
    pub async fn issue_and_append(
        &self,
        principal: &mut Principal,
    ) -> AuthResult<RefreshTokenRecord> {
        let record = self.generator.generate();
        self.store.append_refresh_token(principal.id, &record).await?;
        principal.refresh_tokens.push(record.clone());
        debug!(principal_id = %principal.id, expires_at = %record.expires_at, "issued refresh token");
        Ok(record)
    }

    /// Exchange an active token for a new one. Revocation of the presented
    /// token and the append of its successor are one store operation; a
    /// replayed token fails with [`LookupError::TokenInactive`].
    pub async fn rotate(&self, token: &str) -> AuthResult<(Principal, RefreshTokenRecord)> {
        let located = self.locate_active(token).await?;

        let next = self.generator.generate();
        let Some(owner) = self
            .store
            .rotate_refresh_token(token, &next, timestamp_now())
            .await?
        else {
            warn!(principal_id = %located.id, "refresh token rotated concurrently");
            return Err(LookupError::TokenInactive.into());
        };

        let principal = self
            .store
            .find_by_id(owner)
            .await?
            .ok_or(LookupError::TokenNotFound)?;

        info!(principal_id = %principal.id, "rotated refresh token");
        Ok((principal, next))
    }

    /// Revoke an active token without issuing a replacement.
    pub async fn revoke(&self, token: &str) -> AuthResult<()> {
        let principal = self.locate_active(token).await?;

        if !self.store.revoke_refresh_token(token, timestamp_now()).await? {
            warn!(principal_id = %principal.id, "refresh token revoked concurrently");
            return Err(LookupError::TokenInactive.into());
        }

        info!(principal_id = %principal.id, "revoked refresh token");
        Ok(())
    }

    /// Find the owner of `token` and check the record is still active.
    async fn locate_active(&self, token: &str) -> AuthResult<Principal> {
        let principal = self
            .store
            .find_by_refresh_token(token)
            .await?
            .ok_or(LookupError::TokenNotFound)?;

        let record = principal
            .refresh_token(token)
            .ok_or(LookupError::TokenNotFound)?;

        if !record.is_active() {
            warn!(
                principal_id = %principal.id,
                state = ?record.state_at(Utc::now()),
                "inactive refresh token presented"
            );
            return Err(LookupError::TokenInactive.into());
        }
        Ok(principal)
    }
}
