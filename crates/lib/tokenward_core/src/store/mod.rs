//! Principal persistence.
//!
//! The token core never talks to a database directly; it goes through
//! [`PrincipalStore`]. Two implementations ship with the crate: an in-memory
//! store for tests and single-process deployments, and a PostgreSQL store.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::auth::{Principal, RefreshTokenRecord};

pub use memory::MemoryPrincipalStore;
pub use postgres::PgPrincipalStore;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Duplicate(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Load/save capability over principals and their refresh-token chains.
///
/// Every method is a single atomic operation from the caller's perspective.
#[async_trait]
pub trait PrincipalStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Principal>>;

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Principal>>;

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<Principal>>;

    /// Indexed lookup: the unique principal whose chain contains `token`.
    async fn find_by_refresh_token(&self, token: &str) -> StoreResult<Option<Principal>>;

    /// Insert a new principal. Fails with [`StoreError::Duplicate`] when the
    /// email or username is taken.
    async fn create(&self, principal: &Principal) -> StoreResult<()>;

    /// Persist profile fields and the refresh-token chain. Records unknown to
    /// the store are appended; a revocation timestamp is never cleared.
    async fn update(&self, principal: &Principal) -> StoreResult<()>;

    /// Append `record` to the chain of principal `id`.
    async fn append_refresh_token(
        &self,
        id: Uuid,
        record: &RefreshTokenRecord,
    ) -> StoreResult<()>;

    /// Append `candidate` to the chain of principal `id` unless the chain
    /// already holds a record active at `at`. Returns whichever record is
    /// active afterwards. Serialized against [`Self::rotate_refresh_token`]
    /// for the same principal.
    async fn append_refresh_token_unless_active(
        &self,
        id: Uuid,
        candidate: &RefreshTokenRecord,
        at: DateTime<Utc>,
    ) -> StoreResult<RefreshTokenRecord>;

    /// Revoke `token` at `at` and append `next` to the same chain in one
    /// step, only if `token` is still active at `at`. Returns the owner's id
    /// for exactly one caller per token; every other caller gets `None`.
    async fn rotate_refresh_token(
        &self,
        token: &str,
        next: &RefreshTokenRecord,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Uuid>>;

    /// Set the revocation timestamp of `token` to `at`, but only if the record
    /// is still active at `at`. Returns `true` for exactly one caller per
    /// token; every concurrent or later caller gets `false`.
    async fn revoke_refresh_token(&self, token: &str, at: DateTime<Utc>) -> StoreResult<bool>;

    async fn add_role(&self, principal: &Principal, role: &str) -> StoreResult<()>;

    async fn get_roles(&self, principal: &Principal) -> StoreResult<Vec<String>>;
}

/// Case-insensitive lookup key for emails and usernames.
pub(crate) fn normalize(value: &str) -> String {
    value.trim().to_uppercase()
}
