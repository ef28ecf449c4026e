//! PostgreSQL principal store.
//!
//! Schema lives in `tokenward_core/migrations/`. Refresh tokens have a unique
//! index on `token`, which backs [`PrincipalStore::find_by_refresh_token`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{PrincipalStore, StoreError, StoreResult, normalize};
use crate::models::auth::{Principal, RefreshTokenRecord};

/// Columns selected for a principal row.
type UserRow = (Uuid, String, String, String, String, Option<String>);

const USER_COLUMNS: &str = "u.id, u.username, u.email, u.first_name, u.last_name, u.password_hash";

/// Principal store backed by PostgreSQL.
#[derive(Debug, Clone)]
pub struct PgPrincipalStore {
    pool: PgPool,
}

impl PgPrincipalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn find_one(&self, filter: &str, value: &str) -> StoreResult<Option<Principal>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users u {filter}");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    /// Load roles, claims and the token chain for a user row.
    async fn hydrate(&self, row: UserRow) -> StoreResult<Principal> {
        let (id, username, email, first_name, last_name, password_hash) = row;

        let roles = self.roles_for(id).await?;

        let claims = sqlx::query_as::<_, (String, String)>(
            "SELECT claim_type, claim_value FROM user_claims WHERE user_id = $1",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .collect::<BTreeMap<_, _>>();

        let refresh_tokens = sqlx::query_as::<
            _,
            (String, DateTime<Utc>, DateTime<Utc>, Option<DateTime<Utc>>),
        >(
            "SELECT token, created_at, expires_at, revoked_at \
             FROM refresh_tokens WHERE user_id = $1 ORDER BY id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|(token, created_at, expires_at, revoked_at)| RefreshTokenRecord {
            token,
            created_at,
            expires_at,
            revoked_at,
        })
        .collect();

        Ok(Principal {
            id,
            username,
            email,
            first_name,
            last_name,
            password_hash,
            roles,
            claims,
            refresh_tokens,
        })
    }

    async fn roles_for(&self, user_id: Uuid) -> StoreResult<Vec<String>> {
        let roles = sqlx::query_scalar::<_, String>(
            "SELECT r.name FROM user_roles ur JOIN roles r ON r.id = ur.role_id \
             WHERE ur.user_id = $1 ORDER BY r.name",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(roles)
    }
}

/// Map unique-constraint violations to [`StoreError::Duplicate`].
fn map_unique(e: sqlx::Error, what: &str) -> StoreError {
    if let sqlx::Error::Database(db) = &e
        && db.is_unique_violation()
    {
        return StoreError::Duplicate(format!("{what} is already taken."));
    }
    StoreError::Db(e)
}

async fn replace_claims(
    tx: &mut Transaction<'_, Postgres>,
    principal: &Principal,
) -> StoreResult<()> {
    sqlx::query("DELETE FROM user_claims WHERE user_id = $1")
        .bind(principal.id)
        .execute(&mut **tx)
        .await?;
    for (claim_type, claim_value) in &principal.claims {
        sqlx::query(
            "INSERT INTO user_claims (user_id, claim_type, claim_value) VALUES ($1, $2, $3)",
        )
        .bind(principal.id)
        .bind(claim_type)
        .bind(claim_value)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

/// Insert unknown records; for known ones only ever set a missing revocation.
async fn upsert_tokens(
    tx: &mut Transaction<'_, Postgres>,
    principal: &Principal,
) -> StoreResult<()> {
    for record in &principal.refresh_tokens {
        let result = sqlx::query(
            "INSERT INTO refresh_tokens (user_id, token, created_at, expires_at, revoked_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (token) DO UPDATE \
               SET revoked_at = COALESCE(refresh_tokens.revoked_at, EXCLUDED.revoked_at) \
             WHERE refresh_tokens.user_id = EXCLUDED.user_id",
        )
        .bind(principal.id)
        .bind(&record.token)
        .bind(record.created_at)
        .bind(record.expires_at)
        .bind(record.revoked_at)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Duplicate(
                "refresh token already belongs to another principal".into(),
            ));
        }
    }
    Ok(())
}

async fn insert_token(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    record: &RefreshTokenRecord,
) -> StoreResult<()> {
    sqlx::query(
        "INSERT INTO refresh_tokens (user_id, token, created_at, expires_at, revoked_at) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(user_id)
    .bind(&record.token)
    .bind(record.created_at)
    .bind(record.expires_at)
    .bind(record.revoked_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_unique(e, "Refresh token"))?;
    Ok(())
}

/// Row lock on the owner; token issuance and rotation for one principal
/// queue behind it.
async fn lock_user(tx: &mut Transaction<'_, Postgres>, id: Uuid) -> StoreResult<()> {
    sqlx::query_scalar::<_, Uuid>("SELECT id FROM users WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("principal {id}")))?;
    Ok(())
}

#[async_trait]
impl PrincipalStore for PgPrincipalStore {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Principal>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users u WHERE u.id = $1");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Principal>> {
        self.find_one("WHERE u.normalized_email = $1", &normalize(email))
            .await
    }

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<Principal>> {
        self.find_one("WHERE u.normalized_username = $1", &normalize(username))
            .await
    }

    async fn find_by_refresh_token(&self, token: &str) -> StoreResult<Option<Principal>> {
        self.find_one(
            "JOIN refresh_tokens rt ON rt.user_id = u.id WHERE rt.token = $1",
            token,
        )
        .await
    }

    async fn create(&self, principal: &Principal) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO users \
               (id, username, normalized_username, email, normalized_email, \
                first_name, last_name, password_hash) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(principal.id)
        .bind(&principal.username)
        .bind(normalize(&principal.username))
        .bind(&principal.email)
        .bind(normalize(&principal.email))
        .bind(&principal.first_name)
        .bind(&principal.last_name)
        .bind(&principal.password_hash)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_unique(e, "Email or username"))?;

        replace_claims(&mut tx, principal).await?;
        upsert_tokens(&mut tx, principal).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn update(&self, principal: &Principal) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE users SET username = $2, normalized_username = $3, email = $4, \
               normalized_email = $5, first_name = $6, last_name = $7, password_hash = $8 \
             WHERE id = $1",
        )
        .bind(principal.id)
        .bind(&principal.username)
        .bind(normalize(&principal.username))
        .bind(&principal.email)
        .bind(normalize(&principal.email))
        .bind(&principal.first_name)
        .bind(&principal.last_name)
        .bind(&principal.password_hash)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_unique(e, "Email or username"))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("principal {}", principal.id)));
        }

        replace_claims(&mut tx, principal).await?;
        upsert_tokens(&mut tx, principal).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn append_refresh_token(
        &self,
        id: Uuid,
        record: &RefreshTokenRecord,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        lock_user(&mut tx, id).await?;
        insert_token(&mut tx, id, record).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn append_refresh_token_unless_active(
        &self,
        id: Uuid,
        candidate: &RefreshTokenRecord,
        at: DateTime<Utc>,
    ) -> StoreResult<RefreshTokenRecord> {
        let mut tx = self.pool.begin().await?;
        lock_user(&mut tx, id).await?;

        let active = sqlx::query_as::<_, (String, DateTime<Utc>, DateTime<Utc>)>(
            "SELECT token, created_at, expires_at FROM refresh_tokens \
             WHERE user_id = $1 AND revoked_at IS NULL AND expires_at > $2 \
             ORDER BY id LIMIT 1",
        )
        .bind(id)
        .bind(at)
        .fetch_optional(&mut *tx)
        .await?;

        let record = match active {
            Some((token, created_at, expires_at)) => RefreshTokenRecord {
                token,
                created_at,
                expires_at,
                revoked_at: None,
            },
            None => {
                insert_token(&mut tx, id, candidate).await?;
                candidate.clone()
            }
        };

        tx.commit().await?;
        Ok(record)
    }

    async fn rotate_refresh_token(
        &self,
        token: &str,
        next: &RefreshTokenRecord,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Uuid>> {
        let mut tx = self.pool.begin().await?;

        let owner = sqlx::query_scalar::<_, Uuid>(
            "SELECT u.id FROM users u JOIN refresh_tokens rt ON rt.user_id = u.id \
             WHERE rt.token = $1 FOR UPDATE OF u",
        )
        .bind(token)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(owner) = owner else {
            return Ok(None);
        };

        let revoked = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = $2 \
             WHERE token = $1 AND revoked_at IS NULL AND expires_at > $2",
        )
        .bind(token)
        .bind(at)
        .execute(&mut *tx)
        .await?;
        if revoked.rows_affected() != 1 {
            return Ok(None);
        }

        insert_token(&mut tx, owner, next).await?;
        tx.commit().await?;
        Ok(Some(owner))
    }

    async fn revoke_refresh_token(&self, token: &str, at: DateTime<Utc>) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = $2 \
             WHERE token = $1 AND revoked_at IS NULL AND expires_at > $2",
        )
        .bind(token)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn add_role(&self, principal: &Principal, role: &str) -> StoreResult<()> {
        let role_id = sqlx::query_scalar::<_, i32>("SELECT id FROM roles WHERE name = $1")
            .bind(role)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("role '{role}'")))?;

        sqlx::query(
            "INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(principal.id)
        .bind(role_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_roles(&self, principal: &Principal) -> StoreResult<Vec<String>> {
        self.roles_for(principal.id).await
    }
}
