//! In-memory principal store.
//!
//! Keeps a secondary index `token → principal id` so refresh-token lookup does
//! not scan every principal's chain.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{PrincipalStore, StoreError, StoreResult, normalize};
use crate::models::auth::{Principal, RefreshTokenRecord};

#[derive(Debug, Default)]
struct Inner {
    principals: HashMap<Uuid, Principal>,
    by_email: HashMap<String, Uuid>,
    by_username: HashMap<String, Uuid>,
    by_token: HashMap<String, Uuid>,
}

impl Inner {
    fn lookup(&self, index: &HashMap<String, Uuid>, key: &str) -> Option<Principal> {
        index
            .get(key)
            .and_then(|id| self.principals.get(id))
            .cloned()
    }

    /// `key` is indexed for a principal other than `id`.
    fn taken_by_other(index: &HashMap<String, Uuid>, key: &str, id: Uuid) -> bool {
        index.get(key).is_some_and(|owner| *owner != id)
    }

    fn push_token(&mut self, id: Uuid, record: &RefreshTokenRecord) -> StoreResult<()> {
        if self.by_token.contains_key(&record.token) {
            return Err(StoreError::Duplicate("refresh token already stored".into()));
        }
        let principal = self
            .principals
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("principal {id}")))?;
        principal.refresh_tokens.push(record.clone());
        self.by_token.insert(record.token.clone(), id);
        Ok(())
    }
}

/// Principal store backed by process memory.
#[derive(Debug, Default)]
pub struct MemoryPrincipalStore {
    inner: RwLock<Inner>,
}

impl MemoryPrincipalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored principals.
    pub async fn len(&self) -> usize {
        self.inner.read().await.principals.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl PrincipalStore for MemoryPrincipalStore {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Principal>> {
        Ok(self.inner.read().await.principals.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<Principal>> {
        let inner = self.inner.read().await;
        Ok(inner.lookup(&inner.by_email, &normalize(email)))
    }

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<Principal>> {
        let inner = self.inner.read().await;
        Ok(inner.lookup(&inner.by_username, &normalize(username)))
    }

    async fn find_by_refresh_token(&self, token: &str) -> StoreResult<Option<Principal>> {
        let inner = self.inner.read().await;
        Ok(inner.lookup(&inner.by_token, token))
    }

    async fn create(&self, principal: &Principal) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let email = normalize(&principal.email);
        let username = normalize(&principal.username);

        if inner.by_email.contains_key(&email) {
            return Err(StoreError::Duplicate(format!(
                "Email '{}' is already taken.",
                principal.email
            )));
        }
        if inner.by_username.contains_key(&username) {
            return Err(StoreError::Duplicate(format!(
                "Username '{}' is already taken.",
                principal.username
            )));
        }
        if let Some(r) = principal
            .refresh_tokens
            .iter()
            .find(|r| inner.by_token.contains_key(&r.token))
        {
            return Err(StoreError::Duplicate(format!(
                "refresh token created at {} already stored",
                r.created_at
            )));
        }

        inner.by_email.insert(email, principal.id);
        inner.by_username.insert(username, principal.id);
        for r in &principal.refresh_tokens {
            inner.by_token.insert(r.token.clone(), principal.id);
        }
        inner.principals.insert(principal.id, principal.clone());
        Ok(())
    }

    async fn update(&self, principal: &Principal) -> StoreResult<()> {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;
        let id = principal.id;

        if !inner.principals.contains_key(&id) {
            return Err(StoreError::NotFound(format!("principal {id}")));
        }

        // Validate everything before the first write.
        let email = normalize(&principal.email);
        let username = normalize(&principal.username);
        if Inner::taken_by_other(&inner.by_email, &email, id) {
            return Err(StoreError::Duplicate(format!(
                "Email '{}' is already taken.",
                principal.email
            )));
        }
        if Inner::taken_by_other(&inner.by_username, &username, id) {
            return Err(StoreError::Duplicate(format!(
                "Username '{}' is already taken.",
                principal.username
            )));
        }
        if principal
            .refresh_tokens
            .iter()
            .any(|r| Inner::taken_by_other(&inner.by_token, &r.token, id))
        {
            return Err(StoreError::Duplicate(
                "refresh token already belongs to another principal".into(),
            ));
        }

        let Some(stored) = inner.principals.get_mut(&id) else {
            return Err(StoreError::NotFound(format!("principal {id}")));
        };

        for incoming in &principal.refresh_tokens {
            match stored
                .refresh_tokens
                .iter_mut()
                .find(|r| r.token == incoming.token)
            {
                Some(existing) => {
                    if existing.revoked_at.is_none() {
                        existing.revoked_at = incoming.revoked_at;
                    }
                }
                None => {
                    inner.by_token.insert(incoming.token.clone(), id);
                    stored.refresh_tokens.push(incoming.clone());
                }
            }
        }

        let old_email = normalize(&stored.email);
        let old_username = normalize(&stored.username);
        stored.first_name = principal.first_name.clone();
        stored.last_name = principal.last_name.clone();
        stored.password_hash = principal.password_hash.clone();
        stored.claims = principal.claims.clone();
        stored.email = principal.email.clone();
        stored.username = principal.username.clone();

        inner.by_email.remove(&old_email);
        inner.by_email.insert(email, id);
        inner.by_username.remove(&old_username);
        inner.by_username.insert(username, id);
        Ok(())
    }

    async fn append_refresh_token(
        &self,
        id: Uuid,
        record: &RefreshTokenRecord,
    ) -> StoreResult<()> {
        self.inner.write().await.push_token(id, record)
    }

    async fn append_refresh_token_unless_active(
        &self,
        id: Uuid,
        candidate: &RefreshTokenRecord,
        at: DateTime<Utc>,
    ) -> StoreResult<RefreshTokenRecord> {
        let mut inner = self.inner.write().await;
        let principal = inner
            .principals
            .get(&id)
            .ok_or_else(|| StoreError::NotFound(format!("principal {id}")))?;
        if let Some(active) = principal.active_refresh_token_at(at) {
            return Ok(active.clone());
        }
        inner.push_token(id, candidate)?;
        Ok(candidate.clone())
    }

    async fn rotate_refresh_token(
        &self,
        token: &str,
        next: &RefreshTokenRecord,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<Uuid>> {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;

        let Some(id) = inner.by_token.get(token).copied() else {
            return Ok(None);
        };
        let active = inner
            .principals
            .get(&id)
            .and_then(|p| p.refresh_token(token))
            .is_some_and(|r| r.is_active_at(at));
        if !active {
            return Ok(None);
        }

        inner.push_token(id, next)?;
        if let Some(record) = inner
            .principals
            .get_mut(&id)
            .and_then(|p| p.refresh_token_mut(token))
        {
            record.revoked_at = Some(at);
        }
        Ok(Some(id))
    }

    async fn revoke_refresh_token(&self, token: &str, at: DateTime<Utc>) -> StoreResult<bool> {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;

        let Some(id) = inner.by_token.get(token) else {
            return Ok(false);
        };
        let Some(record) = inner
            .principals
            .get_mut(id)
            .and_then(|p| p.refresh_token_mut(token))
        else {
            return Ok(false);
        };

        if !record.is_active_at(at) {
            return Ok(false);
        }
        record.revoked_at = Some(at);
        Ok(true)
    }

    async fn add_role(&self, principal: &Principal, role: &str) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .principals
            .get_mut(&principal.id)
            .ok_or_else(|| StoreError::NotFound(format!("principal {}", principal.id)))?;
        if !stored.roles.iter().any(|r| r == role) {
            stored.roles.push(role.to_string());
        }
        Ok(())
    }

    async fn get_roles(&self, principal: &Principal) -> StoreResult<Vec<String>> {
        let inner = self.inner.read().await;
        inner
            .principals
            .get(&principal.id)
            .map(|p| p.roles.clone())
            .ok_or_else(|| StoreError::NotFound(format!("principal {}", principal.id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::auth::RefreshTokenRecord;
    use chrono::Duration;

    fn record(token: &str) -> RefreshTokenRecord {
        let now = Utc::now();
        RefreshTokenRecord {
            token: token.into(),
            created_at: now,
            expires_at: now + Duration::days(10),
            revoked_at: None,
        }
    }

    #[tokio::test]
    async fn lookups_are_case_insensitive() {
        let store = MemoryPrincipalStore::new();
        let p = Principal::new("Alice", "Alice@X.com");
        store.create(&p).await.unwrap();

        assert!(store.find_by_email("alice@x.com").await.unwrap().is_some());
        assert!(store.find_by_username("ALICE").await.unwrap().is_some());
        assert!(store.find_by_email("bob@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn create_rejects_duplicate_email_and_username() {
        let store = MemoryPrincipalStore::new();
        store.create(&Principal::new("ab", "a@x.com")).await.unwrap();

        let dup_email = store.create(&Principal::new("other", "A@x.com")).await;
        assert!(matches!(dup_email, Err(StoreError::Duplicate(_))));

        let dup_name = store.create(&Principal::new("AB", "b@x.com")).await;
        assert!(matches!(dup_name, Err(StoreError::Duplicate(_))));

        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn update_appends_and_indexes_new_tokens() {
        let store = MemoryPrincipalStore::new();
        let mut p = Principal::new("ab", "a@x.com");
        store.create(&p).await.unwrap();

        p.refresh_tokens.push(record("t1"));
        store.update(&p).await.unwrap();

        let found = store.find_by_refresh_token("t1").await.unwrap().unwrap();
        assert_eq!(found.id, p.id);
        assert_eq!(found.refresh_tokens.len(), 1);
    }

    #[tokio::test]
    async fn update_never_clears_revocation() {
        let store = MemoryPrincipalStore::new();
        let mut p = Principal::new("ab", "a@x.com");
        p.refresh_tokens.push(record("t1"));
        store.create(&p).await.unwrap();

        assert!(store.revoke_refresh_token("t1", Utc::now()).await.unwrap());
        // stale copy still has revoked_at = None
        store.update(&p).await.unwrap();

        let found = store.find_by_id(p.id).await.unwrap().unwrap();
        assert!(found.refresh_tokens[0].revoked_at.is_some());
    }

    #[tokio::test]
    async fn revoke_is_compare_and_swap() {
        let store = MemoryPrincipalStore::new();
        let mut p = Principal::new("ab", "a@x.com");
        p.refresh_tokens.push(record("t1"));
        store.create(&p).await.unwrap();

        let now = Utc::now();
        assert!(store.revoke_refresh_token("t1", now).await.unwrap());
        assert!(!store.revoke_refresh_token("t1", now).await.unwrap());
        assert!(!store.revoke_refresh_token("missing", now).await.unwrap());
    }

    #[tokio::test]
    async fn revoke_refuses_expired_record() {
        let store = MemoryPrincipalStore::new();
        let mut p = Principal::new("ab", "a@x.com");
        let mut expired = record("old");
        expired.expires_at = Utc::now() - Duration::seconds(1);
        p.refresh_tokens.push(expired);
        store.create(&p).await.unwrap();

        assert!(!store.revoke_refresh_token("old", Utc::now()).await.unwrap());
        let found = store.find_by_id(p.id).await.unwrap().unwrap();
        assert!(found.refresh_tokens[0].revoked_at.is_none());
    }

    #[tokio::test]
    async fn update_with_foreign_token_writes_nothing() {
        let store = MemoryPrincipalStore::new();
        let mut other = Principal::new("cd", "c@x.com");
        other.refresh_tokens.push(record("taken"));
        store.create(&other).await.unwrap();

        let mut p = Principal::new("ab", "a@x.com");
        store.create(&p).await.unwrap();
        p.first_name = "Changed".into();
        p.refresh_tokens.push(record("fresh"));
        p.refresh_tokens.push(record("taken"));

        let err = store.update(&p).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));

        let stored = store.find_by_id(p.id).await.unwrap().unwrap();
        assert!(stored.refresh_tokens.is_empty());
        assert!(stored.first_name.is_empty());
        assert!(store.find_by_refresh_token("fresh").await.unwrap().is_none());
        let owner = store.find_by_refresh_token("taken").await.unwrap().unwrap();
        assert_eq!(owner.id, other.id);
    }

    #[tokio::test]
    async fn update_rejects_email_of_another_principal() {
        let store = MemoryPrincipalStore::new();
        store.create(&Principal::new("cd", "c@x.com")).await.unwrap();
        let mut p = Principal::new("ab", "a@x.com");
        store.create(&p).await.unwrap();

        p.email = "C@x.com".into();
        assert!(matches!(store.update(&p).await, Err(StoreError::Duplicate(_))));
        let found = store.find_by_email("c@x.com").await.unwrap().unwrap();
        assert_eq!(found.username, "cd");
    }

    #[tokio::test]
    async fn append_unless_active_returns_the_active_record() {
        let store = MemoryPrincipalStore::new();
        let mut p = Principal::new("ab", "a@x.com");
        p.refresh_tokens.push(record("t1"));
        store.create(&p).await.unwrap();

        let kept = store
            .append_refresh_token_unless_active(p.id, &record("t2"), Utc::now())
            .await
            .unwrap();
        assert_eq!(kept.token, "t1");
        assert!(store.find_by_refresh_token("t2").await.unwrap().is_none());

        assert!(store.revoke_refresh_token("t1", Utc::now()).await.unwrap());
        let issued = store
            .append_refresh_token_unless_active(p.id, &record("t2"), Utc::now())
            .await
            .unwrap();
        assert_eq!(issued.token, "t2");
    }

    #[tokio::test]
    async fn rotate_revokes_and_appends_together() {
        let store = MemoryPrincipalStore::new();
        let mut p = Principal::new("ab", "a@x.com");
        p.refresh_tokens.push(record("t1"));
        store.create(&p).await.unwrap();

        let now = Utc::now();
        let owner = store.rotate_refresh_token("t1", &record("t2"), now).await.unwrap();
        assert_eq!(owner, Some(p.id));
        assert_eq!(
            store.rotate_refresh_token("t1", &record("t3"), now).await.unwrap(),
            None
        );

        let stored = store.find_by_id(p.id).await.unwrap().unwrap();
        let tokens: Vec<_> = stored.refresh_tokens.iter().map(|r| r.token.as_str()).collect();
        assert_eq!(tokens, ["t1", "t2"]);
        assert_eq!(stored.refresh_tokens[0].revoked_at, Some(now));
        assert!(store.find_by_refresh_token("t3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn roles_are_deduplicated() {
        let store = MemoryPrincipalStore::new();
        let p = Principal::new("ab", "a@x.com");
        store.create(&p).await.unwrap();
        store.add_role(&p, "User").await.unwrap();
        store.add_role(&p, "User").await.unwrap();
        assert_eq!(store.get_roles(&p).await.unwrap(), vec!["User".to_string()]);
    }
}
