//! In-memory implementation of the auth storage traits
//!
//! All tables sit behind one async mutex, so every method (including the
//! transactional ones) observes and writes a consistent snapshot. State is
//! lost on restart; use [`PgStore`](super::PgStore) for anything durable.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::core::db::models::{
    Expiring, NewToken, NewUser, PasswordResetToken, RefreshToken, User, VerificationToken,
};
use crate::core::db::store::{AuthStore, CredentialStore, StoreError, TokenStore};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    verification_tokens: HashMap<Uuid, VerificationToken>,
    reset_tokens: HashMap<Uuid, PasswordResetToken>,
    refresh_tokens: HashMap<Uuid, RefreshToken>,
}

impl Tables {
    fn insert_refresh_token(&mut self, token: NewToken) -> Result<RefreshToken, StoreError> {
        if self
            .refresh_tokens
            .values()
            .any(|t| t.token_hash == token.token)
        {
            return Err(StoreError::DuplicateToken);
        }

        let row = RefreshToken {
            id: Uuid::new_v4(),
            token_hash: token.token,
            user_id: token.user_id,
            expires_at: token.expires_at,
            created_at: Utc::now(),
        };
        self.refresh_tokens.insert(row.id, row.clone());
        Ok(row)
    }

    fn remove_refresh_tokens_where(&mut self, predicate: impl Fn(&RefreshToken) -> bool) -> u64 {
        let before = self.refresh_tokens.len();
        self.refresh_tokens.retain(|_, t| !predicate(t));
        (before - self.refresh_tokens.len()) as u64
    }
}

/// Process-local store
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live refresh tokens for a user
    pub async fn count_refresh_tokens(&self, user_id: Uuid) -> usize {
        let tables = self.tables.lock().await;
        tables
            .refresh_tokens
            .values()
            .filter(|t| t.user_id == user_id)
            .count()
    }

    /// Number of live verification tokens for a user
    pub async fn count_verification_tokens(&self, user_id: Uuid) -> usize {
        let tables = self.tables.lock().await;
        tables
            .verification_tokens
            .values()
            .filter(|t| t.user_id == user_id)
            .count()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.users.get(&id).cloned())
    }

    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::DuplicateEmail);
        }

        let now = Utc::now();
        let row = User {
            id: Uuid::new_v4(),
            email: user.email,
            password_hash: user.password_hash,
            first_name: user.first_name,
            last_name: user.last_name,
            email_verified: false,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(row.id, row.clone());
        Ok(row)
    }

    async fn update_verified_flag(&self, id: Uuid, verified: bool) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        let user = tables.users.get_mut(&id).ok_or(StoreError::NotFound)?;
        user.email_verified = verified;
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn update_password_hash(
        &self,
        id: Uuid,
        password_hash: &str,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        let user = tables.users.get_mut(&id).ok_or(StoreError::NotFound)?;
        user.password_hash = password_hash.to_string();
        user.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn create_verification_token(
        &self,
        token: NewToken,
    ) -> Result<VerificationToken, StoreError> {
        let mut tables = self.tables.lock().await;
        let now = Utc::now();
        if let Some(existing) = tables
            .verification_tokens
            .values()
            .find(|t| t.token == token.token)
            .map(|t| (t.id, t.is_expired_at(now)))
        {
            match existing {
                (id, true) => {
                    tables.verification_tokens.remove(&id);
                }
                (_, false) => return Err(StoreError::DuplicateToken),
            }
        }

        let row = VerificationToken {
            id: Uuid::new_v4(),
            token: token.token,
            user_id: token.user_id,
            expires_at: token.expires_at,
            created_at: Utc::now(),
        };
        tables.verification_tokens.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_verification_token(
        &self,
        token: &str,
    ) -> Result<Option<VerificationToken>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .verification_tokens
            .values()
            .find(|t| t.token == token)
            .cloned())
    }

    async fn delete_verification_token(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        Ok(tables.verification_tokens.remove(&id).is_some())
    }

    async fn delete_verification_tokens_for_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let mut tables = self.tables.lock().await;
        let before = tables.verification_tokens.len();
        tables
            .verification_tokens
            .retain(|_, t| t.user_id != user_id);
        Ok((before - tables.verification_tokens.len()) as u64)
    }

    async fn create_reset_token(&self, token: NewToken) -> Result<PasswordResetToken, StoreError> {
        let mut tables = self.tables.lock().await;
        let now = Utc::now();
        if let Some(existing) = tables
            .reset_tokens
            .values()
            .find(|t| t.token == token.token)
            .map(|t| (t.id, t.is_expired_at(now)))
        {
            match existing {
                (id, true) => {
                    tables.reset_tokens.remove(&id);
                }
                (_, false) => return Err(StoreError::DuplicateToken),
            }
        }

        let row = PasswordResetToken {
            id: Uuid::new_v4(),
            token: token.token,
            user_id: token.user_id,
            expires_at: token.expires_at,
            created_at: Utc::now(),
        };
        tables.reset_tokens.insert(row.id, row.clone());
        Ok(row)
    }

    async fn find_reset_token(
        &self,
        token: &str,
    ) -> Result<Option<PasswordResetToken>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .reset_tokens
            .values()
            .find(|t| t.token == token)
            .cloned())
    }

    async fn delete_reset_token(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        Ok(tables.reset_tokens.remove(&id).is_some())
    }

    async fn delete_reset_tokens_for_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let mut tables = self.tables.lock().await;
        let before = tables.reset_tokens.len();
        tables.reset_tokens.retain(|_, t| t.user_id != user_id);
        Ok((before - tables.reset_tokens.len()) as u64)
    }

    async fn create_refresh_token(&self, token: NewToken) -> Result<RefreshToken, StoreError> {
        let mut tables = self.tables.lock().await;
        tables.insert_refresh_token(token)
    }

    async fn find_refresh_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshToken>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .refresh_tokens
            .values()
            .find(|t| t.token_hash == token_hash)
            .cloned())
    }

    async fn delete_refresh_token(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        Ok(tables.refresh_tokens.remove(&id).is_some())
    }

    async fn delete_refresh_tokens_for_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let mut tables = self.tables.lock().await;
        Ok(tables.remove_refresh_tokens_where(|t| t.user_id == user_id))
    }

    async fn delete_expired_refresh_tokens_older_than(
        &self,
        user_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut tables = self.tables.lock().await;
        Ok(tables.remove_refresh_tokens_where(|t| t.user_id == user_id && t.expires_at < cutoff))
    }
}

#[async_trait]
impl AuthStore for MemoryStore {
    async fn consume_verification_token(
        &self,
        token: &VerificationToken,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        if !tables.users.contains_key(&token.user_id) {
            return Err(StoreError::NotFound);
        }
        if tables.verification_tokens.remove(&token.id).is_none() {
            return Ok(false);
        }

        if let Some(user) = tables.users.get_mut(&token.user_id) {
            user.email_verified = true;
            user.updated_at = Utc::now();
        }
        Ok(true)
    }

    async fn consume_reset_token(
        &self,
        token: &PasswordResetToken,
        password_hash: &str,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        if !tables.users.contains_key(&token.user_id) {
            return Err(StoreError::NotFound);
        }
        if tables.reset_tokens.remove(&token.id).is_none() {
            return Ok(false);
        }

        if let Some(user) = tables.users.get_mut(&token.user_id) {
            user.password_hash = password_hash.to_string();
            user.updated_at = Utc::now();
        }
        tables.remove_refresh_tokens_where(|t| t.user_id == token.user_id);
        Ok(true)
    }

    async fn rotate_refresh_token(
        &self,
        current: &RefreshToken,
        next: NewToken,
    ) -> Result<Option<RefreshToken>, StoreError> {
        let mut tables = self.tables.lock().await;
        let Some(previous) = tables.refresh_tokens.remove(&current.id) else {
            return Ok(None);
        };

        match tables.insert_refresh_token(next) {
            Ok(created) => Ok(Some(created)),
            Err(err) => {
                // Roll back the delete
                tables.refresh_tokens.insert(previous.id, previous);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn store_with_user() -> (MemoryStore, User) {
        let store = MemoryStore::new();
        let user = store
            .create(NewUser {
                email: "a@x.com".to_string(),
                password_hash: "hash".to_string(),
                first_name: None,
                last_name: None,
            })
            .await
            .unwrap();
        (store, user)
    }

    fn new_token(user_id: Uuid, token: &str) -> NewToken {
        NewToken {
            user_id,
            token: token.to_string(),
            expires_at: Utc::now() + Duration::minutes(15),
        }
    }

    // ========================================================================
    // Credential Tests
    // ========================================================================

    #[tokio::test]
    async fn test_create_user_starts_unverified() {
        let (store, user) = store_with_user().await;

        assert!(!user.email_verified);
        let found = store.find_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(found.id, user.id);
    }

    #[tokio::test]
    async fn test_email_lookup_is_case_sensitive() {
        let (store, _) = store_with_user().await;

        assert!(store.find_by_email("A@X.COM").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_duplicate_email() {
        let (store, _) = store_with_user().await;

        let result = store
            .create(NewUser {
                email: "a@x.com".to_string(),
                password_hash: "other".to_string(),
                first_name: None,
                last_name: None,
            })
            .await;
        assert!(matches!(result, Err(StoreError::DuplicateEmail)));
    }

    #[tokio::test]
    async fn test_update_missing_user() {
        let store = MemoryStore::new();

        let result = store.update_password_hash(Uuid::new_v4(), "hash").await;
        assert!(matches!(result, Err(StoreError::NotFound)));

        let result = store.update_verified_flag(Uuid::new_v4(), true).await;
        assert!(matches!(result, Err(StoreError::NotFound)));
    }

    // ========================================================================
    // Token Tests
    // ========================================================================

    #[tokio::test]
    async fn test_duplicate_token_values_rejected() {
        let (store, user) = store_with_user().await;

        store
            .create_verification_token(new_token(user.id, "1234"))
            .await
            .unwrap();
        let result = store
            .create_verification_token(new_token(user.id, "1234"))
            .await;

        assert!(matches!(result, Err(StoreError::DuplicateToken)));
    }

    #[tokio::test]
    async fn test_expired_token_value_is_reusable() {
        let (store, ghost) = store_with_user().await;
        let user = store
            .create(NewUser {
                email: "b@x.com".to_string(),
                password_hash: "hash".to_string(),
                first_name: None,
                last_name: None,
            })
            .await
            .unwrap();
        let stale = |token: &str| NewToken {
            user_id: ghost.id,
            token: token.to_string(),
            expires_at: Utc::now() - Duration::days(30),
        };
        store.create_verification_token(stale("1234")).await.unwrap();
        store.create_reset_token(stale("ABC123")).await.unwrap();

        let code = store
            .create_verification_token(new_token(user.id, "1234"))
            .await
            .unwrap();
        let reset = store
            .create_reset_token(new_token(user.id, "ABC123"))
            .await
            .unwrap();

        assert_eq!(code.user_id, user.id);
        assert_eq!(reset.user_id, user.id);
        assert_eq!(store.count_verification_tokens(ghost.id).await, 0);
        assert_eq!(
            store.find_reset_token("ABC123").await.unwrap().unwrap().user_id,
            user.id
        );

        // A live row still wins
        assert!(matches!(
            store.create_reset_token(new_token(ghost.id, "ABC123")).await,
            Err(StoreError::DuplicateToken)
        ));
    }

    #[tokio::test]
    async fn test_consume_verification_token_once() {
        let (store, user) = store_with_user().await;
        let token = store
            .create_verification_token(new_token(user.id, "4321"))
            .await
            .unwrap();

        assert!(store.consume_verification_token(&token).await.unwrap());
        assert!(!store.consume_verification_token(&token).await.unwrap());

        let user = store.find_by_id(user.id).await.unwrap().unwrap();
        assert!(user.email_verified);
        assert!(store.find_verification_token("4321").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_consume_reset_token_drops_refresh_tokens() {
        let (store, user) = store_with_user().await;
        store
            .create_refresh_token(new_token(user.id, "digest-a"))
            .await
            .unwrap();
        store
            .create_refresh_token(new_token(user.id, "digest-b"))
            .await
            .unwrap();
        let reset = store
            .create_reset_token(new_token(user.id, "AB12CD"))
            .await
            .unwrap();

        assert!(store.consume_reset_token(&reset, "new_hash").await.unwrap());

        assert_eq!(store.count_refresh_tokens(user.id).await, 0);
        let user = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(user.password_hash, "new_hash");
    }

    #[tokio::test]
    async fn test_consumed_reset_token_leaves_password_untouched() {
        let (store, user) = store_with_user().await;
        let reset = store
            .create_reset_token(new_token(user.id, "ZZ99ZZ"))
            .await
            .unwrap();
        store.delete_reset_token(reset.id).await.unwrap();

        assert!(!store.consume_reset_token(&reset, "new_hash").await.unwrap());

        let user = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(user.password_hash, "hash");
    }

    #[tokio::test]
    async fn test_rotate_refresh_token_replaces_row() {
        let (store, user) = store_with_user().await;
        let current = store
            .create_refresh_token(new_token(user.id, "digest-old"))
            .await
            .unwrap();

        let rotated = store
            .rotate_refresh_token(&current, new_token(user.id, "digest-new"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(rotated.token_hash, "digest-new");
        assert!(store.find_refresh_token("digest-old").await.unwrap().is_none());
        assert_eq!(store.count_refresh_tokens(user.id).await, 1);

        let replay = store
            .rotate_refresh_token(&current, new_token(user.id, "digest-other"))
            .await
            .unwrap();
        assert!(replay.is_none());
    }

    #[tokio::test]
    async fn test_rotate_refresh_token_rolls_back_on_collision() {
        let (store, user) = store_with_user().await;
        let current = store
            .create_refresh_token(new_token(user.id, "digest-1"))
            .await
            .unwrap();
        store
            .create_refresh_token(new_token(user.id, "digest-2"))
            .await
            .unwrap();

        let result = store
            .rotate_refresh_token(&current, new_token(user.id, "digest-2"))
            .await;

        assert!(matches!(result, Err(StoreError::DuplicateToken)));
        assert!(store.find_refresh_token("digest-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_expired_refresh_tokens_older_than() {
        let (store, user) = store_with_user().await;
        let now = Utc::now();
        store
            .create_refresh_token(NewToken {
                user_id: user.id,
                token: "stale".to_string(),
                expires_at: now - Duration::days(10),
            })
            .await
            .unwrap();
        store
            .create_refresh_token(NewToken {
                user_id: user.id,
                token: "recently-expired".to_string(),
                expires_at: now - Duration::days(1),
            })
            .await
            .unwrap();
        store
            .create_refresh_token(new_token(user.id, "live"))
            .await
            .unwrap();

        let removed = store
            .delete_expired_refresh_tokens_older_than(user.id, now - Duration::days(7))
            .await
            .unwrap();

        assert_eq!(removed, 1);
        assert_eq!(store.count_refresh_tokens(user.id).await, 2);
    }

    #[tokio::test]
    async fn test_delete_tokens_for_user_counts_rows() {
        let (store, user) = store_with_user().await;
        store
            .create_verification_token(new_token(user.id, "1111"))
            .await
            .unwrap();
        store
            .create_verification_token(new_token(user.id, "2222"))
            .await
            .unwrap();

        let removed = store
            .delete_verification_tokens_for_user(user.id)
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.count_verification_tokens(user.id).await, 0);
    }
}
