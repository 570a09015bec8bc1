//! Storage interfaces used by the auth flows
//!
//! Flows never talk to a database directly. They depend on these traits, which
//! are implemented by [`PgStore`](super::PgStore) and
//! [`MemoryStore`](super::MemoryStore).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::core::db::models::{
    NewToken, NewUser, PasswordResetToken, RefreshToken, User, VerificationToken,
};

/// Store error types
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Record not found")]
    NotFound,

    #[error("Email already exists")]
    DuplicateEmail,

    #[error("Token value already in use")]
    DuplicateToken,

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

/// Persistence of user records
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    /// Insert a new, unverified user. Fails with `DuplicateEmail` if taken.
    async fn create(&self, user: NewUser) -> Result<User, StoreError>;

    async fn update_verified_flag(&self, id: Uuid, verified: bool) -> Result<(), StoreError>;

    async fn update_password_hash(&self, id: Uuid, password_hash: &str)
    -> Result<(), StoreError>;
}

/// Persistence of the three token tables.
///
/// `create_*` fails with `DuplicateToken` when the value collides with a live row.
/// `delete_*` returns whether a row was actually removed.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn create_verification_token(
        &self,
        token: NewToken,
    ) -> Result<VerificationToken, StoreError>;

    async fn find_verification_token(
        &self,
        token: &str,
    ) -> Result<Option<VerificationToken>, StoreError>;

    async fn delete_verification_token(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn delete_verification_tokens_for_user(&self, user_id: Uuid) -> Result<u64, StoreError>;

    async fn create_reset_token(&self, token: NewToken) -> Result<PasswordResetToken, StoreError>;

    async fn find_reset_token(&self, token: &str)
    -> Result<Option<PasswordResetToken>, StoreError>;

    async fn delete_reset_token(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn delete_reset_tokens_for_user(&self, user_id: Uuid) -> Result<u64, StoreError>;

    async fn create_refresh_token(&self, token: NewToken) -> Result<RefreshToken, StoreError>;

    async fn find_refresh_token(&self, token_hash: &str)
    -> Result<Option<RefreshToken>, StoreError>;

    async fn delete_refresh_token(&self, id: Uuid) -> Result<bool, StoreError>;

    async fn delete_refresh_tokens_for_user(&self, user_id: Uuid) -> Result<u64, StoreError>;

    /// Delete the user's refresh tokens whose expiry lies before `cutoff`
    async fn delete_expired_refresh_tokens_older_than(
        &self,
        user_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError>;
}

/// Multi-row operations that must commit or roll back as a unit.
///
/// Each one starts by deleting the presented token row. If that delete
/// affects no rows another request got there first and nothing else is
/// written.
#[async_trait]
pub trait AuthStore: CredentialStore + TokenStore {
    /// Delete the token and mark its owner verified.
    /// Returns `false` if the token row was already gone.
    async fn consume_verification_token(
        &self,
        token: &VerificationToken,
    ) -> Result<bool, StoreError>;

    /// Delete the token, store the new password hash and drop every refresh
    /// token of the owner. Returns `false` if the token row was already gone.
    async fn consume_reset_token(
        &self,
        token: &PasswordResetToken,
        password_hash: &str,
    ) -> Result<bool, StoreError>;

    /// Replace `current` with a freshly issued refresh token.
    /// Returns `None` if `current` was already gone.
    async fn rotate_refresh_token(
        &self,
        current: &RefreshToken,
        next: NewToken,
    ) -> Result<Option<RefreshToken>, StoreError>;
}
