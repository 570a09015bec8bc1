//! PostgreSQL implementation of the auth storage traits
//!
//! User queries live in `users.rs`, token table queries in `tokens.rs`.
//! The transactional operations of [`AuthStore`] are implemented here.

mod tokens;
mod users;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::core::db::models::{NewToken, PasswordResetToken, RefreshToken, VerificationToken};
use crate::core::db::store::{AuthStore, StoreError};

/// Store backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new store on an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Access the underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Map a unique-constraint violation to `on_unique`, anything else to a database error
fn map_unique_violation(err: sqlx::Error, on_unique: StoreError) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err
        && db_err.is_unique_violation()
    {
        return on_unique;
    }
    StoreError::DatabaseError(err)
}

#[async_trait]
impl AuthStore for PgStore {
    async fn consume_verification_token(
        &self,
        token: &VerificationToken,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query(
            r#"
            DELETE FROM verification_tokens
            WHERE id = $1
            "#,
        )
        .bind(token.id)
        .execute(&mut *tx)
        .await?;

        if deleted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        let updated = sqlx::query(
            r#"
            UPDATE users
            SET email_verified = TRUE, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(token.user_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(StoreError::NotFound);
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn consume_reset_token(
        &self,
        token: &PasswordResetToken,
        password_hash: &str,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query(
            r#"
            DELETE FROM password_reset_tokens
            WHERE id = $1
            "#,
        )
        .bind(token.id)
        .execute(&mut *tx)
        .await?;

        if deleted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        let updated = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(token.user_id)
        .bind(password_hash)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(StoreError::NotFound);
        }

        sqlx::query(
            r#"
            DELETE FROM refresh_tokens
            WHERE user_id = $1
            "#,
        )
        .bind(token.user_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn rotate_refresh_token(
        &self,
        current: &RefreshToken,
        next: NewToken,
    ) -> Result<Option<RefreshToken>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query(
            r#"
            DELETE FROM refresh_tokens
            WHERE id = $1
            "#,
        )
        .bind(current.id)
        .execute(&mut *tx)
        .await?;

        if deleted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let created = sqlx::query_as::<_, RefreshToken>(
            r#"
            INSERT INTO refresh_tokens (id, token_hash, user_id, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, token_hash, user_id, expires_at, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&next.token)
        .bind(next.user_id)
        .bind(next.expires_at)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_unique_violation(e, StoreError::DuplicateToken))?;

        tx.commit().await?;
        Ok(Some(created))
    }
}
