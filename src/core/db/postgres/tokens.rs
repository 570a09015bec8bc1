//! Verification, password reset and refresh token table queries

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{PgStore, map_unique_violation};
use crate::core::db::models::{NewToken, PasswordResetToken, RefreshToken, VerificationToken};
use crate::core::db::store::{StoreError, TokenStore};

#[async_trait]
impl TokenStore for PgStore {
    // ------------------------------------------------------------------------
    // Verification tokens
    // ------------------------------------------------------------------------

    async fn create_verification_token(
        &self,
        token: NewToken,
    ) -> Result<VerificationToken, StoreError> {
        // An expired row holding the same value is taken over
        sqlx::query_as::<_, VerificationToken>(
            r#"
            INSERT INTO verification_tokens (id, token, user_id, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (token) DO UPDATE
            SET id = EXCLUDED.id,
                user_id = EXCLUDED.user_id,
                expires_at = EXCLUDED.expires_at,
                created_at = EXCLUDED.created_at
            WHERE verification_tokens.expires_at < EXCLUDED.created_at
            RETURNING id, token, user_id, expires_at, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&token.token)
        .bind(token.user_id)
        .bind(token.expires_at)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, StoreError::DuplicateToken))?
        .ok_or(StoreError::DuplicateToken)
    }

    async fn find_verification_token(
        &self,
        token: &str,
    ) -> Result<Option<VerificationToken>, StoreError> {
        let found = sqlx::query_as::<_, VerificationToken>(
            r#"
            SELECT id, token, user_id, expires_at, created_at
            FROM verification_tokens
            WHERE token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(found)
    }

    async fn delete_verification_token(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM verification_tokens WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_verification_tokens_for_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM verification_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    // ------------------------------------------------------------------------
    // Password reset tokens
    // ------------------------------------------------------------------------

    async fn create_reset_token(&self, token: NewToken) -> Result<PasswordResetToken, StoreError> {
        // An expired row holding the same value is taken over
        sqlx::query_as::<_, PasswordResetToken>(
            r#"
            INSERT INTO password_reset_tokens (id, token, user_id, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (token) DO UPDATE
            SET id = EXCLUDED.id,
                user_id = EXCLUDED.user_id,
                expires_at = EXCLUDED.expires_at,
                created_at = EXCLUDED.created_at
            WHERE password_reset_tokens.expires_at < EXCLUDED.created_at
            RETURNING id, token, user_id, expires_at, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&token.token)
        .bind(token.user_id)
        .bind(token.expires_at)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, StoreError::DuplicateToken))?
        .ok_or(StoreError::DuplicateToken)
    }

    async fn find_reset_token(
        &self,
        token: &str,
    ) -> Result<Option<PasswordResetToken>, StoreError> {
        let found = sqlx::query_as::<_, PasswordResetToken>(
            r#"
            SELECT id, token, user_id, expires_at, created_at
            FROM password_reset_tokens
            WHERE token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(found)
    }

    async fn delete_reset_token(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM password_reset_tokens WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_reset_tokens_for_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM password_reset_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    // ------------------------------------------------------------------------
    // Refresh tokens
    // ------------------------------------------------------------------------

    async fn create_refresh_token(&self, token: NewToken) -> Result<RefreshToken, StoreError> {
        sqlx::query_as::<_, RefreshToken>(
            r#"
            INSERT INTO refresh_tokens (id, token_hash, user_id, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, token_hash, user_id, expires_at, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&token.token)
        .bind(token.user_id)
        .bind(token.expires_at)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, StoreError::DuplicateToken))
    }

    async fn find_refresh_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshToken>, StoreError> {
        let found = sqlx::query_as::<_, RefreshToken>(
            r#"
            SELECT id, token_hash, user_id, expires_at, created_at
            FROM refresh_tokens
            WHERE token_hash = $1
            "#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(found)
    }

    async fn delete_refresh_token(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_refresh_tokens_for_user(&self, user_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn delete_expired_refresh_tokens_older_than(
        &self,
        user_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM refresh_tokens
            WHERE user_id = $1 AND expires_at < $2
            "#,
        )
        .bind(user_id)
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
