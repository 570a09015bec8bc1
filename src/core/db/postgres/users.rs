//! User table queries

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{PgStore, map_unique_violation};
use crate::core::db::models::{NewUser, User};
use crate::core::db::store::{CredentialStore, StoreError};

#[async_trait]
impl CredentialStore for PgStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, first_name, last_name, email_verified, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, first_name, last_name, email_verified, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        let now = Utc::now();

        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, password_hash, first_name, last_name, email_verified, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, FALSE, $6, $6)
            RETURNING id, email, password_hash, first_name, last_name, email_verified, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, StoreError::DuplicateEmail))
    }

    async fn update_verified_flag(&self, id: Uuid, verified: bool) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET email_verified = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(verified)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        Ok(())
    }

    async fn update_password_hash(
        &self,
        id: Uuid,
        password_hash: &str,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        Ok(())
    }
}
