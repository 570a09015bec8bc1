//! Password reset tokens

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::core::auth::codes::{MAX_CODE_ATTEMPTS, generate_reset_token};
use crate::core::auth::password::PasswordHasher;
use crate::core::auth::service::{AuthConfig, AuthError};
use crate::core::db::models::{Expiring, NewToken, PasswordResetToken};
use crate::core::db::store::{AuthStore, StoreError};
use crate::core::mail::{Mailer, spawn_best_effort};

#[derive(Clone)]
pub struct PasswordResetFlow {
    store: Arc<dyn AuthStore>,
    mailer: Arc<dyn Mailer>,
    ttl: Duration,
    mail_timeout: StdDuration,
}

impl PasswordResetFlow {
    pub fn new(store: Arc<dyn AuthStore>, mailer: Arc<dyn Mailer>, config: &AuthConfig) -> Self {
        Self {
            store,
            mailer,
            ttl: config.reset_ttl,
            mail_timeout: config.mail_timeout,
        }
    }

    /// Mail a reset token if the account exists.
    ///
    /// The result is the same whether or not the email is registered.
    pub async fn forgot_password(&self, email: &str) -> Result<(), AuthError> {
        let Some(user) = self.store.find_by_email(email).await? else {
            tracing::info!("Password reset requested for unregistered email");
            return Ok(());
        };

        self.store.delete_reset_tokens_for_user(user.id).await?;
        let token = self.create_token(user.id).await?;

        // Reply without waiting on delivery
        let mailer = self.mailer.clone();
        let name = user.display_name();
        let email = user.email;
        spawn_best_effort("password reset", user.id, self.mail_timeout, async move {
            mailer
                .send_reset_password_email(&email, &token.token, name.as_deref())
                .await
        });

        tracing::info!("Password reset token issued for {}", user.id);
        Ok(())
    }

    async fn create_token(&self, user_id: Uuid) -> Result<PasswordResetToken, AuthError> {
        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let new_token = NewToken {
                user_id,
                token: generate_reset_token(),
                expires_at: Utc::now() + self.ttl,
            };

            match self.store.create_reset_token(new_token).await {
                Ok(token) => return Ok(token),
                Err(StoreError::DuplicateToken) => {
                    tracing::debug!("Reset token collision (attempt {})", attempt);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AuthError::InternalError(
            "Could not allocate a unique reset token".to_string(),
        ))
    }

    /// Set a new password with a reset token and end all sessions of the owner
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<Uuid, AuthError> {
        PasswordHasher::validate_strength(new_password)?;

        let record = self
            .store
            .find_reset_token(token)
            .await?
            .ok_or(AuthError::TokenNotFound)?;

        if record.is_expired_at(Utc::now()) {
            if !self.store.delete_reset_token(record.id).await? {
                return Err(AuthError::TokenNotFound);
            }
            tracing::warn!("Expired reset token presented for {}", record.user_id);
            return Err(AuthError::TokenExpired);
        }

        let password_hash = PasswordHasher::hash(new_password)?;
        if !self
            .store
            .consume_reset_token(&record, &password_hash)
            .await?
        {
            return Err(AuthError::TokenNotFound);
        }

        tracing::info!("Password reset for user {}", record.user_id);
        Ok(record.user_id)
    }
}
