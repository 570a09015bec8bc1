//! Email verification codes
//!
//! A user holds at most one live code: issuing deletes the previous ones.
//! Codes are consumed through [`AuthStore::consume_verification_token`], so
//! two concurrent verifications of the same code yield exactly one success.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::core::auth::codes::{MAX_CODE_ATTEMPTS, generate_verification_code};
use crate::core::auth::service::{AuthConfig, AuthError};
use crate::core::db::models::{Expiring, NewToken, User, VerificationToken};
use crate::core::db::store::{AuthStore, StoreError};
use crate::core::mail::{Mailer, send_best_effort};

/// Result of a resend request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResendOutcome {
    Sent,
    AlreadyVerified,
}

#[derive(Clone)]
pub struct VerificationFlow {
    store: Arc<dyn AuthStore>,
    mailer: Arc<dyn Mailer>,
    ttl: Duration,
    mail_timeout: StdDuration,
}

impl VerificationFlow {
    pub fn new(store: Arc<dyn AuthStore>, mailer: Arc<dyn Mailer>, config: &AuthConfig) -> Self {
        Self {
            store,
            mailer,
            ttl: config.verification_ttl,
            mail_timeout: config.mail_timeout,
        }
    }

    /// Replace the user's verification code with a fresh one and mail it
    pub async fn issue(&self, user: &User) -> Result<VerificationToken, AuthError> {
        let replaced = self
            .store
            .delete_verification_tokens_for_user(user.id)
            .await?;
        if replaced > 0 {
            tracing::debug!("Invalidated {} verification code(s) for {}", replaced, user.id);
        }

        let token = self.create_token(user.id).await?;

        let name = user.display_name();
        send_best_effort(
            "verification",
            user.id,
            self.mail_timeout,
            self.mailer
                .send_verification_email(&user.email, &token.token, name.as_deref()),
        )
        .await;

        Ok(token)
    }

    async fn create_token(&self, user_id: Uuid) -> Result<VerificationToken, AuthError> {
        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let new_token = NewToken {
                user_id,
                token: generate_verification_code(),
                expires_at: Utc::now() + self.ttl,
            };

            match self.store.create_verification_token(new_token).await {
                Ok(token) => return Ok(token),
                Err(StoreError::DuplicateToken) => {
                    tracing::debug!("Verification code collision (attempt {})", attempt);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AuthError::InternalError(
            "Could not allocate a unique verification code".to_string(),
        ))
    }

    /// Consume a code and mark its owner verified. Returns the owner's id.
    pub async fn consume(&self, token: &str) -> Result<Uuid, AuthError> {
        let record = self
            .store
            .find_verification_token(token)
            .await?
            .ok_or(AuthError::TokenNotFound)?;

        if record.is_expired_at(Utc::now()) {
            if !self.store.delete_verification_token(record.id).await? {
                return Err(AuthError::TokenNotFound);
            }
            tracing::warn!("Expired verification code presented for {}", record.user_id);
            return Err(AuthError::TokenExpired);
        }

        if !self.store.consume_verification_token(&record).await? {
            return Err(AuthError::TokenNotFound);
        }

        tracing::info!("Email verified for user {}", record.user_id);
        Ok(record.user_id)
    }

    /// Send a new code unless the account is already verified
    pub async fn resend(&self, email: &str) -> Result<ResendOutcome, AuthError> {
        let user = self
            .store
            .find_by_email(email)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if user.email_verified {
            return Ok(ResendOutcome::AlreadyVerified);
        }

        self.issue(&user).await?;
        Ok(ResendOutcome::Sent)
    }
}
