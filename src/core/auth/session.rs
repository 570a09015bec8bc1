//! Session issuance: login, refresh token rotation and logout
//!
//! Refresh tokens are stored as SHA-256 digests. Every successful refresh
//! replaces the presented token, so a refresh token works at most once.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::core::auth::codes::hash_token;
use crate::core::auth::jwt::{Claims, JwtError, JwtService, TokenPair};
use crate::core::auth::password::PasswordHasher;
use crate::core::auth::service::{AuthConfig, AuthError};
use crate::core::db::models::{Expiring, NewToken, User};
use crate::core::db::store::AuthStore;

#[derive(Clone)]
pub struct SessionIssuer {
    store: Arc<dyn AuthStore>,
    jwt: JwtService,
    retention: Duration,
}

impl SessionIssuer {
    pub fn new(store: Arc<dyn AuthStore>, jwt: JwtService, config: &AuthConfig) -> Self {
        Self {
            store,
            jwt,
            retention: config.refresh_retention,
        }
    }

    /// Check credentials and open a new session
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair, AuthError> {
        let Some(user) = self.store.find_by_email(email).await? else {
            PasswordHasher::verify_dummy(password);
            return Err(AuthError::InvalidCredentials);
        };

        if !PasswordHasher::verify(password, &user.password_hash)? {
            return Err(AuthError::InvalidCredentials);
        }

        if !user.email_verified {
            return Err(AuthError::EmailNotVerified);
        }

        let cutoff = Utc::now() - self.retention;
        let removed = self
            .store
            .delete_expired_refresh_tokens_older_than(user.id, cutoff)
            .await?;
        if removed > 0 {
            tracing::debug!("Removed {} stale refresh token(s) for {}", removed, user.id);
        }

        let (pair, refresh_row) = self.mint(&user)?;
        self.store.create_refresh_token(refresh_row).await?;

        tracing::info!("User logged in: {}", user.id);
        Ok(pair)
    }

    /// Exchange a refresh token for a new pair, retiring the presented token
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let record = self
            .store
            .find_refresh_token(&hash_token(refresh_token))
            .await?
            .ok_or(AuthError::TokenNotFound)?;

        if record.is_expired_at(Utc::now()) {
            if !self.store.delete_refresh_token(record.id).await? {
                return Err(AuthError::TokenNotFound);
            }
            tracing::warn!("Expired refresh token presented for {}", record.user_id);
            return Err(AuthError::TokenExpired);
        }

        let claims = self.jwt.verify_refresh(refresh_token).map_err(|e| match e {
            JwtError::Expired => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        })?;
        if claims.user_id()? != record.user_id {
            return Err(AuthError::InvalidToken);
        }

        let user = self
            .store
            .find_by_id(record.user_id)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let (pair, refresh_row) = self.mint(&user)?;
        if self
            .store
            .rotate_refresh_token(&record, refresh_row)
            .await?
            .is_none()
        {
            return Err(AuthError::TokenNotFound);
        }

        tracing::debug!("Refresh token rotated for {}", user.id);
        Ok(pair)
    }

    /// End every session of the token's owner.
    ///
    /// Returns the number of refresh tokens removed; an unknown token removes
    /// nothing.
    pub async fn logout(&self, refresh_token: &str) -> Result<u64, AuthError> {
        let Some(record) = self
            .store
            .find_refresh_token(&hash_token(refresh_token))
            .await?
        else {
            tracing::debug!("Logout with unknown refresh token");
            return Ok(0);
        };

        let removed = self
            .store
            .delete_refresh_tokens_for_user(record.user_id)
            .await?;

        tracing::info!("User logged out: {} ({} session(s))", record.user_id, removed);
        Ok(removed)
    }

    /// Validate an access token
    pub fn authenticate(&self, access_token: &str) -> Result<Claims, AuthError> {
        Ok(self.jwt.verify_access(access_token)?)
    }

    fn mint(&self, user: &User) -> Result<(TokenPair, NewToken), AuthError> {
        let access = self.jwt.sign_access(user.id, &user.email)?;
        let refresh = self.jwt.sign_refresh(user.id)?;

        let row = NewToken {
            user_id: user.id,
            token: hash_token(&refresh.token),
            expires_at: refresh.expires_at,
        };

        Ok((TokenPair::bearer(access, refresh), row))
    }

    /// Owner of an access token
    pub fn user_id(&self, access_token: &str) -> Result<Uuid, AuthError> {
        Ok(self.authenticate(access_token)?.user_id()?)
    }
}
