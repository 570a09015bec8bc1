//! Database models for authflow
//!
//! This module defines the entity structs that map to the PostgreSQL tables
//! described in `migrations/`. The in-memory store uses the same types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ============================================================================
// User Model
// ============================================================================

/// User entity representing a registered account
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Name used to greet the user in outgoing mail
    pub fn display_name(&self) -> Option<String> {
        match (self.first_name.as_deref(), self.last_name.as_deref()) {
            (Some(first), Some(last)) => Some(format!("{first} {last}")),
            (Some(first), None) => Some(first.to_string()),
            (None, Some(last)) => Some(last.to_string()),
            (None, None) => None,
        }
    }
}

/// User data for creation (password must already be hashed)
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// User without sensitive data (for API responses)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            email_verified: user.email_verified,
            created_at: user.created_at,
        }
    }
}

/// Version 2 profile body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub id: Uuid,
    pub email: String,
    #[serde(rename = "fullName")]
    pub full_name: Option<String>,
}

impl From<User> for ProfileSummary {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            full_name: user.display_name(),
            email: user.email,
        }
    }
}

// ============================================================================
// Token Models
// ============================================================================

/// Anything stored with an expiry timestamp
pub trait Expiring {
    fn expires_at(&self) -> DateTime<Utc>;

    /// A token is expired once `now` is strictly past its expiry
    fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at()
    }
}

/// Single-use email verification code
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct VerificationToken {
    pub id: Uuid,
    pub token: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Single-use password reset code
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct PasswordResetToken {
    pub id: Uuid,
    pub token: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Persisted refresh token. Only the SHA-256 digest of the signed token is kept.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct RefreshToken {
    pub id: Uuid,
    pub token_hash: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Expiring for VerificationToken {
    fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

impl Expiring for PasswordResetToken {
    fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

impl Expiring for RefreshToken {
    fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

/// Token data for creation, shared by all token tables.
/// For refresh tokens `token` holds the digest, not the signed value.
#[derive(Debug, Clone)]
pub struct NewToken {
    pub user_id: Uuid,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}
