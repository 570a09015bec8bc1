//! Account lifecycle facade
//!
//! [`AuthService`] validates request payloads, then hands off to the
//! verification, session and password reset flows. The HTTP layer only talks
//! to this type.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::auth::jwt::{JwtError, JwtService, TokenPair};
use crate::core::auth::password::{PasswordError, PasswordHasher};
use crate::core::auth::reset::PasswordResetFlow;
use crate::core::auth::session::SessionIssuer;
use crate::core::auth::verification::{ResendOutcome, VerificationFlow};
use crate::core::db::models::{NewUser, ProfileSummary, User, UserResponse};
use crate::core::db::store::{AuthStore, StoreError};
use crate::core::mail::Mailer;

/// Minimum length of a first or last name
const MIN_NAME_LENGTH: usize = 2;

/// Maximum length of a first or last name (column width)
const MAX_NAME_LENGTH: usize = 100;

/// Failures surfaced by the account lifecycle
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Wrong email or password")]
    InvalidCredentials,

    #[error("Email must be verified")]
    EmailNotVerified,

    #[error("User not found")]
    UserNotFound,

    #[error("Email already registered")]
    EmailAlreadyExists,

    #[error("Token not found")]
    TokenNotFound,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Invalid email format")]
    InvalidEmail,

    #[error("Names must be 2 to 100 characters")]
    InvalidName,

    #[error("Password too short (minimum 8 characters)")]
    PasswordTooShort,

    #[error("Password too weak")]
    PasswordTooWeak,

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => AuthError::UserNotFound,
            StoreError::DuplicateEmail => AuthError::EmailAlreadyExists,
            _ => AuthError::InternalError(err.to_string()),
        }
    }
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => AuthError::TokenExpired,
            JwtError::InvalidToken | JwtError::InvalidTokenType | JwtError::DecodingError(_) => {
                AuthError::InvalidToken
            }
            _ => AuthError::InternalError(err.to_string()),
        }
    }
}

impl From<PasswordError> for AuthError {
    fn from(err: PasswordError) -> Self {
        match err {
            PasswordError::TooShort => AuthError::PasswordTooShort,
            PasswordError::TooWeak => AuthError::PasswordTooWeak,
            PasswordError::HashingError(_) => AuthError::InternalError(err.to_string()),
        }
    }
}

/// Token lifetimes and mail settings shared by the flows
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub verification_ttl: Duration,
    pub reset_ttl: Duration,
    /// Expired refresh tokens older than this are removed on login
    pub refresh_retention: Duration,
    pub mail_timeout: StdDuration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            verification_ttl: Duration::minutes(15),
            reset_ttl: Duration::minutes(15),
            refresh_retention: Duration::days(7),
            mail_timeout: StdDuration::from_secs(10),
        }
    }
}

/// Registration request data
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

/// Email verification request
#[derive(Debug, Clone, Deserialize)]
pub struct VerifyEmailRequest {
    pub token: String,
}

/// Resend verification code request
#[derive(Debug, Clone, Deserialize)]
pub struct ResendVerificationRequest {
    pub email: String,
}

/// Login request data
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Token refresh and logout request
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Forgot password request
#[derive(Debug, Clone, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

/// Password reset request
#[derive(Debug, Clone, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

/// Plain confirmation body
#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Entry point for every account operation
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn AuthStore>,
    verification: VerificationFlow,
    sessions: SessionIssuer,
    resets: PasswordResetFlow,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn AuthStore>,
        mailer: Arc<dyn Mailer>,
        jwt_service: JwtService,
        config: AuthConfig,
    ) -> Self {
        Self {
            verification: VerificationFlow::new(store.clone(), mailer.clone(), &config),
            sessions: SessionIssuer::new(store.clone(), jwt_service, &config),
            resets: PasswordResetFlow::new(store.clone(), mailer, &config),
            store,
        }
    }

    /// `local@label.label[...]` with no whitespace and a single `@`
    fn validate_email(email: &str) -> Result<(), AuthError> {
        let well_formed = !email.chars().any(char::is_whitespace)
            && email.split_once('@').is_some_and(|(local, domain)| {
                !local.is_empty()
                    && !domain.contains('@')
                    && domain.contains('.')
                    && domain.split('.').all(|label| !label.is_empty())
            });

        if well_formed {
            Ok(())
        } else {
            Err(AuthError::InvalidEmail)
        }
    }

    /// Validate an optional first/last name, returning it trimmed
    fn validate_name(name: Option<String>) -> Result<Option<String>, AuthError> {
        let Some(name) = name else {
            return Ok(None);
        };

        let name = name.trim().to_string();
        let length = name.chars().count();
        if !(MIN_NAME_LENGTH..=MAX_NAME_LENGTH).contains(&length) {
            return Err(AuthError::InvalidName);
        }

        Ok(Some(name))
    }

    /// Register a new, unverified user and send the verification code
    pub async fn register(&self, request: RegisterRequest) -> Result<UserResponse, AuthError> {
        let email = request.email.trim().to_string();
        Self::validate_email(&email)?;
        let first_name = Self::validate_name(request.first_name)?;
        let last_name = Self::validate_name(request.last_name)?;
        PasswordHasher::validate_strength(&request.password)?;

        if self.store.find_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailAlreadyExists);
        }

        let password_hash = PasswordHasher::hash(&request.password)?;

        // A concurrent registration surfaces here as DuplicateEmail
        let user = self
            .store
            .create(NewUser {
                email,
                password_hash,
                first_name,
                last_name,
            })
            .await?;

        // The account stands even without a code; resend can issue one later
        if let Err(e) = self.verification.issue(&user).await {
            tracing::error!("Verification code not issued for {}: {}", user.id, e);
        }

        tracing::info!("User registered: {}", user.id);
        Ok(user.into())
    }

    /// Consume a verification code
    pub async fn verify_email(&self, request: VerifyEmailRequest) -> Result<Uuid, AuthError> {
        self.verification.consume(request.token.trim()).await
    }

    /// Send a new verification code
    pub async fn resend_verification(
        &self,
        request: ResendVerificationRequest,
    ) -> Result<ResendOutcome, AuthError> {
        self.verification.resend(request.email.trim()).await
    }

    /// Login an existing, verified user
    pub async fn login(&self, request: LoginRequest) -> Result<TokenPair, AuthError> {
        self.sessions
            .login(request.email.trim(), &request.password)
            .await
    }

    /// Refresh access token using refresh token
    pub async fn refresh(&self, request: RefreshRequest) -> Result<TokenPair, AuthError> {
        self.sessions.refresh(&request.refresh_token).await
    }

    /// Logout a user from every device
    pub async fn logout(&self, request: RefreshRequest) -> Result<u64, AuthError> {
        self.sessions.logout(&request.refresh_token).await
    }

    /// Start a password reset
    pub async fn forgot_password(&self, request: ForgotPasswordRequest) -> Result<(), AuthError> {
        self.resets.forgot_password(request.email.trim()).await
    }

    /// Finish a password reset
    pub async fn reset_password(&self, request: ResetPasswordRequest) -> Result<Uuid, AuthError> {
        self.resets
            .reset_password(request.token.trim(), &request.password)
            .await
    }

    /// Get current user from access token
    pub async fn current_user(&self, access_token: &str) -> Result<UserResponse, AuthError> {
        self.load_user(access_token).await.map(UserResponse::from)
    }

    /// Compact profile with the names joined into `fullName`
    pub async fn profile_summary(&self, access_token: &str) -> Result<ProfileSummary, AuthError> {
        self.load_user(access_token).await.map(ProfileSummary::from)
    }

    async fn load_user(&self, access_token: &str) -> Result<User, AuthError> {
        let user_id = self.sessions.user_id(access_token)?;
        self.store
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::auth::jwt::JwtConfig;
    use crate::core::db::MemoryStore;
    use crate::core::db::models::NewToken;
    use crate::core::db::store::{CredentialStore, TokenStore};
    use crate::core::mail::testing::{RecordingMailer, SentKind};

    fn create_service() -> (MemoryStore, Arc<RecordingMailer>, AuthService) {
        let store = MemoryStore::new();
        let mailer = Arc::new(RecordingMailer::default());
        let service = AuthService::new(
            Arc::new(store.clone()),
            mailer.clone(),
            JwtService::new(JwtConfig::new("test_secret_key_for_testing_only_32bytes!")),
            AuthConfig::default(),
        );
        (store, mailer, service)
    }

    fn register_request(email: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            password: "Passw0rd!".to_string(),
            first_name: Some("Ada".to_string()),
            last_name: Some("Lovelace".to_string()),
        }
    }

    // ========================================================================
    // Validation Tests
    // ========================================================================

    #[test]
    fn test_validate_email() {
        for ok in ["a@x.com", "first.last@mail.example.org", "me+auth@x.io"] {
            assert!(AuthService::validate_email(ok).is_ok(), "{ok} should pass");
        }

        for bad in [
            "",
            "a.x.com",
            "@x.com",
            "a@",
            "a@localhost",
            "a@@x.com",
            "a@x..com",
            "a@.x.com",
            "a @x.com",
        ] {
            assert!(
                matches!(AuthService::validate_email(bad), Err(AuthError::InvalidEmail)),
                "{bad:?} should fail"
            );
        }
    }

    #[test]
    fn test_validate_name() {
        assert_eq!(AuthService::validate_name(None).unwrap(), None);
        assert_eq!(
            AuthService::validate_name(Some("  Ada ".to_string())).unwrap(),
            Some("Ada".to_string())
        );
        assert!(matches!(
            AuthService::validate_name(Some("A".to_string())),
            Err(AuthError::InvalidName)
        ));
        assert!(matches!(
            AuthService::validate_name(Some("x".repeat(101))),
            Err(AuthError::InvalidName)
        ));
    }

    // ========================================================================
    // Registration Tests
    // ========================================================================

    #[tokio::test]
    async fn test_register_creates_unverified_user() {
        let (store, mailer, service) = create_service();

        let user = service.register(register_request("a@x.com")).await.unwrap();

        assert_eq!(user.email, "a@x.com");
        assert!(!user.email_verified);
        assert_eq!(user.first_name.as_deref(), Some("Ada"));

        let stored = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_ne!(stored.password_hash, "Passw0rd!");
        assert_eq!(store.count_verification_tokens(user.id).await, 1);

        let sent = mailer.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, SentKind::Verification);
        assert_eq!(sent[0].name.as_deref(), Some("Ada Lovelace"));
    }

    #[tokio::test]
    async fn test_register_duplicate_email() {
        let (_, _, service) = create_service();

        service.register(register_request("a@x.com")).await.unwrap();
        let result = service.register(register_request("a@x.com")).await;

        assert!(matches!(result, Err(AuthError::EmailAlreadyExists)));
    }

    #[tokio::test]
    async fn test_register_survives_code_exhaustion() {
        let (store, mailer, service) = create_service();
        let holder = store
            .create(NewUser {
                email: "holder@x.com".to_string(),
                password_hash: "hash".to_string(),
                first_name: None,
                last_name: None,
            })
            .await
            .unwrap();
        for code in 1000..=9999 {
            store
                .create_verification_token(NewToken {
                    user_id: holder.id,
                    token: code.to_string(),
                    expires_at: chrono::Utc::now() + Duration::hours(1),
                })
                .await
                .unwrap();
        }

        let user = service.register(register_request("a@x.com")).await.unwrap();

        assert!(store.find_by_id(user.id).await.unwrap().is_some());
        assert_eq!(store.count_verification_tokens(user.id).await, 0);
        assert!(mailer.sent().await.is_empty());
        assert!(matches!(
            service.register(register_request("a@x.com")).await,
            Err(AuthError::EmailAlreadyExists)
        ));
    }

    #[tokio::test]
    async fn test_register_validation_errors() {
        let (_, mailer, service) = create_service();

        let mut request = register_request("not-an-email");
        assert!(matches!(
            service.register(request.clone()).await,
            Err(AuthError::InvalidEmail)
        ));

        request.email = "a@x.com".to_string();
        request.password = "Passw0rd".to_string();
        assert!(matches!(
            service.register(request.clone()).await,
            Err(AuthError::PasswordTooWeak)
        ));

        request.password = "Passw0rd!".to_string();
        request.last_name = Some("L".to_string());
        assert!(matches!(
            service.register(request).await,
            Err(AuthError::InvalidName)
        ));

        assert!(mailer.sent().await.is_empty());
    }

    // ========================================================================
    // Profile Tests
    // ========================================================================

    #[tokio::test]
    async fn test_current_user() {
        let (_, mailer, service) = create_service();
        let user = service.register(register_request("a@x.com")).await.unwrap();
        let code = mailer.last_token(SentKind::Verification).await.unwrap();
        service
            .verify_email(VerifyEmailRequest { token: code })
            .await
            .unwrap();
        let pair = service
            .login(LoginRequest {
                email: "a@x.com".to_string(),
                password: "Passw0rd!".to_string(),
            })
            .await
            .unwrap();

        let profile = service.current_user(&pair.access_token).await.unwrap();
        assert_eq!(profile.id, user.id);
        assert!(profile.email_verified);

        let summary = service.profile_summary(&pair.access_token).await.unwrap();
        assert_eq!(summary.id, user.id);
        assert_eq!(summary.full_name.as_deref(), Some("Ada Lovelace"));

        assert!(matches!(
            service.current_user(&pair.refresh_token).await,
            Err(AuthError::InvalidToken)
        ));
    }

    // ========================================================================
    // Error Conversion Tests
    // ========================================================================

    #[test]
    fn test_client_facing_messages() {
        let cases = [
            (AuthError::InvalidCredentials, "Wrong email or password"),
            (AuthError::EmailNotVerified, "Email must be verified"),
            (AuthError::EmailAlreadyExists, "Email already registered"),
            (AuthError::TokenNotFound, "Token not found"),
            (AuthError::TokenExpired, "Token expired"),
        ];

        for (error, message) in cases {
            assert_eq!(error.to_string(), message);
        }
    }

    #[test]
    fn test_auth_error_from_store_error() {
        let err: AuthError = StoreError::NotFound.into();
        assert!(matches!(err, AuthError::UserNotFound));

        let err: AuthError = StoreError::DuplicateEmail.into();
        assert!(matches!(err, AuthError::EmailAlreadyExists));

        let err: AuthError = StoreError::DuplicateToken.into();
        assert!(matches!(err, AuthError::InternalError(_)));
    }

    #[test]
    fn test_auth_error_from_jwt_error() {
        let err: AuthError = JwtError::Expired.into();
        assert!(matches!(err, AuthError::TokenExpired));

        let err: AuthError = JwtError::InvalidToken.into();
        assert!(matches!(err, AuthError::InvalidToken));

        let err: AuthError = JwtError::InvalidTokenType.into();
        assert!(matches!(err, AuthError::InvalidToken));

        let err: AuthError = JwtError::EncodingError("boom".to_string()).into();
        assert!(matches!(err, AuthError::InternalError(_)));
    }

    #[test]
    fn test_auth_error_from_password_error() {
        let err: AuthError = PasswordError::TooShort.into();
        assert!(matches!(err, AuthError::PasswordTooShort));

        let err: AuthError = PasswordError::HashingError("bad".to_string()).into();
        assert!(matches!(err, AuthError::InternalError(_)));
    }

    // ========================================================================
    // Request Serialization Tests
    // ========================================================================

    #[test]
    fn test_register_request_names_are_optional() {
        let request: RegisterRequest =
            serde_json::from_value(serde_json::json!({"email": "a@x.com", "password": "Passw0rd!"}))
                .unwrap();

        assert_eq!(request.email, "a@x.com");
        assert!(request.first_name.is_none());
        assert!(request.last_name.is_none());
    }
}
