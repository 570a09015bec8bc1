//! HTTP surface of the account lifecycle
//!
//! | Method | Path                                  | Body                         |
//! |--------|---------------------------------------|------------------------------|
//! | POST   | /api/auth/register                    | email, password, names       |
//! | POST   | /api/auth/verify-email                | token                        |
//! | POST   | /api/auth/resend-verification-email   | email                        |
//! | POST   | /api/auth/login                       | email, password              |
//! | POST   | /api/auth/refresh-token               | refresh_token                |
//! | POST   | /api/auth/logout                      | refresh_token                |
//! | POST   | /api/auth/forgot-password             | email                        |
//! | POST   | /api/auth/reset-password              | token, password              |
//! | GET    | /api/auth/profile                     | (bearer access token)        |
//! | GET    | /api/v2/auth/profile                  | (bearer access token)        |

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use std::sync::Arc;

use crate::core::auth::verification::ResendOutcome;
use crate::core::auth::{
    AuthError, AuthService, ForgotPasswordRequest, LoginRequest, MessageResponse, RefreshRequest,
    RegisterRequest, ResendVerificationRequest, ResetPasswordRequest, TokenPair,
    VerifyEmailRequest,
};
use crate::core::db::models::{ProfileSummary, UserResponse};

/// Shared handler state
#[derive(Clone)]
pub struct AuthApiState {
    pub auth_service: AuthService,
}

/// JSON error body: `{"error": ..., "code": ...}`
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub code: String,
}

impl ApiError {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AuthError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS"),
            AuthError::EmailNotVerified => (StatusCode::UNAUTHORIZED, "EMAIL_NOT_VERIFIED"),
            AuthError::UserNotFound => (StatusCode::NOT_FOUND, "USER_NOT_FOUND"),
            AuthError::EmailAlreadyExists => (StatusCode::CONFLICT, "EMAIL_EXISTS"),
            AuthError::TokenNotFound => (StatusCode::BAD_REQUEST, "TOKEN_NOT_FOUND"),
            AuthError::TokenExpired => (StatusCode::BAD_REQUEST, "TOKEN_EXPIRED"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "INVALID_TOKEN"),
            AuthError::InvalidEmail => (StatusCode::BAD_REQUEST, "INVALID_EMAIL"),
            AuthError::InvalidName => (StatusCode::BAD_REQUEST, "INVALID_NAME"),
            AuthError::PasswordTooShort => (StatusCode::BAD_REQUEST, "PASSWORD_TOO_SHORT"),
            AuthError::PasswordTooWeak => (StatusCode::BAD_REQUEST, "PASSWORD_TOO_WEAK"),
            AuthError::InternalError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = if let AuthError::InternalError(detail) = &self {
            tracing::error!("Internal error: {}", detail);
            ApiError::new("Internal server error", code)
        } else {
            ApiError::new(self.to_string(), code)
        };

        (status, Json(body)).into_response()
    }
}

/// Response for registration
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: String,
    pub user: UserResponse,
}

/// Create the auth API router
pub fn auth_api_router(state: AuthApiState) -> Router {
    let state = Arc::new(state);

    Router::new()
        .route("/api/auth/register", post(register_handler))
        .route("/api/auth/verify-email", post(verify_email_handler))
        .route(
            "/api/auth/resend-verification-email",
            post(resend_verification_handler),
        )
        .route("/api/auth/login", post(login_handler))
        .route("/api/auth/refresh-token", post(refresh_handler))
        .route("/api/auth/logout", post(logout_handler))
        .route("/api/auth/forgot-password", post(forgot_password_handler))
        .route("/api/auth/reset-password", post(reset_password_handler))
        .route("/api/auth/profile", get(profile_handler))
        .route("/api/v2/auth/profile", get(profile_v2_handler))
        .with_state(state)
}

/// POST /api/auth/register
async fn register_handler(
    State(state): State<Arc<AuthApiState>>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AuthError> {
    let user = state.auth_service.register(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "Registration successful. Check your email for the verification code"
                .to_string(),
            user,
        }),
    ))
}

/// POST /api/auth/verify-email
async fn verify_email_handler(
    State(state): State<Arc<AuthApiState>>,
    Json(request): Json<VerifyEmailRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    state.auth_service.verify_email(request).await?;

    Ok(Json(MessageResponse::new(
        "Email verified successfully. You can now login",
    )))
}

/// POST /api/auth/resend-verification-email
async fn resend_verification_handler(
    State(state): State<Arc<AuthApiState>>,
    Json(request): Json<ResendVerificationRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    let message = match state.auth_service.resend_verification(request).await? {
        ResendOutcome::Sent => "Verification email sent",
        ResendOutcome::AlreadyVerified => "Email is already verified",
    };

    Ok(Json(MessageResponse::new(message)))
}

/// POST /api/auth/login
async fn login_handler(
    State(state): State<Arc<AuthApiState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<TokenPair>, AuthError> {
    state.auth_service.login(request).await.map(Json)
}

/// POST /api/auth/refresh-token
async fn refresh_handler(
    State(state): State<Arc<AuthApiState>>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<TokenPair>, AuthError> {
    state.auth_service.refresh(request).await.map(Json)
}

/// POST /api/auth/logout
///
/// Ends every session of the token's owner; unknown tokens still get 200.
async fn logout_handler(
    State(state): State<Arc<AuthApiState>>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    state.auth_service.logout(request).await?;

    Ok(Json(MessageResponse::new("User Logged Out Successfully")))
}

/// POST /api/auth/forgot-password
async fn forgot_password_handler(
    State(state): State<Arc<AuthApiState>>,
    Json(request): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    state.auth_service.forgot_password(request).await?;

    Ok(Json(MessageResponse::new(
        "If your email is registered, you will receive password reset instructions",
    )))
}

/// POST /api/auth/reset-password
async fn reset_password_handler(
    State(state): State<Arc<AuthApiState>>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    state.auth_service.reset_password(request).await?;

    Ok(Json(MessageResponse::new(
        "Password reset successfully. Please login again",
    )))
}

/// GET /api/auth/profile
async fn profile_handler(
    State(state): State<Arc<AuthApiState>>,
    headers: HeaderMap,
) -> Result<Json<UserResponse>, AuthError> {
    let token = extract_bearer_token(&headers)?;

    let user = state.auth_service.current_user(&token).await?;

    Ok(Json(user))
}

/// GET /api/v2/auth/profile
async fn profile_v2_handler(
    State(state): State<Arc<AuthApiState>>,
    headers: HeaderMap,
) -> Result<Json<ProfileSummary>, AuthError> {
    let token = extract_bearer_token(&headers)?;

    state.auth_service.profile_summary(&token).await.map(Json)
}

/// Token from an `Authorization: Bearer <token>` header
fn extract_bearer_token(headers: &HeaderMap) -> Result<String, AuthError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .ok_or(AuthError::InvalidToken)
}
