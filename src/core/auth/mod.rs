//! Authentication module for authflow
//!
//! This module provides the account lifecycle:
//! - Password hashing and strength rules
//! - Email verification codes
//! - JWT access tokens and rotating refresh tokens
//! - Password reset tokens
//! - REST API endpoints for auth operations

pub mod api;
pub mod codes;
pub mod jwt;
pub mod password;
pub mod reset;
pub mod service;
pub mod session;
pub mod verification;


pub use api::{AuthApiState, auth_api_router};
pub use jwt::{Claims, JwtConfig, JwtError, JwtService, SignedToken, TokenPair, TokenType};
pub use password::{PasswordError, PasswordHasher};
pub use reset::PasswordResetFlow;
pub use service::{
    AuthConfig, AuthError, AuthService, ForgotPasswordRequest, LoginRequest, MessageResponse,
    RefreshRequest, RegisterRequest, ResendVerificationRequest, ResetPasswordRequest,
    VerifyEmailRequest,
};
pub use session::SessionIssuer;
pub use verification::{ResendOutcome, VerificationFlow};
