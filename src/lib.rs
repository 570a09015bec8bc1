//! authflow - Account Lifecycle Service
//!
//! Registration, email verification, login with rotating refresh tokens,
//! logout and password reset, served as a JSON API with axum.

pub mod core;
