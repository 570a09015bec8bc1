//! HS256 access and refresh tokens
//!
//! Access tokens carry the user's email and live for minutes. Refresh tokens
//! carry only the subject and live for days; the server stores their SHA-256
//! digest, so every refresh token gets its own `jti` to keep digests distinct.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const DEFAULT_ACCESS_TTL_MINUTES: i64 = 15;
const DEFAULT_REFRESH_TTL_DAYS: i64 = 7;
const DEFAULT_ISSUER: &str = "authflow";

/// Signing secret, lifetimes and issuer
#[derive(Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub issuer: String,
}

impl JwtConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            access_ttl: Duration::minutes(DEFAULT_ACCESS_TTL_MINUTES),
            refresh_ttl: Duration::days(DEFAULT_REFRESH_TTL_DAYS),
            issuer: DEFAULT_ISSUER.to_string(),
        }
    }

    /// Read `JWT_SECRET` (required), `JWT_ACCESS_EXPIRATION_MINUTES`,
    /// `JWT_REFRESH_EXPIRATION_DAYS` and `JWT_ISSUER`
    pub fn from_env() -> Result<Self, JwtError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, JwtError> {
        let secret = lookup("JWT_SECRET")
            .filter(|s| !s.is_empty())
            .ok_or(JwtError::MissingSecret)?;
        let mut config = Self::new(secret);

        if let Some(raw) = lookup("JWT_ACCESS_EXPIRATION_MINUTES") {
            config.access_ttl = Duration::minutes(positive(&raw)?);
        }
        if let Some(raw) = lookup("JWT_REFRESH_EXPIRATION_DAYS") {
            config.refresh_ttl = Duration::days(positive(&raw)?);
        }
        if let Some(issuer) = lookup("JWT_ISSUER").filter(|i| !i.is_empty()) {
            config.issuer = issuer;
        }

        Ok(config)
    }

    pub fn with_access_ttl(mut self, ttl: Duration) -> Self {
        self.access_ttl = ttl;
        self
    }

    pub fn with_refresh_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_ttl = ttl;
        self
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }
}

fn positive(raw: &str) -> Result<i64, JwtError> {
    match raw.trim().parse::<i64>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(JwtError::InvalidExpiration),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("JWT_SECRET is not set")]
    MissingSecret,

    #[error("Token lifetimes must be positive whole numbers")]
    InvalidExpiration,

    #[error("Could not sign token: {0}")]
    EncodingError(String),

    #[error("Could not decode token: {0}")]
    DecodingError(String),

    #[error("Token expired")]
    Expired,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Wrong kind of token")]
    InvalidTokenType,
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidToken
            | ErrorKind::InvalidSignature
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidIssuer => Self::InvalidToken,
            _ => Self::DecodingError(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Payload of both token kinds
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(rename = "token_type")]
    pub kind: TokenType,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub jti: String,
}

impl Claims {
    pub fn user_id(&self) -> Result<Uuid, JwtError> {
        self.sub.parse().map_err(|_| JwtError::InvalidToken)
    }
}

/// A signed token and the instant it stops being accepted
#[derive(Debug, Clone)]
pub struct SignedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Login and refresh response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix seconds
    pub access_expires_at: i64,
    /// Unix seconds
    pub refresh_expires_at: i64,
    pub token_type: String,
}

impl TokenPair {
    pub fn bearer(access: SignedToken, refresh: SignedToken) -> Self {
        Self {
            access_expires_at: access.expires_at.timestamp(),
            refresh_expires_at: refresh.expires_at.timestamp(),
            access_token: access.token,
            refresh_token: refresh.token,
            token_type: "Bearer".to_string(),
        }
    }
}

/// Signs and checks tokens with a shared HMAC secret
#[derive(Clone)]
pub struct JwtService {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    pub fn new(config: JwtConfig) -> Self {
        let secret = config.secret.as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            config,
        }
    }

    pub fn from_env() -> Result<Self, JwtError> {
        JwtConfig::from_env().map(Self::new)
    }

    pub fn sign_access(&self, user_id: Uuid, email: &str) -> Result<SignedToken, JwtError> {
        self.sign(user_id, Some(email), TokenType::Access, self.config.access_ttl)
    }

    pub fn sign_refresh(&self, user_id: Uuid) -> Result<SignedToken, JwtError> {
        self.sign(user_id, None, TokenType::Refresh, self.config.refresh_ttl)
    }

    fn sign(
        &self,
        user_id: Uuid,
        email: Option<&str>,
        kind: TokenType,
        ttl: Duration,
    ) -> Result<SignedToken, JwtError> {
        let issued_at = Utc::now();
        let expires_at = issued_at + ttl;

        let claims = Claims {
            sub: user_id.to_string(),
            email: email.map(str::to_string),
            kind,
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            iss: self.config.issuer.clone(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| JwtError::EncodingError(e.to_string()))?;

        Ok(SignedToken { token, expires_at })
    }

    /// Check signature, issuer and expiry, then the token kind
    pub fn verify(&self, token: &str, expected: TokenType) -> Result<Claims, JwtError> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.config.issuer]);
        validation.leeway = 0;

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)?.claims;
        if claims.kind != expected {
            return Err(JwtError::InvalidTokenType);
        }
        Ok(claims)
    }

    pub fn verify_access(&self, token: &str) -> Result<Claims, JwtError> {
        self.verify(token, TokenType::Access)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<Claims, JwtError> {
        self.verify(token, TokenType::Refresh)
    }
}
