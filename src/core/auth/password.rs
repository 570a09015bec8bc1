//! Password hashing and strength rules
//!
//! Hashes are bcrypt with an automatic random salt. bcrypt's comparison runs
//! in constant time, and [`PasswordHasher::verify_dummy`] gives callers a way
//! to spend the same amount of work when there is no stored hash to check.

use std::sync::LazyLock;

/// Cost factor for bcrypt hashing (12 is recommended for production)
#[cfg(not(test))]
const BCRYPT_COST: u32 = 12;

#[cfg(test)]
const BCRYPT_COST: u32 = 4;

/// Minimum accepted password length
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Characters that satisfy the "special character" rule
pub const SPECIAL_CHARACTERS: &str = "@$!%*?&#";

/// Hash checked when the account does not exist
static DUMMY_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| bcrypt::hash("authflow-dummy-password", BCRYPT_COST).ok());

/// Password error types
#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("Password must be at least 8 characters")]
    TooShort,

    #[error("Password needs upper and lower case letters, a digit and one of @$!%*?&#")]
    TooWeak,

    #[error("Password hashing error: {0}")]
    HashingError(String),
}

impl From<bcrypt::BcryptError> for PasswordError {
    fn from(err: bcrypt::BcryptError) -> Self {
        PasswordError::HashingError(err.to_string())
    }
}

/// One-way password hashing
#[derive(Debug, Clone, Copy, Default)]
pub struct PasswordHasher;

impl PasswordHasher {
    /// Hash a password with a fresh salt
    pub fn hash(password: &str) -> Result<String, PasswordError> {
        Ok(bcrypt::hash(password, BCRYPT_COST)?)
    }

    /// Check a password against a stored hash.
    ///
    /// A wrong password is `Ok(false)`; a malformed hash is an error.
    pub fn verify(password: &str, hash: &str) -> Result<bool, PasswordError> {
        Ok(bcrypt::verify(password, hash)?)
    }

    /// Run a verification against a fixed hash and discard the result
    pub fn verify_dummy(password: &str) {
        if let Some(hash) = DUMMY_HASH.as_deref() {
            let _ = bcrypt::verify(password, hash);
        }
    }

    /// Enforce the password strength rules
    pub fn validate_strength(password: &str) -> Result<(), PasswordError> {
        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(PasswordError::TooShort);
        }

        let has_uppercase = password.chars().any(|c| c.is_ascii_uppercase());
        let has_lowercase = password.chars().any(|c| c.is_ascii_lowercase());
        let has_digit = password.chars().any(|c| c.is_ascii_digit());
        let has_special = password.chars().any(|c| SPECIAL_CHARACTERS.contains(c));

        if !has_uppercase || !has_lowercase || !has_digit || !has_special {
            return Err(PasswordError::TooWeak);
        }

        Ok(())
    }
}
