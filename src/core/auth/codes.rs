//! Generation of the short single-use codes and refresh token digests

use rand::Rng;
use sha2::{Digest, Sha256};

/// Number of times a flow regenerates a code after a collision
pub const MAX_CODE_ATTEMPTS: usize = 5;

/// Length of a password reset token
pub const RESET_TOKEN_LEN: usize = 6;

const BASE36_UPPER: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// 4-digit numeric email verification code, uniform in 1000..=9999
pub fn generate_verification_code() -> String {
    rand::thread_rng().gen_range(1000..=9999).to_string()
}

/// 6-character uppercase base-36 password reset token
pub fn generate_reset_token() -> String {
    let mut rng = rand::thread_rng();
    (0..RESET_TOKEN_LEN)
        .map(|_| BASE36_UPPER[rng.gen_range(0..BASE36_UPPER.len())] as char)
        .collect()
}

/// Hash a refresh token for storage
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}
