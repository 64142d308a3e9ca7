//! Credential primitives: password hashing and one-time codes.
//!
//! Passwords are hashed with Argon2id and a random salt. One-time codes are
//! stored only as SHA-256 digests so a leaked pending-registration table does
//! not leak usable codes.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::Rng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

lazy_static::lazy_static! {
    /// Digest checked when no identity matches, so unknown emails cost the same as wrong passwords
    static ref DUMMY_PASSWORD_HASH: String =
        hash_password("connectu-timing-equalizer").unwrap_or_default();
}

/// Burn one verification's worth of work without a real digest
pub fn verify_against_dummy(password: &str) {
    let _ = verify_password(password, &DUMMY_PASSWORD_HASH);
}

/// Generate a uniformly random numeric code with exactly `digits` digits
/// (no leading zero), e.g. 100000..=999999 for six digits.
pub fn generate_otp(digits: u32) -> String {
    let digits = digits.clamp(4, 9);
    let low = 10u32.pow(digits - 1);
    let high = 10u32.pow(digits) - 1;
    let code: u32 = rand::rng().random_range(low..=high);
    code.to_string()
}

/// Hash a one-time code for storage and lookup
pub fn hash_code(code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code.trim().as_bytes());
    hex::encode(hasher.finalize())
}

/// Constant-time string comparison
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.len() == b.len() && a.as_bytes().ct_eq(b.as_bytes()).into()
}
