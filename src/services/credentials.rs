//! Hashing, token generation and input rules for credentials.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::AppError;

/// SHA-256 of `input`, hex encoded (64 chars).
pub fn sha256_hex(input: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input);
    hex::encode(hasher.finalize())
}

/// Cryptographically random token: 32 bytes, 64 hex chars.
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}

/// Random per-user salt: 16 bytes, 32 hex chars.
pub fn generate_salt() -> String {
    let bytes: [u8; 16] = rand::random();
    hex::encode(bytes)
}

/// Hash a password with its salt.
pub fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Compare a password against a stored hash in constant time.
pub fn verify_password(salt: &str, password: &str, expected_hash: &str) -> bool {
    constant_time_eq(&hash_password(salt, password), expected_hash)
}

pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Passwords are 6-digit numeric PINs.
pub fn validate_pin(password: &str) -> Result<(), AppError> {
    if password.len() == 6 && password.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(AppError::InvalidRequest(
            "Password must be a 6-digit number.".to_string(),
        ))
    }
}

/// Lowercase and trim an email, rejecting obviously malformed input.
pub fn normalize_email(email: &str) -> Result<String, AppError> {
    let email = email.trim().to_lowercase();
    let invalid = || AppError::InvalidRequest("Enter a valid email address".to_string());

    if email.len() > 255 || email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (local, domain) = email.split_once('@').ok_or_else(invalid)?;
    if local.is_empty()
        || domain.contains('@')
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
    {
        return Err(invalid());
    }
    Ok(email)
}

/// Indian mobile numbers: exactly 10 digits.
pub fn validate_phone(phone: &str) -> Result<String, AppError> {
    let phone = phone.trim();
    if phone.len() == 10 && phone.chars().all(|c| c.is_ascii_digit()) {
        Ok(phone.to_string())
    } else {
        Err(AppError::InvalidRequest(
            "Enter a valid 10-digit phone number".to_string(),
        ))
    }
}
