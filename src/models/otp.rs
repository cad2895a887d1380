//! One-time code models.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

/// What a one-time code unlocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpPurpose {
    /// Creating a user account for an email
    Signup,
    /// Linking a bank account to the signed-in user
    BankLink,
}

impl OtpPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpPurpose::Signup => "signup",
            OtpPurpose::BankLink => "bank_link",
        }
    }
}

/// Represents an OTP record from the database.
///
/// `subject` is the lowercased email for signup codes and
/// `bank_name:account_number` for bank-link codes. Only the SHA-256 of the
/// code is stored.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OtpCode {
    pub id: Uuid,
    pub purpose: String,
    pub subject: String,
    pub code_hash: String,
    pub attempts: i32,
    pub expires_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Request body for `POST /api/send-otp`.
#[derive(Debug, Deserialize)]
pub struct SendOtpRequest {
    pub email: String,
    pub phone_number: String,
}

/// Request body for `POST /api/verify-otp`.
#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    pub email: String,
    pub otp_code: String,
}

/// Subject key for bank-link codes.
pub fn bank_subject(bank_name: &str, account_number: &str) -> String {
    format!("{}:{}", bank_name, account_number.trim())
}
