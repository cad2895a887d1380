//! User data models and API request/response types.
//!
//! This module defines:
//! - `User`: Database entity representing a registered user
//! - Request bodies for signup, login and password reset
//! - `UserResponse`: Profile returned to clients

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::paise_to_rupees;

/// Represents a user record from the database.
///
/// # Database Table
///
/// Maps to the `users` table. Each user:
/// - Is identified by a unique lowercase email
/// - Holds an AutoPay wallet balance in paise, debited by due payments
/// - May be linked to one simulated bank account
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,

    pub name: String,

    /// Lowercased at signup; lookups lowercase their input too.
    pub email: String,

    pub phone_number: String,

    /// SHA-256 of salt || password, hex encoded
    pub password_hash: String,

    /// 16 random bytes, hex encoded
    pub password_salt: String,

    /// Wallet balance in paise
    ///
    /// Must be >= 0 (enforced by database CHECK constraint).
    pub balance_paise: i64,

    /// Linked bank account, set by the bank OTP flow
    pub bank_account_id: Option<Uuid>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Request body for creating an account after the signup OTP is verified.
///
/// # JSON Example
///
/// ```json
/// {
///   "full_name": "Asha Patil",
///   "email": "asha@example.com",
///   "phone_number": "9876543210",
///   "password": "123456"
/// }
/// ```
///
/// `name` is accepted as an alias of `full_name`.
#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    #[serde(alias = "name")]
    pub full_name: String,
    pub email: String,
    pub phone_number: String,
    pub password: String,
}

/// Request body for `POST /api/login`.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Response body for a successful login.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: String,
    /// Opaque bearer token for the `Authorization` header
    pub token: String,
    pub user_id: Uuid,
    pub username: String,
    pub expires_at: DateTime<Utc>,
}

/// Request body for `POST /api/forgot-password-link`.
#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

/// Request body for `POST /api/reset-password-with-token`.
#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub token: String,
    pub new_password: String,
}

/// Profile returned by `GET /api/user/{user_id}`.
///
/// # JSON Example
///
/// ```json
/// {
///   "id": "550e8400-e29b-41d4-a716-446655440000",
///   "name": "Asha Patil",
///   "email": "asha@example.com",
///   "phone_number": "9876543210",
///   "bankName": "GlobalBank",
///   "balance": 1250.5,
///   "balance_paise": 125050,
///   "failed_payments_count": 1
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone_number: String,
    #[serde(rename = "bankName")]
    pub bank_name: Option<String>,
    pub balance: f64,
    pub balance_paise: i64,
    pub failed_payments_count: i64,
}

impl UserResponse {
    pub fn new(user: User, bank_name: Option<String>, failed_payments_count: i64) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            phone_number: user.phone_number,
            bank_name,
            balance: paise_to_rupees(user.balance_paise),
            balance_paise: user.balance_paise,
            failed_payments_count,
        }
    }
}

/// Generic `{ "message": ... }` body used by several endpoints.
#[derive(Debug, Serialize)]
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
