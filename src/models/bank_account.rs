//! Simulated bank account models.
//!
//! Each supported bank is a logical collection of account records keyed by
//! account number. Users link one of them through an OTP sent to the
//! account's registered email.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::{RawAmount, paise_to_rupees};

/// Banks the simulated store knows about.
pub const SUPPORTED_BANKS: [&str; 2] = ["GlobalBank", "OrbitalBank"];

/// Whether `name` is one of [`SUPPORTED_BANKS`].
pub fn is_supported_bank(name: &str) -> bool {
    SUPPORTED_BANKS.contains(&name)
}

/// Represents a bank account record from the database.
///
/// # Database Table
///
/// Maps to the `bank_accounts` table, unique on (`bank_name`, `account_number`).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BankAccount {
    pub id: Uuid,
    pub bank_name: String,
    pub account_number: String,
    pub phone_number: String,
    /// Address that receives the bank-link OTP
    pub email_id: String,
    /// Must be >= 0 (enforced by database CHECK constraint)
    pub balance_paise: i64,
    pub updated_at: DateTime<Utc>,
}

/// Request body for `POST /api/send-bank-otp`.
#[derive(Debug, Deserialize)]
pub struct SendBankOtpRequest {
    pub bank_name: String,
    pub phone_number: String,
    pub account_number: String,
}

/// Request body for `POST /api/verify-bank-otp`.
#[derive(Debug, Deserialize)]
pub struct VerifyBankOtpRequest {
    pub bank_name: String,
    pub account_number: String,
    pub otp_code: String,
}

/// Response to a bank OTP request; the email is masked.
#[derive(Debug, Serialize)]
pub struct BankOtpSentResponse {
    pub message: String,
    pub email_hint: String,
}

/// Request body for `POST /api/bank-transfer`.
///
/// ```json
/// {
///   "to_bank_name": "OrbitalBank",
///   "to_account_number": "700800900100",
///   "amount": 2500
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct BankTransferRequest {
    pub to_bank_name: String,
    pub to_account_number: String,
    pub amount: RawAmount,
}

/// Linked bank account as shown to its owner.
#[derive(Debug, Serialize)]
pub struct BankAccountResponse {
    pub bank_name: String,
    pub account_number: String,
    pub balance: f64,
    pub balance_paise: i64,
    pub updated_at: DateTime<Utc>,
}

impl From<BankAccount> for BankAccountResponse {
    fn from(account: BankAccount) -> Self {
        Self {
            bank_name: account.bank_name,
            account_number: account.account_number,
            balance: paise_to_rupees(account.balance_paise),
            balance_paise: account.balance_paise,
            updated_at: account.updated_at,
        }
    }
}

/// Result of a completed bank transfer.
#[derive(Debug, Serialize)]
pub struct BankTransferResponse {
    pub message: String,
    pub from_balance: f64,
    pub from_balance_paise: i64,
}

/// Mask an email for display: `asha.patil@example.com` -> `as********@example.com`.
pub fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => {
            let visible: String = local.chars().take(2).collect();
            let hidden = local.chars().count().saturating_sub(2).max(1);
            format!("{}{}@{}", visible, "*".repeat(hidden), domain)
        }
        None => "*".repeat(email.chars().count().max(1)),
    }
}
