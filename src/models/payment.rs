//! Payment data models and API request/response types.
//!
//! This module defines:
//! - `Payment`: Database entity representing a scheduled bill payment
//! - `PaymentStatus`: The status machine a payment moves through
//! - Request types for scheduling, rescheduling and wallet deposits
//! - `PaymentResponse`: Response body returned to clients

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::money::{RawAmount, paise_to_rupees};

/// Payment method that draws on the linked bank account at scheduling time.
pub const METHOD_CONNECTED_BANK: &str = "Connected Bank";

/// Method used when the client does not send one.
pub const METHOD_DEFAULT: &str = "Other";

/// Method recorded on payments generated by a subscription.
pub const METHOD_SUBSCRIPTION: &str = "Subscription";

/// Lifecycle of a payment.
///
/// ```text
/// SCHEDULED ──┬─> PAID
/// PENDING ────┼─> FAILED ──> SCHEDULED (reschedule)
///             └─> CANCELLED
/// ```
///
/// `PAID` and `CANCELLED` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Scheduled,
    Pending,
    Paid,
    Failed,
    Cancelled,
}

impl PaymentStatus {
    /// Every status, in the order reports list them.
    pub const ALL: [PaymentStatus; 5] = [
        PaymentStatus::Scheduled,
        PaymentStatus::Paid,
        PaymentStatus::Failed,
        PaymentStatus::Pending,
        PaymentStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Scheduled => "SCHEDULED",
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Paid => "PAID",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Cancelled => "CANCELLED",
        }
    }

    /// No further change is allowed once a payment is paid or cancelled.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Paid | PaymentStatus::Cancelled)
    }

    /// Statuses the due-payment sweep picks up.
    pub fn is_due_candidate(&self) -> bool {
        matches!(self, PaymentStatus::Scheduled | PaymentStatus::Pending)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SCHEDULED" => Ok(PaymentStatus::Scheduled),
            "PENDING" => Ok(PaymentStatus::Pending),
            "PAID" => Ok(PaymentStatus::Paid),
            "FAILED" => Ok(PaymentStatus::Failed),
            "CANCELLED" => Ok(PaymentStatus::Cancelled),
            other => Err(format!("unknown payment status: {other}")),
        }
    }
}

/// Represents a payment record from the database.
///
/// # Database Table
///
/// Maps to the `payments` table. Each payment:
/// - Belongs to one user (via `user_id`)
/// - Optionally belongs to a subscription that generated it
/// - Stores amount in paise (never floats)
/// - Tracks status as one of the `PaymentStatus` strings
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub subscription_id: Option<Uuid>,
    pub payee: String,
    pub amount_paise: i64,
    pub due_date: NaiveDate,
    pub status: String,
    pub method: String,
    /// Set when the sweep marks the payment FAILED
    pub failure_reason: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Parsed status. Rows are constrained by a CHECK, so an unknown string
    /// only appears if the schema and code disagree.
    pub fn status(&self) -> Result<PaymentStatus, String> {
        self.status.parse()
    }
}

/// Request to schedule a new payment.
///
/// # JSON Example
///
/// ```json
/// {
///   "payee": "City Electricity Board",
///   "amount": "1450.00",
///   "due_date": "2026-11-05",
///   "method": "Connected Bank"
/// }
/// ```
///
/// # Validation
///
/// - `payee`: non-empty, at most 100 characters
/// - `amount`: positive, at most two decimals
/// - `due_date`: `YYYY-MM-DD`, not in the past
/// - `method`: optional, defaults to "Other"
#[derive(Debug, Deserialize)]
pub struct SchedulePaymentRequest {
    pub payee: String,
    pub amount: RawAmount,
    pub due_date: String,
    #[serde(default)]
    pub method: Option<String>,
}

/// Request to reschedule or edit an open payment.
///
/// Every field is optional; missing fields keep their current value. The
/// payment always returns to `SCHEDULED`. A `status` field sent by older
/// clients is ignored.
#[derive(Debug, Deserialize)]
pub struct UpdatePaymentRequest {
    #[serde(default)]
    pub payee: Option<String>,
    #[serde(default)]
    pub amount: Option<RawAmount>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
}

/// Where a wallet deposit comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepositSource {
    /// Money arriving from outside the system
    #[default]
    External,
    /// Pulled from the user's linked bank account
    Bank,
}

/// Request body for `POST /api/deposit-balance/{user_id}`.
#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub amount: RawAmount,
    #[serde(default)]
    pub source: DepositSource,
}

/// Response returned after a deposit.
#[derive(Debug, Serialize)]
pub struct DepositResponse {
    pub message: String,
    pub new_balance: f64,
    pub new_balance_paise: i64,
}

/// Response returned after scheduling a payment.
#[derive(Debug, Serialize)]
pub struct ScheduledResponse {
    pub message: String,
    pub payment_id: Uuid,
}

/// Payment as returned to clients.
///
/// # JSON Example
///
/// ```json
/// {
///   "id": "770e8400-e29b-41d4-a716-446655440002",
///   "user_id": "550e8400-e29b-41d4-a716-446655440000",
///   "payee": "City Electricity Board",
///   "amount": 1450.0,
///   "amount_paise": 145000,
///   "due_date": "2026-11-05",
///   "status": "SCHEDULED",
///   "method": "Connected Bank",
///   "created_at": "2026-10-18 09:30:00"
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub subscription_id: Option<Uuid>,
    pub payee: String,
    pub amount: f64,
    pub amount_paise: i64,
    pub due_date: String,
    pub status: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub created_at: String,
}

impl From<Payment> for PaymentResponse {
    fn from(payment: Payment) -> Self {
        Self {
            id: payment.id,
            user_id: payment.user_id,
            subscription_id: payment.subscription_id,
            payee: payment.payee,
            amount: paise_to_rupees(payment.amount_paise),
            amount_paise: payment.amount_paise,
            due_date: payment.due_date.format("%Y-%m-%d").to_string(),
            status: payment.status,
            method: payment.method,
            failure_reason: payment.failure_reason,
            created_at: payment.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in PaymentStatus::ALL {
            assert_eq!(status.as_str().parse::<PaymentStatus>().unwrap(), status);
        }
        assert!("paid".parse::<PaymentStatus>().is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(PaymentStatus::Paid.is_terminal());
        assert!(PaymentStatus::Cancelled.is_terminal());
        assert!(!PaymentStatus::Failed.is_terminal());
        assert!(PaymentStatus::Pending.is_due_candidate());
        assert!(!PaymentStatus::Failed.is_due_candidate());
    }

    #[test]
    fn test_update_request_ignores_status_field() {
        let req: UpdatePaymentRequest =
            serde_json::from_str(r#"{"amount": 120.5, "due_date": "2026-12-01", "status": "PAID"}"#)
                .unwrap();
        assert_eq!(req.amount.unwrap().to_paise().unwrap(), 12_050);
        assert!(req.payee.is_none());
    }

    #[test]
    fn test_deposit_source_defaults_to_external() {
        let req: DepositRequest = serde_json::from_str(r#"{"amount": "500"}"#).unwrap();
        assert_eq!(req.source, DepositSource::External);

        let req: DepositRequest =
            serde_json::from_str(r#"{"amount": 500, "source": "bank"}"#).unwrap();
        assert_eq!(req.source, DepositSource::Bank);
    }

    #[test]
    fn test_response_formats_dates() {
        let now = Utc::now();
        let payment = Payment {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            subscription_id: None,
            payee: "Water Board".to_string(),
            amount_paise: 45_000,
            due_date: NaiveDate::from_ymd_opt(2026, 11, 5).unwrap(),
            status: "SCHEDULED".to_string(),
            method: "Other".to_string(),
            failure_reason: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        };
        let response = PaymentResponse::from(payment);
        assert_eq!(response.due_date, "2026-11-05");
        assert_eq!(response.amount, 450.0);
        assert_eq!(response.created_at.len(), "2026-10-18 09:30:00".len());
    }
}
