//! Wallet ledger entries.
//!
//! Every change to a user's wallet balance writes one row to
//! `wallet_transactions` in the same database transaction as the balance
//! update.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::paise_to_rupees;

/// Kind of wallet movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletEntryKind {
    /// Credit from outside the system
    Deposit,
    /// Debit by the due-payment sweep
    Payment,
    /// Credit pulled from the linked bank account
    BankTransfer,
}

impl WalletEntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletEntryKind::Deposit => "deposit",
            WalletEntryKind::Payment => "payment",
            WalletEntryKind::BankTransfer => "bank_transfer",
        }
    }
}

/// Represents a wallet ledger row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WalletTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: String,
    pub amount_paise: i64,
    pub payment_id: Option<Uuid>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Query string for `GET /api/wallet/transactions`.
#[derive(Debug, Deserialize)]
pub struct WalletQuery {
    pub limit: Option<i64>,
}

impl WalletQuery {
    pub const DEFAULT_LIMIT: i64 = 50;
    pub const MAX_LIMIT: i64 = 200;

    /// Requested limit clamped to `1..=MAX_LIMIT`.
    pub fn limit(&self) -> i64 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }
}

/// Wallet ledger row as returned to clients.
#[derive(Debug, Serialize)]
pub struct WalletTransactionResponse {
    pub id: Uuid,
    pub kind: String,
    pub amount: f64,
    pub amount_paise: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<WalletTransaction> for WalletTransactionResponse {
    fn from(row: WalletTransaction) -> Self {
        Self {
            id: row.id,
            kind: row.kind,
            amount: paise_to_rupees(row.amount_paise),
            amount_paise: row.amount_paise,
            payment_id: row.payment_id,
            description: row.description,
            created_at: row.created_at,
        }
    }
}
