//! Payment scheduling and wallet deposits.
//!
//! This service handles:
//! - Validation of payee, amount, date and method
//! - Status transitions for reschedule and cancel
//! - Wallet credits, with atomic balance update plus ledger row

use chrono::{Local, NaiveDate};
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        payment::{
            DepositSource, METHOD_CONNECTED_BANK, METHOD_DEFAULT, Payment, PaymentStatus,
            SchedulePaymentRequest, UpdatePaymentRequest,
        },
        wallet::{WalletEntryKind, WalletTransaction},
    },
    services::bank_service,
};

/// Today's date in the server's local timezone.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Parse a `YYYY-MM-DD` due date that is not before `today`.
pub fn parse_due_date(text: &str, today: NaiveDate) -> Result<NaiveDate, AppError> {
    let date = NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d").map_err(|_| {
        AppError::InvalidRequest("Due date must be in YYYY-MM-DD format".to_string())
    })?;
    if date < today {
        return Err(AppError::InvalidRequest(
            "Due date cannot be in the past".to_string(),
        ));
    }
    Ok(date)
}

/// Trimmed payee name, 1 to 100 characters.
pub fn validate_payee(payee: &str) -> Result<String, AppError> {
    let payee = payee.trim();
    if payee.is_empty() {
        return Err(AppError::InvalidRequest("Payee is required".to_string()));
    }
    if payee.chars().count() > 100 {
        return Err(AppError::InvalidRequest(
            "Payee must be at most 100 characters".to_string(),
        ));
    }
    Ok(payee.to_string())
}

/// Trimmed method, defaulting to "Other", at most 50 characters.
pub fn normalize_method(method: Option<&str>) -> Result<String, AppError> {
    let method = method.map(str::trim).filter(|m| !m.is_empty());
    match method {
        None => Ok(METHOD_DEFAULT.to_string()),
        Some(m) if m.chars().count() > 50 => Err(AppError::InvalidRequest(
            "Payment method must be at most 50 characters".to_string(),
        )),
        Some(m) => Ok(m.to_string()),
    }
}

/// Which payments a listing returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentFilter {
    /// Everything except FAILED (the payment list screen)
    NotFailed,
    /// FAILED or PENDING (the reschedule screen)
    FailedOrPending,
    /// Every payment (reports)
    All,
}

impl PaymentFilter {
    fn statuses(&self) -> Vec<&'static str> {
        let keep = |s: &PaymentStatus| match self {
            PaymentFilter::NotFailed => *s != PaymentStatus::Failed,
            PaymentFilter::FailedOrPending => {
                matches!(s, PaymentStatus::Failed | PaymentStatus::Pending)
            }
            PaymentFilter::All => true,
        };
        PaymentStatus::ALL
            .iter()
            .filter(|s| keep(s))
            .map(PaymentStatus::as_str)
            .collect()
    }
}

/// Schedule a new payment for `user_id`.
///
/// # Errors
///
/// - `InvalidRequest`: bad payee, amount, date, or no linked bank for
///   the "Connected Bank" method
/// - `InsufficientBalance`: "Connected Bank" method and the bank balance is short
pub async fn schedule_payment(
    pool: &DbPool,
    user_id: Uuid,
    request: SchedulePaymentRequest,
    today: NaiveDate,
) -> Result<Payment, AppError> {
    let payee = validate_payee(&request.payee)?;
    let amount_paise = request.amount.to_paise()?;
    let due_date = parse_due_date(&request.due_date, today)?;
    let method = normalize_method(request.method.as_deref())?;

    if method == METHOD_CONNECTED_BANK {
        let account = bank_service::linked_account(pool, user_id).await?.ok_or_else(|| {
            AppError::InvalidRequest("No bank account connected.".to_string())
        })?;
        if account.balance_paise < amount_paise {
            return Err(AppError::InsufficientBalance);
        }
    }

    let payment = sqlx::query_as::<_, Payment>(
        r#"
        INSERT INTO payments (user_id, payee, amount_paise, due_date, status, method)
        VALUES ($1, $2, $3, $4, 'SCHEDULED', $5)
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(&payee)
    .bind(amount_paise)
    .bind(due_date)
    .bind(&method)
    .fetch_one(pool)
    .await?;

    tracing::info!(
        user_id = %user_id,
        payment_id = %payment.id,
        amount_paise,
        due_date = %due_date,
        "Payment scheduled"
    );
    Ok(payment)
}

/// List a user's payments, newest due date first.
pub async fn list_payments(
    pool: &DbPool,
    user_id: Uuid,
    filter: PaymentFilter,
) -> Result<Vec<Payment>, AppError> {
    let payments = sqlx::query_as::<_, Payment>(
        r#"
        SELECT * FROM payments
        WHERE user_id = $1 AND status = ANY($2)
        ORDER BY due_date DESC, created_at DESC
        "#,
    )
    .bind(user_id)
    .bind(filter.statuses())
    .fetch_all(pool)
    .await?;
    Ok(payments)
}

/// Lock one of the user's payments and return it with its parsed status.
async fn lock_payment(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    payment_id: Uuid,
) -> Result<(Payment, PaymentStatus), AppError> {
    let payment = sqlx::query_as::<_, Payment>(
        "SELECT * FROM payments WHERE id = $1 AND user_id = $2 FOR UPDATE",
    )
    .bind(payment_id)
    .bind(user_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or(AppError::NotFound("Payment"))?;

    let status = payment
        .status()
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;
    Ok((payment, status))
}

/// Edit an open payment and put it back on the schedule.
///
/// # Errors
///
/// - `NotFound`: no such payment for this user
/// - `Conflict`: the payment is PAID or CANCELLED
pub async fn reschedule_payment(
    pool: &DbPool,
    user_id: Uuid,
    payment_id: Uuid,
    request: UpdatePaymentRequest,
    today: NaiveDate,
) -> Result<Payment, AppError> {
    let payee = request.payee.as_deref().map(validate_payee).transpose()?;
    let amount_paise = request.amount.as_ref().map(|a| a.to_paise()).transpose()?;
    let due_date = request
        .due_date
        .as_deref()
        .map(|d| parse_due_date(d, today))
        .transpose()?;
    let method = match request.method.as_deref() {
        Some(m) => Some(normalize_method(Some(m))?),
        None => None,
    };

    let mut tx = pool.begin().await?;

    let (current, status) = lock_payment(&mut tx, user_id, payment_id).await?;
    if status.is_terminal() {
        tx.rollback().await?;
        return Err(AppError::Conflict(format!(
            "Payment is already {} and cannot be changed",
            status
        )));
    }

    // Without a new date a past-due payment is retried by the next sweep.
    let due_date = due_date.unwrap_or(current.due_date);

    let updated = sqlx::query_as::<_, Payment>(
        r#"
        UPDATE payments
        SET payee = $1,
            amount_paise = $2,
            due_date = $3,
            method = $4,
            status = 'SCHEDULED',
            failure_reason = NULL,
            updated_at = NOW()
        WHERE id = $5
        RETURNING *
        "#,
    )
    .bind(payee.unwrap_or(current.payee))
    .bind(amount_paise.unwrap_or(current.amount_paise))
    .bind(due_date)
    .bind(method.unwrap_or(current.method))
    .bind(payment_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(user_id = %user_id, payment_id = %payment_id, from = %status, "Payment rescheduled");
    Ok(updated)
}

/// Cancel an open payment.
pub async fn cancel_payment(
    pool: &DbPool,
    user_id: Uuid,
    payment_id: Uuid,
) -> Result<Payment, AppError> {
    let mut tx = pool.begin().await?;

    let (_, status) = lock_payment(&mut tx, user_id, payment_id).await?;
    if status.is_terminal() {
        tx.rollback().await?;
        return Err(AppError::Conflict(format!(
            "Payment is already {} and cannot be cancelled",
            status
        )));
    }

    let cancelled = sqlx::query_as::<_, Payment>(
        "UPDATE payments SET status = 'CANCELLED', updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(payment_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(user_id = %user_id, payment_id = %payment_id, "Payment cancelled");
    Ok(cancelled)
}

/// Insert a wallet ledger row inside the caller's transaction.
pub async fn record_wallet_entry(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    kind: WalletEntryKind,
    amount_paise: i64,
    payment_id: Option<Uuid>,
    description: Option<String>,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO wallet_transactions (user_id, kind, amount_paise, payment_id, description)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(user_id)
    .bind(kind.as_str())
    .bind(amount_paise)
    .bind(payment_id)
    .bind(description)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Credit the wallet and return the new balance in paise.
///
/// With `DepositSource::Bank` the linked bank account is debited in the same
/// transaction.
pub async fn deposit(
    pool: &DbPool,
    user_id: Uuid,
    amount_paise: i64,
    source: DepositSource,
) -> Result<i64, AppError> {
    if amount_paise <= 0 {
        return Err(AppError::InvalidRequest(
            "Amount must be positive".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;

    let bank_account_id: Option<Uuid> =
        sqlx::query_scalar("SELECT bank_account_id FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(AppError::NotFound("User"))?;

    let kind = match source {
        DepositSource::External => WalletEntryKind::Deposit,
        DepositSource::Bank => {
            let bank_account_id = bank_account_id.ok_or_else(|| {
                AppError::InvalidRequest("No bank account connected.".to_string())
            })?;

            let bank_balance: i64 = sqlx::query_scalar(
                "SELECT balance_paise FROM bank_accounts WHERE id = $1 FOR UPDATE",
            )
            .bind(bank_account_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(AppError::NotFound("Bank account"))?;

            if bank_balance < amount_paise {
                tx.rollback().await?;
                return Err(AppError::InsufficientBalance);
            }

            sqlx::query(
                "UPDATE bank_accounts SET balance_paise = balance_paise - $1, updated_at = NOW() WHERE id = $2",
            )
            .bind(amount_paise)
            .bind(bank_account_id)
            .execute(&mut *tx)
            .await?;

            WalletEntryKind::BankTransfer
        }
    };

    let new_balance: i64 = sqlx::query_scalar(
        r#"
        UPDATE users
        SET balance_paise = balance_paise + $1,
            updated_at = NOW()
        WHERE id = $2
        RETURNING balance_paise
        "#,
    )
    .bind(amount_paise)
    .bind(user_id)
    .fetch_one(&mut *tx)
    .await?;

    record_wallet_entry(&mut tx, user_id, kind, amount_paise, None, None).await?;

    tx.commit().await?;

    tracing::info!(user_id = %user_id, amount_paise, kind = kind.as_str(), "Wallet credited");
    Ok(new_balance)
}

/// Most recent wallet ledger rows, newest first.
pub async fn list_wallet_transactions(
    pool: &DbPool,
    user_id: Uuid,
    limit: i64,
) -> Result<Vec<WalletTransaction>, AppError> {
    let rows = sqlx::query_as::<_, WalletTransaction>(
        r#"
        SELECT * FROM wallet_transactions
        WHERE user_id = $1
        ORDER BY created_at DESC
        LIMIT $2
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
