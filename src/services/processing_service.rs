//! Due-payment processing.
//!
//! A sweep settles every SCHEDULED or PENDING payment whose due date has
//! arrived. Each payment is settled in its own database transaction:
//!
//! 1. Lock the payment (`FOR UPDATE SKIP LOCKED`, so concurrent sweeps
//!    never settle the same row twice)
//! 2. Lock the owner's wallet row
//! 3. Debit and mark PAID, or mark FAILED when the wallet is short
//! 4. Advance or fail the owning subscription, if any
//! 5. Commit, then email the outcome

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;
use sqlx::{Postgres, Transaction};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::{
    AppState,
    error::AppError,
    models::{
        notification::Email,
        payment::{METHOD_SUBSCRIPTION, Payment, PaymentStatus},
        subscription::{self, Subscription},
        wallet::WalletEntryKind,
    },
    money::format_rupees,
    services::payment_service::{self, record_wallet_entry},
};

/// Upper bound on payments settled by one sweep.
pub const MAX_PAYMENTS_PER_RUN: u32 = 500;

/// Failure reason stored on payments the wallet could not cover.
pub const REASON_INSUFFICIENT_BALANCE: &str = "insufficient_balance";

/// Counts reported by one sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProcessingSummary {
    pub processed: u32,
    pub failed: u32,
}

/// Outcome of settling one payment against a wallet balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Paid { new_balance_paise: i64 },
    Failed,
}

/// Decide whether `balance_paise` covers `amount_paise`.
pub fn settle(balance_paise: i64, amount_paise: i64) -> Settlement {
    if balance_paise >= amount_paise {
        Settlement::Paid {
            new_balance_paise: balance_paise - amount_paise,
        }
    } else {
        Settlement::Failed
    }
}

#[derive(Debug, sqlx::FromRow)]
struct Payer {
    name: String,
    email: String,
    balance_paise: i64,
}

pub fn success_email(payer_name: &str, payment: &Payment, new_balance_paise: i64) -> (String, String) {
    (
        format!("Autopay: Payment Successful for {}", payment.payee),
        format!(
            "Dear {},\n\nYour payment of {} for {} (Due Date: {}) was successful.\n\nYour new balance is {}.\n\nThank you for using Autopay.",
            payer_name,
            format_rupees(payment.amount_paise),
            payment.payee,
            payment.due_date.format("%Y-%m-%d"),
            format_rupees(new_balance_paise),
        ),
    )
}

pub fn failure_email(payer_name: &str, payment: &Payment, balance_paise: i64) -> (String, String) {
    (
        format!("Autopay: Payment Failed for {}", payment.payee),
        format!(
            "Dear {},\n\nYour payment of {} for {} (Due Date: {}) failed due to insufficient balance.\n\nYour current balance is {}.\nPlease top up your account or reschedule the payment.\n\nThank you.",
            payer_name,
            format_rupees(payment.amount_paise),
            payment.payee,
            payment.due_date.format("%Y-%m-%d"),
            format_rupees(balance_paise),
        ),
    )
}

fn due_statuses() -> Vec<&'static str> {
    PaymentStatus::ALL
        .iter()
        .filter(|s| s.is_due_candidate())
        .map(PaymentStatus::as_str)
        .collect()
}

/// Settle every payment due on or before `today`.
pub async fn process_due_payments(
    state: &AppState,
    today: NaiveDate,
) -> Result<ProcessingSummary, AppError> {
    tracing::info!(%today, "Processing due payments");

    let mut summary = ProcessingSummary::default();

    while summary.processed + summary.failed < MAX_PAYMENTS_PER_RUN {
        let Some(email) = settle_next(state, today, &mut summary).await? else {
            break;
        };
        state.notifier.send(&state.pool, email).await;
    }

    tracing::info!(
        processed = summary.processed,
        failed = summary.failed,
        "Payment processing complete"
    );
    Ok(summary)
}

/// Settle the oldest due payment; `None` when nothing is left.
async fn settle_next(
    state: &AppState,
    today: NaiveDate,
    summary: &mut ProcessingSummary,
) -> Result<Option<Email>, AppError> {
    let mut tx = state.pool.begin().await?;

    let payment = sqlx::query_as::<_, Payment>(
        r#"
        SELECT * FROM payments
        WHERE status = ANY($1)
          AND due_date <= $2
        ORDER BY due_date, created_at
        LIMIT 1
        FOR UPDATE SKIP LOCKED
        "#,
    )
    .bind(due_statuses())
    .bind(today)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(payment) = payment else {
        tx.rollback().await?;
        return Ok(None);
    };

    let payer = sqlx::query_as::<_, Payer>(
        "SELECT name, email, balance_paise FROM users WHERE id = $1 FOR UPDATE",
    )
    .bind(payment.user_id)
    .fetch_one(&mut *tx)
    .await?;

    let email = match settle(payer.balance_paise, payment.amount_paise) {
        Settlement::Paid { new_balance_paise } => {
            sqlx::query("UPDATE users SET balance_paise = $1, updated_at = NOW() WHERE id = $2")
                .bind(new_balance_paise)
                .bind(payment.user_id)
                .execute(&mut *tx)
                .await?;

            sqlx::query(
                r#"
                UPDATE payments
                SET status = 'PAID', paid_at = NOW(), failure_reason = NULL, updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(payment.id)
            .execute(&mut *tx)
            .await?;

            record_wallet_entry(
                &mut tx,
                payment.user_id,
                WalletEntryKind::Payment,
                payment.amount_paise,
                Some(payment.id),
                Some(payment.payee.clone()),
            )
            .await?;

            if let Some(subscription_id) = payment.subscription_id {
                schedule_next_cycle(&mut tx, subscription_id, payment.due_date).await?;
            }

            summary.processed += 1;
            tracing::info!(payment_id = %payment.id, user_id = %payment.user_id, "Payment paid");

            let (subject, body) = success_email(&payer.name, &payment, new_balance_paise);
            Email::new(&payer.email, subject, body)
        }
        Settlement::Failed => {
            sqlx::query(
                r#"
                UPDATE payments
                SET status = 'FAILED', failure_reason = $1, updated_at = NOW()
                WHERE id = $2
                "#,
            )
            .bind(REASON_INSUFFICIENT_BALANCE)
            .bind(payment.id)
            .execute(&mut *tx)
            .await?;

            if let Some(subscription_id) = payment.subscription_id {
                sqlx::query(
                    "UPDATE subscriptions SET status = $1, updated_at = NOW() WHERE id = $2 AND status = $3",
                )
                .bind(subscription::status::FAILED)
                .bind(subscription_id)
                .bind(subscription::status::ACTIVE)
                .execute(&mut *tx)
                .await?;
            }

            summary.failed += 1;
            tracing::warn!(
                payment_id = %payment.id,
                user_id = %payment.user_id,
                amount_paise = payment.amount_paise,
                balance_paise = payer.balance_paise,
                "Payment failed: insufficient balance"
            );

            let (subject, body) = failure_email(&payer.name, &payment, payer.balance_paise);
            Email::new(&payer.email, subject, body)
        }
    };

    tx.commit().await?;

    Ok(Some(email))
}

/// After a subscription payment is paid, move the subscription forward one
/// interval and schedule the next charge. Cancelled subscriptions stop here.
async fn schedule_next_cycle(
    tx: &mut Transaction<'_, Postgres>,
    subscription_id: Uuid,
    paid_due_date: NaiveDate,
) -> Result<(), AppError> {
    let subscription = sqlx::query_as::<_, Subscription>(
        r#"
        UPDATE subscriptions
        SET next_due = $2 + interval_days,
            status = $3,
            updated_at = NOW()
        WHERE id = $1 AND status <> $4
        RETURNING *
        "#,
    )
    .bind(subscription_id)
    .bind(paid_due_date)
    .bind(subscription::status::ACTIVE)
    .bind(subscription::status::CANCELLED)
    .fetch_optional(&mut **tx)
    .await?;

    let Some(subscription) = subscription else {
        return Ok(());
    };

    sqlx::query(
        r#"
        INSERT INTO payments (user_id, subscription_id, payee, amount_paise, due_date, status, method)
        VALUES ($1, $2, $3, $4, $5, 'SCHEDULED', $6)
        "#,
    )
    .bind(subscription.user_id)
    .bind(subscription.id)
    .bind(&subscription.label)
    .bind(subscription.amount_paise)
    .bind(subscription.next_due)
    .bind(METHOD_SUBSCRIPTION)
    .execute(&mut **tx)
    .await?;

    tracing::info!(
        subscription_id = %subscription.id,
        next_due = %subscription.next_due,
        "Next subscription payment scheduled"
    );
    Ok(())
}

/// Run the sweep on a fixed interval until the runtime shuts down.
///
/// Runs never overlap; a run that overshoots the interval makes the next
/// tick skip rather than queue up.
pub fn spawn_scheduler(state: Arc<AppState>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = Duration::from_secs(state.config.process_interval_secs);
        let mut tick = tokio::time::interval(period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(interval_secs = period.as_secs(), "Payment scheduler started");

        loop {
            tick.tick().await;
            if let Err(e) = process_due_payments(&state, payment_service::today()).await {
                tracing::error!(error = %e, "Scheduled payment processing failed");
            }
        }
    })
}
