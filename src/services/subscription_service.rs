//! Recurring subscriptions.
//!
//! Creating a subscription also schedules its first payment. Later cycles
//! are scheduled by the due-payment sweep when the previous one is paid.

use chrono::{Duration, NaiveDate};
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::{
        payment::METHOD_SUBSCRIPTION,
        subscription::{
            CreateSubscriptionRequest, DEFAULT_INTERVAL_DAYS, Subscription, resolve_plan, status,
        },
    },
    services::payment_service::parse_due_date,
};

/// First charge date: the requested date, or one interval from today.
pub fn first_due_date(requested: Option<&str>, today: NaiveDate) -> Result<NaiveDate, AppError> {
    match requested.map(str::trim).filter(|d| !d.is_empty()) {
        Some(date) => parse_due_date(date, today),
        None => Ok(today + Duration::days(i64::from(DEFAULT_INTERVAL_DAYS))),
    }
}

/// Create a subscription and its first scheduled payment.
pub async fn create_subscription(
    pool: &DbPool,
    user_id: Uuid,
    request: CreateSubscriptionRequest,
    today: NaiveDate,
) -> Result<Subscription, AppError> {
    let plan = resolve_plan(&request).map_err(AppError::InvalidRequest)?;
    let next_due = first_due_date(request.due_date.as_deref(), today)?;

    let mut tx = pool.begin().await?;

    let subscription = sqlx::query_as::<_, Subscription>(
        r#"
        INSERT INTO subscriptions (user_id, kind, label, amount_paise, interval_days, next_due, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(request.kind.as_str())
    .bind(&plan.label)
    .bind(plan.amount_paise)
    .bind(DEFAULT_INTERVAL_DAYS)
    .bind(next_due)
    .bind(status::ACTIVE)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO payments (user_id, subscription_id, payee, amount_paise, due_date, status, method)
        VALUES ($1, $2, $3, $4, $5, 'SCHEDULED', $6)
        "#,
    )
    .bind(user_id)
    .bind(subscription.id)
    .bind(&subscription.label)
    .bind(subscription.amount_paise)
    .bind(subscription.next_due)
    .bind(METHOD_SUBSCRIPTION)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        user_id = %user_id,
        subscription_id = %subscription.id,
        kind = %subscription.kind,
        amount_paise = subscription.amount_paise,
        "Subscription created"
    );
    Ok(subscription)
}

/// A user's subscriptions, newest first.
pub async fn list_subscriptions(pool: &DbPool, user_id: Uuid) -> Result<Vec<Subscription>, AppError> {
    let subscriptions = sqlx::query_as::<_, Subscription>(
        "SELECT * FROM subscriptions WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(subscriptions)
}

/// Cancel a subscription and every open payment it generated.
///
/// Open payments are locked before the subscription row, the same order the
/// due-payment sweep takes them in.
///
/// # Errors
///
/// - `NotFound`: no such subscription for this user
/// - `Conflict`: already cancelled
pub async fn cancel_subscription(
    pool: &DbPool,
    user_id: Uuid,
    subscription_id: Uuid,
) -> Result<Subscription, AppError> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        SELECT id FROM payments
        WHERE subscription_id = $1
          AND user_id = $2
          AND status IN ('SCHEDULED', 'PENDING', 'FAILED')
        ORDER BY id
        FOR UPDATE
        "#,
    )
    .bind(subscription_id)
    .bind(user_id)
    .execute(&mut *tx)
    .await?;

    let current: String = sqlx::query_scalar(
        "SELECT status FROM subscriptions WHERE id = $1 AND user_id = $2 FOR UPDATE",
    )
    .bind(subscription_id)
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("Subscription"))?;

    if current == status::CANCELLED {
        tx.rollback().await?;
        return Err(AppError::Conflict(
            "Subscription is already cancelled".to_string(),
        ));
    }

    let subscription = sqlx::query_as::<_, Subscription>(
        "UPDATE subscriptions SET status = $1, updated_at = NOW() WHERE id = $2 RETURNING *",
    )
    .bind(status::CANCELLED)
    .bind(subscription_id)
    .fetch_one(&mut *tx)
    .await?;

    let cancelled_payments = sqlx::query(
        r#"
        UPDATE payments
        SET status = 'CANCELLED', updated_at = NOW()
        WHERE subscription_id = $1 AND status IN ('SCHEDULED', 'PENDING', 'FAILED')
        "#,
    )
    .bind(subscription_id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    tx.commit().await?;

    tracing::info!(
        user_id = %user_id,
        subscription_id = %subscription_id,
        cancelled_payments,
        "Subscription cancelled"
    );
    Ok(subscription)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_first_due_date_defaults_to_one_interval() {
        let today = date(2026, 10, 18);
        assert_eq!(first_due_date(None, today).unwrap(), date(2026, 11, 17));
        assert_eq!(first_due_date(Some("  "), today).unwrap(), date(2026, 11, 17));
    }

    #[test]
    fn test_first_due_date_uses_request() {
        let today = date(2026, 10, 18);
        assert_eq!(
            first_due_date(Some("2026-10-18"), today).unwrap(),
            date(2026, 10, 18)
        );
        assert!(first_due_date(Some("2026-10-17"), today).is_err());
        assert!(first_due_date(Some("18/10/2026"), today).is_err());
    }
}
