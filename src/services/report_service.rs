//! Payment reports: per-status summary and CSV export.

use serde::Serialize;
use uuid::Uuid;

use crate::{
    db::DbPool,
    error::AppError,
    models::payment::{Payment, PaymentStatus},
    money::paise_to_rupees,
};

/// Count and total for one payment status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusTotal {
    pub status: &'static str,
    pub count: i64,
    pub total: f64,
    pub total_paise: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentSummary {
    pub by_status: Vec<StatusTotal>,
    pub total_count: i64,
    pub total_amount: f64,
    pub total_amount_paise: i64,
}

/// Build a summary from `(status, count, total_paise)` rows.
///
/// Every known status appears, with zeros when it has no rows.
pub fn summarize(rows: &[(String, i64, i64)]) -> PaymentSummary {
    let by_status: Vec<StatusTotal> = PaymentStatus::ALL
        .iter()
        .map(|status| {
            let (count, total_paise) = rows
                .iter()
                .find(|(s, _, _)| s == status.as_str())
                .map(|(_, c, t)| (*c, *t))
                .unwrap_or((0, 0));
            StatusTotal {
                status: status.as_str(),
                count,
                total: paise_to_rupees(total_paise),
                total_paise,
            }
        })
        .collect();

    let total_count = by_status.iter().map(|s| s.count).sum();
    let total_amount_paise = by_status.iter().map(|s| s.total_paise).sum();

    PaymentSummary {
        by_status,
        total_count,
        total_amount: paise_to_rupees(total_amount_paise),
        total_amount_paise,
    }
}

pub async fn payment_summary(pool: &DbPool, user_id: Uuid) -> Result<PaymentSummary, AppError> {
    let rows: Vec<(String, i64, i64)> = sqlx::query_as(
        r#"
        SELECT status, COUNT(*), COALESCE(SUM(amount_paise), 0)::BIGINT
        FROM payments
        WHERE user_id = $1
        GROUP BY status
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(summarize(&rows))
}

const CSV_HEADER: &str = "ID,Payee,Amount,Due Date,Status,Method,Created At";

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Render payments as CSV with a header row. Lines end with CRLF.
pub fn payments_csv(payments: &[Payment]) -> String {
    let mut out = String::with_capacity(64 * (payments.len() + 1));
    out.push_str(CSV_HEADER);
    out.push_str("\r\n");

    for p in payments {
        let row = [
            p.id.to_string(),
            csv_field(&p.payee),
            format!("{:.2}", paise_to_rupees(p.amount_paise)),
            p.due_date.format("%Y-%m-%d").to_string(),
            csv_field(&p.status),
            csv_field(&p.method),
            p.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        ];
        out.push_str(&row.join(","));
        out.push_str("\r\n");
    }
    out
}

/// CSV export of every payment owned by `user_id`.
///
/// Returns `NotFound` when the user has no payments.
pub async fn export_payments_csv(pool: &DbPool, user_id: Uuid) -> Result<String, AppError> {
    let payments = sqlx::query_as::<_, Payment>(
        "SELECT * FROM payments WHERE user_id = $1 ORDER BY due_date DESC, created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    if payments.is_empty() {
        return Err(AppError::NotFound("Payments"));
    }

    tracing::info!(user_id = %user_id, rows = payments.len(), "Payment report exported");
    Ok(payments_csv(&payments))
}
