//! Report HTTP handlers.

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::header,
    response::IntoResponse,
};
use uuid::Uuid;

use crate::{
    AppState,
    error::AppError,
    middleware::auth::AuthUser,
    services::report_service::{self, PaymentSummary},
};

/// Per-status counts and totals for the caller's payments.
///
/// # Endpoint
///
/// `GET /api/reports/summary/{user_id}`
///
/// Every status is listed, with zeros when it has no payments.
pub async fn payment_summary(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<PaymentSummary>, AppError> {
    auth.ensure_self(user_id)?;
    let summary = report_service::payment_summary(&state.pool, user_id).await?;
    Ok(Json(summary))
}

/// Download the caller's payments as `payment_report.csv`.
///
/// # Endpoint
///
/// `GET /api/export-excel`
///
/// # Response
///
/// - **200**: `text/csv` attachment
/// - **404**: No payments to export
pub async fn export_payments(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let csv = report_service::export_payments_csv(&state.pool, auth.user_id).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"payment_report.csv\"",
            ),
        ],
        csv,
    ))
}
