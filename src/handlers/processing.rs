//! Manual trigger for the due-payment sweep.

use std::sync::Arc;

use axum::{Json, extract::State};
use serde::Serialize;

use crate::{
    AppState,
    error::AppError,
    services::{payment_service, processing_service},
};

#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    pub message: String,
    pub processed: u32,
    pub failed: u32,
}

/// Settle every payment due today or earlier.
///
/// # Endpoint
///
/// `POST /api/process-due-payments`
///
/// # Response (200)
///
/// ```json
/// { "message": "Payments processed successfully", "processed": 3, "failed": 1 }
/// ```
///
/// The background scheduler runs the same sweep; concurrent runs skip rows
/// the other one holds.
pub async fn process_due_payments(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ProcessResponse>, AppError> {
    let summary =
        processing_service::process_due_payments(&state, payment_service::today()).await?;

    Ok(Json(ProcessResponse {
        message: "Payments processed successfully".to_string(),
        processed: summary.processed,
        failed: summary.failed,
    }))
}
