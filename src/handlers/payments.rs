//! Payment and wallet HTTP handlers.
//!
//! This module implements the payment-related API endpoints:
//! - POST /api/schedule-payment - Schedule a bill payment
//! - GET /api/payments/{user_id} - Open and settled payments
//! - GET /api/failed-payments/{user_id} - Payments needing attention
//! - GET /api/all-payments/{user_id} - Every payment
//! - PUT /api/payment/{id} - Reschedule or edit a payment
//! - POST /api/payment/{id}/cancel - Cancel a payment
//! - POST /api/deposit-balance/{user_id} - Top up the wallet
//! - GET /api/wallet/transactions - Wallet ledger

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    AppState,
    error::AppError,
    middleware::auth::AuthUser,
    models::{
        payment::{
            DepositRequest, DepositResponse, PaymentResponse, SchedulePaymentRequest,
            ScheduledResponse, UpdatePaymentRequest,
        },
        wallet::{WalletQuery, WalletTransactionResponse},
    },
    money::paise_to_rupees,
    services::payment_service::{self, PaymentFilter},
};

/// Schedule a payment for the authenticated user.
///
/// # Request Body
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
/// `amount` may be a number or a numeric string.
///
/// # Response
///
/// - **201**: `{"message": "Payment scheduled successfully", "payment_id": "..."}`
/// - **400**: Invalid payee, amount or date; no linked bank for "Connected Bank"
/// - **422**: "Connected Bank" and the bank balance doesn't cover the amount
pub async fn schedule_payment(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Json(request): Json<SchedulePaymentRequest>,
) -> Result<(StatusCode, Json<ScheduledResponse>), AppError> {
    let payment = payment_service::schedule_payment(
        &state.pool,
        auth.user_id,
        request,
        payment_service::today(),
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(ScheduledResponse {
            message: "Payment scheduled successfully".to_string(),
            payment_id: payment.id,
        }),
    ))
}

async fn list(
    state: &AppState,
    auth: &AuthUser,
    user_id: Uuid,
    filter: PaymentFilter,
) -> Result<Json<Vec<PaymentResponse>>, AppError> {
    auth.ensure_self(user_id)?;
    let payments = payment_service::list_payments(&state.pool, user_id, filter).await?;
    Ok(Json(payments.into_iter().map(Into::into).collect()))
}

/// Every payment except FAILED ones, latest due date first.
pub async fn list_payments(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<PaymentResponse>>, AppError> {
    list(&state, &auth, user_id, PaymentFilter::NotFailed).await
}

/// FAILED and PENDING payments. An empty list when there are none.
pub async fn list_failed_payments(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<PaymentResponse>>, AppError> {
    list(&state, &auth, user_id, PaymentFilter::FailedOrPending).await
}

pub async fn list_all_payments(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<PaymentResponse>>, AppError> {
    list(&state, &auth, user_id, PaymentFilter::All).await
}

/// Reschedule a payment.
///
/// # Request Body
///
/// All fields optional:
///
/// ```json
/// { "amount": 1500, "due_date": "2026-11-20", "method": "UPI", "payee": "BESCOM" }
/// ```
///
/// # Response
///
/// - **200**: The updated payment, status `SCHEDULED`
/// - **404**: No such payment for this user
/// - **409**: Payment is PAID or CANCELLED
pub async fn update_payment(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(payment_id): Path<Uuid>,
    Json(request): Json<UpdatePaymentRequest>,
) -> Result<Json<PaymentResponse>, AppError> {
    let payment = payment_service::reschedule_payment(
        &state.pool,
        auth.user_id,
        payment_id,
        request,
        payment_service::today(),
    )
    .await?;
    Ok(Json(payment.into()))
}

/// Cancel a payment. 409 when it is already PAID or CANCELLED.
pub async fn cancel_payment(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<PaymentResponse>, AppError> {
    let payment = payment_service::cancel_payment(&state.pool, auth.user_id, payment_id).await?;
    Ok(Json(payment.into()))
}

/// Add money to the wallet.
///
/// # Request Body
///
/// ```json
/// { "amount": 500, "source": "bank" }
/// ```
///
/// `source` is `"external"` (default) or `"bank"`; the latter debits the
/// linked bank account in the same transaction.
///
/// # Response (200)
///
/// ```json
/// { "message": "Balance deposited successfully", "new_balance": 1750.5, "new_balance_paise": 175050 }
/// ```
pub async fn deposit_balance(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<DepositRequest>,
) -> Result<Json<DepositResponse>, AppError> {
    auth.ensure_self(user_id)?;
    let amount_paise = request.amount.to_paise()?;

    let new_balance_paise =
        payment_service::deposit(&state.pool, user_id, amount_paise, request.source).await?;

    Ok(Json(DepositResponse {
        message: "Balance deposited successfully".to_string(),
        new_balance: paise_to_rupees(new_balance_paise),
        new_balance_paise,
    }))
}

/// Recent wallet movements, newest first.
///
/// `?limit=` defaults to 50, capped at 200.
pub async fn list_wallet_transactions(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Query(query): Query<WalletQuery>,
) -> Result<Json<Vec<WalletTransactionResponse>>, AppError> {
    let rows =
        payment_service::list_wallet_transactions(&state.pool, auth.user_id, query.limit()).await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}
