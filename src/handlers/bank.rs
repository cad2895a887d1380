//! Bank linking and transfer HTTP handlers.
//!
//! - GET /api/banks - Supported bank names
//! - POST /api/send-bank-otp - Email a link code to the account holder
//! - POST /api/verify-bank-otp - Link the account
//! - GET /api/bank-account - Linked account and balance
//! - POST /api/bank-transfer - Send money to another account

use std::sync::Arc;

use axum::{Extension, Json, extract::State};

use crate::{
    AppState,
    error::AppError,
    middleware::auth::AuthUser,
    models::{
        bank_account::{
            BankAccountResponse, BankOtpSentResponse, BankTransferRequest, BankTransferResponse,
            SUPPORTED_BANKS, SendBankOtpRequest, VerifyBankOtpRequest,
        },
        user::MessageResponse,
    },
    money::paise_to_rupees,
    services::bank_service,
};

pub async fn list_banks() -> Json<[&'static str; 2]> {
    Json(SUPPORTED_BANKS)
}

/// Start linking a bank account.
///
/// # Request Body
///
/// ```json
/// { "bank_name": "GlobalBank", "phone_number": "9876543210", "account_number": "100200300400" }
/// ```
///
/// # Response
///
/// - **200**: `{"message": "OTP sent to your registered bank email", "email_hint": "de*******@example.com"}`
/// - **404**: No account matches all three fields
pub async fn send_bank_otp(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SendBankOtpRequest>,
) -> Result<Json<BankOtpSentResponse>, AppError> {
    let email_hint = bank_service::send_bank_otp(
        &state,
        &request.bank_name,
        &request.phone_number,
        &request.account_number,
    )
    .await?;

    Ok(Json(BankOtpSentResponse {
        message: "OTP sent to your registered bank email".to_string(),
        email_hint,
    }))
}

/// Finish linking: verify the code and attach the account to the caller.
pub async fn verify_bank_otp(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Json(request): Json<VerifyBankOtpRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    bank_service::verify_bank_otp(
        &state,
        auth.user_id,
        &request.bank_name,
        &request.account_number,
        &request.otp_code,
    )
    .await?;

    Ok(Json(MessageResponse::new("Bank OTP verified successfully!")))
}

/// The caller's linked bank account. 404 when none is linked.
pub async fn get_bank_account(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<BankAccountResponse>, AppError> {
    let account = bank_service::linked_account(&state.pool, auth.user_id)
        .await?
        .ok_or(AppError::NotFound("Bank account"))?;
    Ok(Json(account.into()))
}

/// Transfer from the linked account to another bank account.
///
/// # Response
///
/// - **200**: `{"message": "Transfer successful", "from_balance": 47500.0, "from_balance_paise": 4750000}`
/// - **400**: Same account on both sides, or no linked account
/// - **404**: Recipient account doesn't exist
/// - **422**: Linked account balance too low
pub async fn bank_transfer(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Json(request): Json<BankTransferRequest>,
) -> Result<Json<BankTransferResponse>, AppError> {
    let amount_paise = request.amount.to_paise()?;

    let from_balance_paise = bank_service::transfer(
        &state,
        auth.user_id,
        &request.to_bank_name,
        &request.to_account_number,
        amount_paise,
    )
    .await?;

    Ok(Json(BankTransferResponse {
        message: "Transfer successful".to_string(),
        from_balance: paise_to_rupees(from_balance_paise),
        from_balance_paise,
    }))
}
