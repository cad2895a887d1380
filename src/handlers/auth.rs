//! Signup, login and password recovery HTTP handlers.
//!
//! - POST /api/send-otp - Email a signup code
//! - POST /api/verify-otp - Check a signup code
//! - POST /api/signup - Create the account
//! - POST /api/login - Open a session
//! - POST /api/logout - Revoke the current session
//! - POST /api/forgot-password-link - Email a reset link
//! - POST /api/reset-password-with-token - Set a new password

use std::sync::Arc;

use axum::{Extension, Json, extract::State, http::StatusCode};

use crate::{
    AppState,
    error::AppError,
    middleware::auth::AuthUser,
    models::{
        otp::{SendOtpRequest, VerifyOtpRequest},
        user::{
            ForgotPasswordRequest, LoginRequest, LoginResponse, MessageResponse,
            ResetPasswordRequest, SignupRequest,
        },
    },
    services::auth_service,
};

/// Email a 6-digit signup code.
///
/// # Request Body
///
/// ```json
/// { "email": "asha@example.com", "phone_number": "9876543210" }
/// ```
///
/// # Response
///
/// - **200**: `{"message": "OTP sent successfully"}`
/// - **400**: Malformed email or phone number
/// - **409**: Email already registered
pub async fn send_otp(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SendOtpRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    auth_service::send_signup_otp(&state, &request.email, &request.phone_number).await?;
    Ok(Json(MessageResponse::new("OTP sent successfully")))
}

/// Verify a signup code.
///
/// # Response
///
/// - **200**: Code accepted; signup may proceed
/// - **400**: Wrong or expired code
/// - **429**: Too many wrong attempts; request a new code
pub async fn verify_otp(
    State(state): State<Arc<AppState>>,
    Json(request): Json<VerifyOtpRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    auth_service::verify_signup_otp(&state, &request.email, &request.otp_code).await?;
    Ok(Json(MessageResponse::new("OTP verified successfully")))
}

/// Create an account.
///
/// The email must have a verified signup code.
///
/// # Response (201)
///
/// ```json
/// { "message": "User registered successfully!" }
/// ```
pub async fn signup(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SignupRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), AppError> {
    auth_service::signup(&state, request).await?;
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("User registered successfully!")),
    ))
}

/// Log in with email and 6-digit password.
///
/// # Response (200)
///
/// ```json
/// {
///   "message": "Login successful!",
///   "token": "9f2c...",
///   "user_id": "550e8400-e29b-41d4-a716-446655440000",
///   "username": "Asha Patil",
///   "expires_at": "2026-10-19T09:30:00Z"
/// }
/// ```
///
/// Wrong email and wrong password both return 401 with the same message.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let response = auth_service::login(&state, &request.email, &request.password).await?;
    Ok(Json(response))
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<MessageResponse>, AppError> {
    auth_service::logout(&state, auth.session_id).await?;
    Ok(Json(MessageResponse::new("Logged out")))
}

/// Email a password reset link.
///
/// Always answers 200 with the same message so accounts can't be probed.
pub async fn forgot_password_link(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    auth_service::send_reset_link(&state, &request.email).await?;
    Ok(Json(MessageResponse::new(auth_service::RESET_LINK_MESSAGE)))
}

/// Set a new password from a reset link. Every open session is revoked.
pub async fn reset_password_with_token(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    auth_service::reset_password(&state, &request.email, &request.token, &request.new_password)
        .await?;
    Ok(Json(MessageResponse::new(
        "Password has been reset successfully. Please log in.",
    )))
}
