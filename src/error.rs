//! Error types and HTTP error response handling.
//!
//! This module defines all application errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Application-wide error type.
///
/// Each variant maps to a specific HTTP status code and error code.
///
/// # Error Categories
///
/// - **Database Errors**: Any sqlx::Error from database operations
/// - **Authentication Errors**: Missing session, bad credentials
/// - **Resource Errors**: Requested resources not found
/// - **Business Logic Errors**: Insufficient balance, illegal status change
/// - **Verification Errors**: Wrong, expired or exhausted one-time codes
/// - **Validation Errors**: Invalid request data
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Database operation failed (e.g., connection error, query error).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Session token is missing, unknown, expired or revoked.
    ///
    /// Returns HTTP 401 Unauthorized.
    #[error("Authentication required")]
    Unauthorized,

    /// Email/password pair did not match a user.
    ///
    /// Returns HTTP 401 Unauthorized. The message is the same for an unknown
    /// email and a wrong password.
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// Requested resource does not exist or doesn't belong to the caller.
    ///
    /// Returns HTTP 404 Not Found. The String names the resource.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Wallet or bank balance does not cover the requested amount.
    ///
    /// Returns HTTP 422 Unprocessable Entity.
    #[error("Insufficient balance")]
    InsufficientBalance,

    /// Request body or parameters are invalid.
    ///
    /// Returns HTTP 400 Bad Request.
    #[error("{0}")]
    InvalidRequest(String),

    /// Operation conflicts with the current state of the resource.
    ///
    /// Returns HTTP 409 Conflict.
    #[error("{0}")]
    Conflict(String),

    /// One-time code did not match.
    #[error("Invalid OTP")]
    OtpInvalid,

    /// One-time code is past its expiry or was never issued.
    #[error("OTP has expired. Please request a new one")]
    OtpExpired,

    /// Too many wrong one-time code attempts.
    ///
    /// Returns HTTP 429 Too Many Requests.
    #[error("Too many attempts. Please request a new OTP")]
    TooManyAttempts,

    /// Too many codes issued for one email or bank account within the hour.
    ///
    /// Returns HTTP 429 Too Many Requests.
    #[error("Too many OTP requests. Please try again later")]
    OtpSendLimit,

    /// Unexpected failure outside the database layer.
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Machine-readable error code included in every error body.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Database(_) | AppError::Internal(_) => "internal_error",
            AppError::Unauthorized => "unauthorized",
            AppError::InvalidCredentials => "invalid_credentials",
            AppError::NotFound(_) => "not_found",
            AppError::InsufficientBalance => "insufficient_balance",
            AppError::InvalidRequest(_) => "invalid_request",
            AppError::Conflict(_) => "conflict",
            AppError::OtpInvalid => "otp_invalid",
            AppError::OtpExpired => "otp_expired",
            AppError::TooManyAttempts => "too_many_attempts",
            AppError::OtpSendLimit => "otp_send_limit",
        }
    }

    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Unauthorized | AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InsufficientBalance => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::InvalidRequest(_) | AppError::OtpInvalid | AppError::OtpExpired => {
                StatusCode::BAD_REQUEST
            }
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::TooManyAttempts | AppError::OtpSendLimit => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// ```json
/// {
///   "error": {
///     "code": "error_type",
///     "message": "Human-readable error message"
///   },
///   "message": "Human-readable error message"
/// }
/// ```
///
/// The top-level `message` mirrors `error.message` so form-style clients can
/// show it without digging into the nested object.
///
/// Database and internal errors are logged and hidden from the client.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let message = match &self {
            AppError::Database(err) => {
                tracing::error!(error = %err, "Database error");
                "An internal error occurred".to_string()
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                "An internal error occurred".to_string()
            }
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            },
            "message": message
        }));

        (status, body).into_response()
    }
}
