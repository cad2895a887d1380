//! User profile HTTP handler.

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
};
use uuid::Uuid;

use crate::{
    AppState,
    error::AppError,
    middleware::auth::AuthUser,
    models::user::{User, UserResponse},
};

/// Get the caller's profile.
///
/// # Endpoint
///
/// `GET /api/user/{user_id}`
///
/// # Response
///
/// - **200**: Profile with wallet balance, linked bank name and the number
///   of failed payments
/// - **404**: `user_id` is not the authenticated user
///
/// ```json
/// {
///   "id": "550e8400-e29b-41d4-a716-446655440000",
///   "name": "Asha Patil",
///   "email": "asha@example.com",
///   "phone_number": "9876543210",
///   "bankName": "GlobalBank",
///   "balance": 1250.5,
///   "balance_paise": 125050,
///   "failed_payments_count": 1
/// }
/// ```
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<UserResponse>, AppError> {
    auth.ensure_self(user_id)?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or(AppError::NotFound("User"))?;

    let bank_name: Option<String> = match user.bank_account_id {
        Some(id) => {
            sqlx::query_scalar("SELECT bank_name FROM bank_accounts WHERE id = $1")
                .bind(id)
                .fetch_optional(&state.pool)
                .await?
        }
        None => None,
    };

    let failed_count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM payments WHERE user_id = $1 AND status = 'FAILED'",
    )
    .bind(user_id)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(UserResponse::new(user, bank_name, failed_count)))
}
