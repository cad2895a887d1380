//! Session token authentication middleware.
//!
//! This middleware intercepts every protected request to:
//! 1. Extract the session token from the Authorization header
//! 2. Hash it and look up a live session
//! 3. Inject the authenticated user into the request
//! 4. Reject unauthorized requests with HTTP 401

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::{AppState, error::AppError, services::credentials::sha256_hex};

/// Authenticated user attached to the request's extensions.
///
/// Route handlers extract it with `Extension<AuthUser>`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub session_id: Uuid,
    pub name: String,
    pub email: String,
}

impl AuthUser {
    /// Path parameters naming a user must name the caller.
    ///
    /// A mismatch is reported as "not found" so ids of other users don't
    /// leak.
    pub fn ensure_self(&self, user_id: Uuid) -> Result<(), AppError> {
        if self.user_id == user_id {
            Ok(())
        } else {
            Err(AppError::NotFound("User"))
        }
    }
}

/// Pull the bearer token out of an `Authorization` header value.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    header_value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Session authentication middleware function.
///
/// # Flow
///
/// 1. Extract `Authorization: Bearer <token>` header from request
/// 2. Hash the `<token>` using SHA-256
/// 3. Query for a matching session that is neither revoked nor expired
/// 4. If found: inject `AuthUser` into request, call next handler
/// 5. If not found: return 401 Unauthorized error
pub async fn require_session(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(bearer_token)
        .ok_or(AppError::Unauthorized)?;

    let token_hash = sha256_hex(token.as_bytes());

    let auth_user = sqlx::query_as::<_, AuthUser>(
        r#"
        SELECT u.id AS user_id, s.id AS session_id, u.name, u.email
        FROM sessions s
        JOIN users u ON u.id = s.user_id
        WHERE s.token_hash = $1
          AND s.revoked_at IS NULL
          AND s.expires_at > NOW()
        "#,
    )
    .bind(&token_hash)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::Unauthorized)?;

    request.extensions_mut().insert(auth_user);

    Ok(next.run(request).await)
}
