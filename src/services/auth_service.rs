//! Account lifecycle: signup OTP, signup, login sessions and password reset.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::{
    AppState,
    error::AppError,
    models::{
        notification::Email,
        otp::OtpPurpose,
        user::{LoginResponse, SignupRequest, User},
    },
    services::{
        credentials::{
            generate_salt, generate_token, hash_password, normalize_email, sha256_hex,
            validate_phone, validate_pin, verify_password,
        },
        otp_service,
    },
};

/// Message returned whether or not the email belongs to an account.
pub const RESET_LINK_MESSAGE: &str =
    "If an account exists, a password reset link has been sent to your email.";

/// Send a signup code to `email`.
///
/// # Errors
///
/// - `InvalidRequest`: malformed email or phone
/// - `Conflict`: an account already uses this email
pub async fn send_signup_otp(
    state: &AppState,
    email: &str,
    phone_number: &str,
) -> Result<(), AppError> {
    let email = normalize_email(email)?;
    validate_phone(phone_number)?;

    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
        .bind(&email)
        .fetch_one(&state.pool)
        .await?;
    if exists {
        return Err(AppError::Conflict(
            "An account with this email already exists.".to_string(),
        ));
    }

    let code = otp_service::issue(
        &state.pool,
        OtpPurpose::Signup,
        &email,
        state.config.otp_ttl_secs,
        state.config.otp_max_sends_per_hour,
    )
    .await?;

    let minutes = (state.config.otp_ttl_secs / 60).max(1);
    state
        .notifier
        .send(
            &state.pool,
            Email::new(
                &email,
                "Autopay: Your verification code",
                format!(
                    "Your Autopay verification code is {code}.\n\nIt expires in {minutes} minutes. If you did not request it, ignore this email."
                ),
            )
            .mark_sensitive(),
        )
        .await;

    Ok(())
}

/// Verify a signup code.
pub async fn verify_signup_otp(state: &AppState, email: &str, code: &str) -> Result<(), AppError> {
    let email = normalize_email(email)?;
    otp_service::verify(
        &state.pool,
        OtpPurpose::Signup,
        &email,
        code,
        state.config.otp_max_attempts,
    )
    .await?;
    Ok(())
}

/// Create a user once their signup code has been verified.
///
/// The code is consumed in the same transaction as the insert.
pub async fn signup(state: &AppState, request: SignupRequest) -> Result<User, AppError> {
    let name = request.full_name.trim().to_string();
    if name.is_empty() || name.chars().count() > 100 {
        return Err(AppError::InvalidRequest(
            "Full name is required (max 100 characters).".to_string(),
        ));
    }
    let email = normalize_email(&request.email)?;
    let phone = validate_phone(&request.phone_number)?;
    validate_pin(&request.password)?;

    let salt = generate_salt();
    let password_hash = hash_password(&salt, &request.password);

    let mut tx = state.pool.begin().await?;

    otp_service::consume_verified(&mut tx, OtpPurpose::Signup, &email).await?;

    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (name, email, phone_number, password_hash, password_salt)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (email) DO NOTHING
        RETURNING *
        "#,
    )
    .bind(&name)
    .bind(&email)
    .bind(&phone)
    .bind(&password_hash)
    .bind(&salt)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(user) = user else {
        tx.rollback().await?;
        return Err(AppError::Conflict(
            "An account with this email already exists.".to_string(),
        ));
    };

    tx.commit().await?;

    tracing::info!(user_id = %user.id, "User signed up");
    Ok(user)
}

/// Check credentials and open a session.
pub async fn login(state: &AppState, email: &str, password: &str) -> Result<LoginResponse, AppError> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(AppError::InvalidRequest(
            "Email and password are required.".to_string(),
        ));
    }
    let email = normalize_email(email).map_err(|_| AppError::InvalidCredentials)?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(&email)
        .fetch_optional(&state.pool)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    if !verify_password(&user.password_salt, password, &user.password_hash) {
        tracing::info!(user_id = %user.id, "Login rejected: wrong password");
        return Err(AppError::InvalidCredentials);
    }

    let (token, expires_at) = create_session(state, user.id).await?;

    tracing::info!(user_id = %user.id, "User logged in");
    Ok(LoginResponse {
        message: "Login successful!".to_string(),
        token,
        user_id: user.id,
        username: user.name,
        expires_at,
    })
}

async fn create_session(state: &AppState, user_id: Uuid) -> Result<(String, DateTime<Utc>), AppError> {
    let token = generate_token();
    let expires_at = Utc::now() + Duration::hours(state.config.session_ttl_hours);

    sqlx::query("INSERT INTO sessions (user_id, token_hash, expires_at) VALUES ($1, $2, $3)")
        .bind(user_id)
        .bind(sha256_hex(token.as_bytes()))
        .bind(expires_at)
        .execute(&state.pool)
        .await?;

    Ok((token, expires_at))
}

/// Revoke the session a request was made with.
pub async fn logout(state: &AppState, session_id: Uuid) -> Result<(), AppError> {
    sqlx::query("UPDATE sessions SET revoked_at = NOW() WHERE id = $1 AND revoked_at IS NULL")
        .bind(session_id)
        .execute(&state.pool)
        .await?;
    Ok(())
}

/// Build the link a reset email points at.
pub fn reset_link(frontend_url: &str, email: &str, token: &str) -> String {
    let mut url = match url::Url::parse(frontend_url) {
        Ok(base) => base,
        Err(_) => return format!("/reset-password?token={token}"),
    };
    url.set_path("/reset-password");
    url.query_pairs_mut()
        .clear()
        .append_pair("token", token)
        .append_pair("email", email);
    url.to_string()
}

/// Email a reset link when the address belongs to a user.
///
/// Unknown addresses succeed silently so callers can't probe for accounts.
pub async fn send_reset_link(state: &AppState, email: &str) -> Result<(), AppError> {
    let email = normalize_email(email)?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(&email)
        .fetch_optional(&state.pool)
        .await?;

    let Some(user) = user else {
        tracing::info!("Password reset requested for unknown email");
        return Ok(());
    };

    let token = generate_token();
    let expires_at = Utc::now() + Duration::seconds(state.config.reset_token_ttl_secs);

    sqlx::query(
        "INSERT INTO password_reset_tokens (user_id, token_hash, expires_at) VALUES ($1, $2, $3)",
    )
    .bind(user.id)
    .bind(sha256_hex(token.as_bytes()))
    .bind(expires_at)
    .execute(&state.pool)
    .await?;

    let link = reset_link(&state.config.frontend_url, &email, &token);
    state
        .notifier
        .send(
            &state.pool,
            Email::new(
                &email,
                "Autopay: Reset your password",
                format!(
                    "Dear {},\n\nUse the link below to set a new password:\n{}\n\nThe link can be used once. If you did not ask for it, ignore this email.",
                    user.name, link
                ),
            )
            .mark_sensitive(),
        )
        .await;

    Ok(())
}

/// Set a new password with a reset token and revoke all of the user's sessions.
pub async fn reset_password(
    state: &AppState,
    email: &str,
    token: &str,
    new_password: &str,
) -> Result<(), AppError> {
    validate_pin(new_password)?;
    let email = normalize_email(email)?;
    let invalid_link = || {
        AppError::InvalidRequest(
            "Invalid or expired password reset link. Please request a new one.".to_string(),
        )
    };

    let mut tx = state.pool.begin().await?;

    let row: Option<(Uuid, Uuid)> = sqlx::query_as(
        r#"
        SELECT t.id, u.id
        FROM password_reset_tokens t
        JOIN users u ON u.id = t.user_id
        WHERE t.token_hash = $1
          AND u.email = $2
          AND t.used_at IS NULL
          AND t.expires_at > NOW()
        FOR UPDATE OF t
        "#,
    )
    .bind(sha256_hex(token.trim().as_bytes()))
    .bind(&email)
    .fetch_optional(&mut *tx)
    .await?;

    let Some((token_id, user_id)) = row else {
        tx.rollback().await?;
        return Err(invalid_link());
    };

    let salt = generate_salt();
    sqlx::query(
        "UPDATE users SET password_hash = $1, password_salt = $2, updated_at = NOW() WHERE id = $3",
    )
    .bind(hash_password(&salt, new_password))
    .bind(&salt)
    .bind(user_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE password_reset_tokens SET used_at = NOW() WHERE id = $1")
        .bind(token_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("UPDATE sessions SET revoked_at = NOW() WHERE user_id = $1 AND revoked_at IS NULL")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(user_id = %user_id, "Password reset");
    Ok(())
}
