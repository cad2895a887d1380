//! One-time code issuing and verification.
//!
//! Codes are 6 digits, stored hashed, expire after `OTP_TTL_SECS`, and lock
//! after `OTP_MAX_ATTEMPTS` wrong guesses. Issuing a new code for a subject
//! supersedes any earlier open code; at most `OTP_MAX_SENDS_PER_HOUR` codes
//! are issued per subject per hour, which caps guesses at their product.

use chrono::{Duration, Utc};
use sqlx::{Postgres, Transaction};

use crate::{
    db::DbPool,
    error::AppError,
    models::otp::{OtpCode, OtpPurpose},
    services::credentials::{constant_time_eq, sha256_hex},
};

/// Random 6-digit code, zero padded.
pub fn generate_code() -> String {
    let n: u32 = rand::random_range(0..1_000_000);
    format!("{:06}", n)
}

/// Hash bound to the subject so equal codes for different subjects differ.
pub fn hash_code(purpose: OtpPurpose, subject: &str, code: &str) -> String {
    sha256_hex(format!("{}:{}:{}", purpose.as_str(), subject, code).as_bytes())
}

/// Codes are 6 ASCII digits.
pub fn validate_code_format(code: &str) -> Result<&str, AppError> {
    let code = code.trim();
    if code.len() == 6 && code.chars().all(|c| c.is_ascii_digit()) {
        Ok(code)
    } else {
        Err(AppError::InvalidRequest(
            "OTP must be a 6-digit number".to_string(),
        ))
    }
}

/// Issue a new code for `subject`, superseding older open ones.
///
/// Returns the plaintext code for delivery; only its hash is stored.
///
/// # Errors
///
/// - `OtpSendLimit`: `max_per_hour` codes were already issued for `subject`
///   in the last hour
pub async fn issue(
    pool: &DbPool,
    purpose: OtpPurpose,
    subject: &str,
    ttl_secs: i64,
    max_per_hour: i64,
) -> Result<String, AppError> {
    let code = generate_code();
    let expires_at = Utc::now() + Duration::seconds(ttl_secs);

    let mut tx = pool.begin().await?;

    // Serializes concurrent issues for one subject until commit
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(format!("{}:{}", purpose.as_str(), subject))
        .execute(&mut *tx)
        .await?;

    let recent: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM otp_codes
        WHERE purpose = $1 AND subject = $2 AND created_at > NOW() - INTERVAL '1 hour'
        "#,
    )
    .bind(purpose.as_str())
    .bind(subject)
    .fetch_one(&mut *tx)
    .await?;

    if recent >= max_per_hour {
        tx.rollback().await?;
        tracing::warn!(purpose = purpose.as_str(), subject, "OTP send limit reached");
        return Err(AppError::OtpSendLimit);
    }

    sqlx::query(
        r#"
        UPDATE otp_codes
        SET consumed_at = NOW()
        WHERE purpose = $1 AND subject = $2 AND consumed_at IS NULL
        "#,
    )
    .bind(purpose.as_str())
    .bind(subject)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO otp_codes (purpose, subject, code_hash, expires_at)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(purpose.as_str())
    .bind(subject)
    .bind(hash_code(purpose, subject, &code))
    .bind(expires_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::debug!(purpose = purpose.as_str(), subject, "OTP issued");
    Ok(code)
}

/// Check a code against the latest open one for `subject` and mark it verified.
///
/// # Errors
///
/// - `OtpExpired`: no open code, or it is past its expiry
/// - `TooManyAttempts`: the attempt budget is spent
/// - `OtpInvalid`: wrong code (the attempt is counted)
pub async fn verify(
    pool: &DbPool,
    purpose: OtpPurpose,
    subject: &str,
    code: &str,
    max_attempts: i32,
) -> Result<OtpCode, AppError> {
    let code = validate_code_format(code)?;

    let mut tx = pool.begin().await?;

    let record = sqlx::query_as::<_, OtpCode>(
        r#"
        SELECT * FROM otp_codes
        WHERE purpose = $1 AND subject = $2 AND consumed_at IS NULL
        ORDER BY created_at DESC
        LIMIT 1
        FOR UPDATE
        "#,
    )
    .bind(purpose.as_str())
    .bind(subject)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::OtpExpired)?;

    if record.expires_at <= Utc::now() {
        tx.rollback().await?;
        return Err(AppError::OtpExpired);
    }

    if record.attempts >= max_attempts {
        tx.rollback().await?;
        return Err(AppError::TooManyAttempts);
    }

    if !constant_time_eq(&hash_code(purpose, subject, code), &record.code_hash) {
        sqlx::query("UPDATE otp_codes SET attempts = attempts + 1 WHERE id = $1")
            .bind(record.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(purpose = purpose.as_str(), subject, "Wrong OTP entered");
        return Err(AppError::OtpInvalid);
    }

    let verified = sqlx::query_as::<_, OtpCode>(
        "UPDATE otp_codes SET verified_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(record.id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(verified)
}

/// Consume a verified, unexpired code inside the caller's transaction.
///
/// Signup calls this so the account insert and the code consumption commit
/// together.
pub async fn consume_verified(
    tx: &mut Transaction<'_, Postgres>,
    purpose: OtpPurpose,
    subject: &str,
) -> Result<(), AppError> {
    let consumed = sqlx::query(
        r#"
        UPDATE otp_codes
        SET consumed_at = NOW()
        WHERE id = (
            SELECT id FROM otp_codes
            WHERE purpose = $1
              AND subject = $2
              AND consumed_at IS NULL
              AND verified_at IS NOT NULL
              AND expires_at > NOW()
            ORDER BY created_at DESC
            LIMIT 1
            FOR UPDATE
        )
        "#,
    )
    .bind(purpose.as_str())
    .bind(subject)
    .execute(&mut **tx)
    .await?
    .rows_affected();

    if consumed == 0 {
        return Err(AppError::InvalidRequest(
            "Please verify the OTP sent to your email first.".to_string(),
        ));
    }
    Ok(())
}

/// Mark a specific code consumed.
pub async fn consume(tx: &mut Transaction<'_, Postgres>, otp: &OtpCode) -> Result<(), AppError> {
    sqlx::query("UPDATE otp_codes SET consumed_at = NOW() WHERE id = $1")
        .bind(otp.id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}
