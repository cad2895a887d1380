//! Simulated bank accounts: linking by OTP and account-to-account transfers.

use uuid::Uuid;

use crate::{
    AppState,
    db::DbPool,
    error::AppError,
    models::{
        bank_account::{BankAccount, is_supported_bank, mask_email},
        notification::Email,
        otp::{OtpPurpose, bank_subject},
    },
    money::format_rupees,
    services::{credentials::validate_phone, otp_service},
};

fn check_bank(bank_name: &str) -> Result<&str, AppError> {
    let bank_name = bank_name.trim();
    if is_supported_bank(bank_name) {
        Ok(bank_name)
    } else {
        Err(AppError::InvalidRequest(format!(
            "Unknown bank: {}",
            bank_name
        )))
    }
}

fn check_account_number(account_number: &str) -> Result<&str, AppError> {
    let account_number = account_number.trim();
    if account_number.is_empty()
        || account_number.len() > 34
        || !account_number.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return Err(AppError::InvalidRequest(
            "Enter a valid account number".to_string(),
        ));
    }
    Ok(account_number)
}

async fn find_account(
    pool: &DbPool,
    bank_name: &str,
    account_number: &str,
) -> Result<Option<BankAccount>, AppError> {
    let account = sqlx::query_as::<_, BankAccount>(
        "SELECT * FROM bank_accounts WHERE bank_name = $1 AND account_number = $2",
    )
    .bind(bank_name)
    .bind(account_number)
    .fetch_optional(pool)
    .await?;
    Ok(account)
}

/// Send a link code to the email registered on a bank account.
///
/// The account must match bank, account number and phone number. Returns
/// the masked email the code went to.
pub async fn send_bank_otp(
    state: &AppState,
    bank_name: &str,
    phone_number: &str,
    account_number: &str,
) -> Result<String, AppError> {
    let bank_name = check_bank(bank_name)?;
    let account_number = check_account_number(account_number)?;
    let phone_number = validate_phone(phone_number)?;

    let account = find_account(&state.pool, bank_name, account_number)
        .await?
        .filter(|a| a.phone_number == phone_number)
        .ok_or(AppError::NotFound("Bank account"))?;

    let subject = bank_subject(bank_name, account_number);
    let code = otp_service::issue(
        &state.pool,
        OtpPurpose::BankLink,
        &subject,
        state.config.otp_ttl_secs,
        state.config.otp_max_sends_per_hour,
    )
    .await?;

    state
        .notifier
        .send(
            &state.pool,
            Email::new(
                &account.email_id,
                format!("Autopay: Confirm linking your {} account", bank_name),
                format!(
                    "Your code to link {} account ending {} to Autopay is {}.\n\nIf you did not request this, contact your bank.",
                    bank_name,
                    last_four(account_number),
                    code
                ),
            )
            .mark_sensitive(),
        )
        .await;

    Ok(mask_email(&account.email_id))
}

fn last_four(account_number: &str) -> &str {
    let start = account_number.len().saturating_sub(4);
    &account_number[start..]
}

/// Verify a link code and attach the bank account to `user_id`.
pub async fn verify_bank_otp(
    state: &AppState,
    user_id: Uuid,
    bank_name: &str,
    account_number: &str,
    code: &str,
) -> Result<BankAccount, AppError> {
    let bank_name = check_bank(bank_name)?;
    let account_number = check_account_number(account_number)?;
    let subject = bank_subject(bank_name, account_number);

    let otp = otp_service::verify(
        &state.pool,
        OtpPurpose::BankLink,
        &subject,
        code,
        state.config.otp_max_attempts,
    )
    .await?;

    let account = find_account(&state.pool, bank_name, account_number)
        .await?
        .ok_or(AppError::NotFound("Bank account"))?;

    let mut tx = state.pool.begin().await?;

    otp_service::consume(&mut tx, &otp).await?;

    sqlx::query("UPDATE users SET bank_account_id = $1, updated_at = NOW() WHERE id = $2")
        .bind(account.id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(user_id = %user_id, bank = bank_name, "Bank account linked");
    Ok(account)
}

/// The bank account linked to `user_id`, if any.
pub async fn linked_account(pool: &DbPool, user_id: Uuid) -> Result<Option<BankAccount>, AppError> {
    let account = sqlx::query_as::<_, BankAccount>(
        r#"
        SELECT b.*
        FROM bank_accounts b
        JOIN users u ON u.bank_account_id = b.id
        WHERE u.id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(account)
}

/// Move money from the user's linked account to another bank account.
///
/// Both balances change in one database transaction. Rows are locked in id
/// order so two opposite transfers can't deadlock.
///
/// Returns the sender's new balance in paise.
pub async fn transfer(
    state: &AppState,
    user_id: Uuid,
    to_bank_name: &str,
    to_account_number: &str,
    amount_paise: i64,
) -> Result<i64, AppError> {
    let to_bank_name = check_bank(to_bank_name)?;
    let to_account_number = check_account_number(to_account_number)?;

    let from = linked_account(&state.pool, user_id)
        .await?
        .ok_or_else(|| AppError::InvalidRequest("No bank account connected.".to_string()))?;
    let to = find_account(&state.pool, to_bank_name, to_account_number)
        .await?
        .ok_or(AppError::NotFound("Recipient account"))?;

    if from.id == to.id {
        return Err(AppError::InvalidRequest(
            "Cannot transfer to the same account".to_string(),
        ));
    }

    let mut tx = state.pool.begin().await?;

    let mut lock_order = [from.id, to.id];
    lock_order.sort();
    let balances: Vec<(Uuid, i64)> = sqlx::query_as(
        "SELECT id, balance_paise FROM bank_accounts WHERE id = ANY($1) ORDER BY id FOR UPDATE",
    )
    .bind(&lock_order[..])
    .fetch_all(&mut *tx)
    .await?;

    let from_balance = balances
        .iter()
        .find(|(id, _)| *id == from.id)
        .map(|(_, b)| *b)
        .ok_or(AppError::NotFound("Bank account"))?;

    if from_balance < amount_paise {
        tx.rollback().await?;
        return Err(AppError::InsufficientBalance);
    }

    let new_balance: i64 = sqlx::query_scalar(
        "UPDATE bank_accounts SET balance_paise = balance_paise - $1, updated_at = NOW() WHERE id = $2 RETURNING balance_paise",
    )
    .bind(amount_paise)
    .bind(from.id)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        "UPDATE bank_accounts SET balance_paise = balance_paise + $1, updated_at = NOW() WHERE id = $2",
    )
    .bind(amount_paise)
    .bind(to.id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::info!(
        user_id = %user_id,
        amount_paise,
        to_bank = to_bank_name,
        "Bank transfer completed"
    );

    state
        .notifier
        .send(
            &state.pool,
            Email::new(
                &to.email_id,
                format!("{}: Amount credited", to_bank_name),
                format!(
                    "{} has been credited to your {} account ending {}.",
                    format_rupees(amount_paise),
                    to_bank_name,
                    last_four(&to.account_number)
                ),
            ),
        )
        .await;

    Ok(new_balance)
}
