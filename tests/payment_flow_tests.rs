//! End-to-end flows against a real PostgreSQL database.
//!
//! Skipped unless `TEST_DATABASE_URL` points at a database the tests may
//! write to. Each test registers its own user, so the tests can share one
//! database and run in parallel.

use std::sync::Arc;

use autopay_server::AppState;
use autopay_server::models::notification::REDACTED_BODY;
use autopay_server::models::otp::{OtpPurpose, bank_subject};
use autopay_server::services::{
    auth_service, credentials, otp_service, payment_service, processing_service,
    subscription_service,
};
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use chrono::Duration;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

mod common;

const PASSWORD: &str = "246810";

fn today() -> String {
    payment_service::today().format("%Y-%m-%d").to_string()
}

/// Sign up a fresh user through the OTP flow and log in.
///
/// Returns `(token, user_id, email)`.
async fn register(app: &Router, state: &Arc<AppState>) -> (String, String, String) {
    let email = format!("flow-{}@example.com", Uuid::new_v4().simple());

    let (status, _) = common::send_json(
        app,
        Method::POST,
        "/api/send-otp",
        None,
        Some(json!({ "email": email, "phone_number": "9876543210" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // The emailed code is only logged; issue a fresh one to learn its value.
    let code = otp_service::issue(&state.pool, OtpPurpose::Signup, &email, 600, 5)
        .await
        .unwrap();

    let (status, _) = common::send_json(
        app,
        Method::POST,
        "/api/verify-otp",
        None,
        Some(json!({ "email": email, "otp_code": code })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = common::send_json(
        app,
        Method::POST,
        "/api/signup",
        None,
        Some(json!({
            "full_name": "Flow Tester",
            "email": email,
            "phone_number": "9876543210",
            "password": PASSWORD
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    let (status, body) = common::send_json(
        app,
        Method::POST,
        "/api/login",
        None,
        Some(json!({ "email": email, "password": PASSWORD })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Login successful!");

    (
        body["token"].as_str().unwrap().to_string(),
        body["user_id"].as_str().unwrap().to_string(),
        email,
    )
}

/// Open a GlobalBank account with Rs 15,000 that no other test touches.
///
/// Returns `(account_number, email_id)`.
async fn open_bank_account(state: &Arc<AppState>) -> (String, String) {
    let tag = Uuid::new_v4().simple().to_string();
    let account_number = format!("T{}", &tag[..20]);
    let email = format!("bank-{}@example.com", &tag[..8]);

    sqlx::query(
        r#"
        INSERT INTO bank_accounts (bank_name, account_number, phone_number, email_id, balance_paise)
        VALUES ('GlobalBank', $1, '9876543211', $2, 1500000)
        "#,
    )
    .bind(&account_number)
    .bind(&email)
    .execute(&state.pool)
    .await
    .unwrap();

    (account_number, email)
}

fn find<'a>(payments: &'a Value, id: &str) -> Option<&'a Value> {
    payments.as_array().unwrap().iter().find(|p| p["id"] == id)
}

#[tokio::test]
async fn test_signup_login_and_logout() {
    require_database!();
    let (app, state) = common::create_database_app().await;
    let (token, user_id, email) = register(&app, &state).await;

    // The signup code was consumed
    let (status, _) = common::send_json(
        &app,
        Method::POST,
        "/api/signup",
        None,
        Some(json!({
            "full_name": "Flow Tester",
            "email": email,
            "phone_number": "9876543210",
            "password": PASSWORD
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // A registered email can't request another signup code
    let (status, _) = common::send_json(
        &app,
        Method::POST,
        "/api/send-otp",
        None,
        Some(json!({ "email": email, "phone_number": "9876543210" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = common::send_json(
        &app,
        Method::POST,
        "/api/login",
        None,
        Some(json!({ "email": email, "password": "000000" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid email or password");

    let (status, profile) = common::send_json(
        &app,
        Method::GET,
        &format!("/api/user/{user_id}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["email"], email.as_str());
    assert_eq!(profile["balance_paise"], 0);
    assert_eq!(profile["bankName"], Value::Null);
    assert_eq!(profile["failed_payments_count"], 0);

    // Someone else's id looks like a missing user
    let (status, _) = common::send_json(
        &app,
        Method::GET,
        &format!("/api/user/{}", Uuid::new_v4()),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) =
        common::send_json(&app, Method::POST, "/api/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = common::send_json(
        &app,
        Method::GET,
        &format!("/api/user/{user_id}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_wrong_otp_attempts_are_limited() {
    require_database!();
    let (app, state) = common::create_database_app().await;
    let email = format!("otp-{}@example.com", Uuid::new_v4().simple());

    let code = otp_service::issue(&state.pool, OtpPurpose::Signup, &email, 600, 5)
        .await
        .unwrap();
    let wrong = if code == "111111" { "222222" } else { "111111" };

    for _ in 0..state.config.otp_max_attempts {
        let (status, body) = common::send_json(
            &app,
            Method::POST,
            "/api/verify-otp",
            None,
            Some(json!({ "email": email, "otp_code": wrong })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "otp_invalid");
    }

    // Budget spent: even the right code is refused
    let (status, _) = common::send_json(
        &app,
        Method::POST,
        "/api/verify-otp",
        None,
        Some(json!({ "email": email, "otp_code": code })),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_schedule_process_and_reschedule() {
    require_database!();
    let (app, state) = common::create_database_app().await;
    let (token, user_id, _) = register(&app, &state).await;
    let token = Some(token.as_str());

    let (status, body) = common::send_json(
        &app,
        Method::POST,
        &format!("/api/deposit-balance/{user_id}"),
        token,
        Some(json!({ "amount": "500" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["new_balance"], 500.0);
    assert_eq!(body["new_balance_paise"], 50_000);

    let (status, body) = common::send_json(
        &app,
        Method::POST,
        "/api/schedule-payment",
        token,
        Some(json!({ "payee": "Electricity", "amount": 300, "due_date": today() })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Payment scheduled successfully");
    let electricity = body["payment_id"].as_str().unwrap().to_string();

    let (status, body) = common::send_json(
        &app,
        Method::POST,
        "/api/schedule-payment",
        token,
        Some(json!({ "payee": "Rent", "amount": "1000.00", "due_date": today() })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let rent = body["payment_id"].as_str().unwrap().to_string();

    // Past dates and an unlinked bank are rejected
    let yesterday = (payment_service::today() - Duration::days(1))
        .format("%Y-%m-%d")
        .to_string();
    let (status, _) = common::send_json(
        &app,
        Method::POST,
        "/api/schedule-payment",
        token,
        Some(json!({ "payee": "Gas", "amount": 10, "due_date": yesterday })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = common::send_json(
        &app,
        Method::POST,
        "/api/schedule-payment",
        token,
        Some(json!({
            "payee": "Gas",
            "amount": 10,
            "due_date": today(),
            "method": "Connected Bank"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "No bank account connected.");

    let (status, body) = common::send_json(
        &app,
        Method::POST,
        "/api/process-due-payments",
        token,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Payments processed successfully");

    let (_, open) = common::send_json(
        &app,
        Method::GET,
        &format!("/api/payments/{user_id}"),
        token,
        None,
    )
    .await;
    assert_eq!(find(&open, &electricity).unwrap()["status"], "PAID");
    assert!(find(&open, &rent).is_none());

    let (status, failed) = common::send_json(
        &app,
        Method::GET,
        &format!("/api/failed-payments/{user_id}"),
        token,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let rent_row = find(&failed, &rent).unwrap();
    assert_eq!(rent_row["status"], "FAILED");
    assert_eq!(rent_row["failure_reason"], "insufficient_balance");

    let (_, profile) = common::send_json(
        &app,
        Method::GET,
        &format!("/api/user/{user_id}"),
        token,
        None,
    )
    .await;
    assert_eq!(profile["balance_paise"], 20_000);
    assert_eq!(profile["failed_payments_count"], 1);

    // Reschedule the failed payment; a paid one can't be touched.
    // Moved out of today so a concurrent sweep can't settle it.
    let next_week = (payment_service::today() + Duration::days(7))
        .format("%Y-%m-%d")
        .to_string();
    let (status, body) = common::send_json(
        &app,
        Method::PUT,
        &format!("/api/payment/{rent}"),
        token,
        Some(json!({ "amount": 150, "due_date": next_week })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "SCHEDULED");
    assert_eq!(body["due_date"], next_week.as_str());
    assert_eq!(body["amount_paise"], 15_000);

    let (status, _) = common::send_json(
        &app,
        Method::PUT,
        &format!("/api/payment/{electricity}"),
        token,
        Some(json!({ "amount": 150 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = common::send_json(
        &app,
        Method::POST,
        &format!("/api/payment/{rent}/cancel"),
        token,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "CANCELLED");

    let (status, _) = common::send_json(
        &app,
        Method::POST,
        &format!("/api/payment/{rent}/cancel"),
        token,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, ledger) =
        common::send_json(&app, Method::GET, "/api/wallet/transactions", token, None).await;
    let kinds: Vec<&str> = ledger
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["kind"].as_str().unwrap())
        .collect();
    assert_eq!(kinds, ["payment", "deposit"]);

    let (status, summary) = common::send_json(
        &app,
        Method::GET,
        &format!("/api/reports/summary/{user_id}"),
        token,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["total_count"], 2);
    assert_eq!(summary["by_status"].as_array().unwrap().len(), 5);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/export-excel")
                .header(header::AUTHORIZATION, format!("Bearer {}", token.unwrap()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/csv; charset=utf-8"
    );
    let csv = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let csv = String::from_utf8(csv.to_vec()).unwrap();
    assert!(csv.starts_with("ID,Payee,Amount,Due Date,Status,Method,Created At\r\n"));
    assert!(csv.contains("Electricity,300.00"));
}

#[tokio::test]
async fn test_export_without_payments_is_not_found() {
    require_database!();
    let (app, state) = common::create_database_app().await;
    let (token, _, _) = register(&app, &state).await;

    let (status, body) =
        common::send_json(&app, Method::GET, "/api/export-excel", Some(&token), None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Payments not found");
}

#[tokio::test]
async fn test_bank_link_transfer_and_bank_deposit() {
    require_database!();
    let (app, state) = common::create_database_app().await;
    let (token, user_id, _) = register(&app, &state).await;
    let token = Some(token.as_str());
    let (account_number, bank_email) = open_bank_account(&state).await;

    let (status, _) = common::send_json(
        &app,
        Method::POST,
        "/api/send-bank-otp",
        token,
        Some(json!({
            "bank_name": "GlobalBank",
            "phone_number": "9000000000",
            "account_number": account_number
        })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = common::send_json(
        &app,
        Method::POST,
        "/api/send-bank-otp",
        token,
        Some(json!({
            "bank_name": "GlobalBank",
            "phone_number": "9876543211",
            "account_number": account_number
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email_hint"], "ba***********@example.com");

    // The stored copy of the code email is redacted
    let stored: Vec<String> =
        sqlx::query_scalar("SELECT body FROM notifications WHERE recipient = $1")
            .bind(&bank_email)
            .fetch_all(&state.pool)
            .await
            .unwrap();
    assert_eq!(stored, vec![REDACTED_BODY.to_string()]);

    let subject = bank_subject("GlobalBank", &account_number);
    let code = otp_service::issue(&state.pool, OtpPurpose::BankLink, &subject, 600, 5)
        .await
        .unwrap();

    let (status, body) = common::send_json(
        &app,
        Method::POST,
        "/api/verify-bank-otp",
        token,
        Some(json!({
            "bank_name": "GlobalBank",
            "account_number": account_number,
            "otp_code": code
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Bank OTP verified successfully!");

    let (status, account) =
        common::send_json(&app, Method::GET, "/api/bank-account", token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(account["bank_name"], "GlobalBank");

    let (status, body) = common::send_json(
        &app,
        Method::POST,
        "/api/bank-transfer",
        token,
        Some(json!({
            "to_bank_name": "OrbitalBank",
            "to_account_number": "700800900100",
            "amount": 1
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Transfer successful");
    assert!(body["from_balance_paise"].as_i64().unwrap() >= 0);

    let (status, _) = common::send_json(
        &app,
        Method::POST,
        "/api/bank-transfer",
        token,
        Some(json!({
            "to_bank_name": "GlobalBank",
            "to_account_number": account_number,
            "amount": 1
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = common::send_json(
        &app,
        Method::POST,
        "/api/bank-transfer",
        token,
        Some(json!({
            "to_bank_name": "OrbitalBank",
            "to_account_number": "999999999999",
            "amount": 1
        })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = common::send_json(
        &app,
        Method::POST,
        "/api/bank-transfer",
        token,
        Some(json!({
            "to_bank_name": "OrbitalBank",
            "to_account_number": "700800900100",
            "amount": 9_999_999
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = common::send_json(
        &app,
        Method::POST,
        &format!("/api/deposit-balance/{user_id}"),
        token,
        Some(json!({ "amount": 2, "source": "bank" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["new_balance_paise"], 200);

    let (_, profile) = common::send_json(
        &app,
        Method::GET,
        &format!("/api/user/{user_id}"),
        token,
        None,
    )
    .await;
    assert_eq!(profile["bankName"], "GlobalBank");
}

#[tokio::test]
async fn test_subscription_cycle() {
    require_database!();
    let (app, state) = common::create_database_app().await;
    let (token, user_id, _) = register(&app, &state).await;
    let token = Some(token.as_str());

    let (status, body) = common::send_json(
        &app,
        Method::POST,
        "/api/subscriptions",
        token,
        Some(json!({ "kind": "ott", "platform": "Netflix", "plan": "Annual Plan", "due_date": today() })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (status, created) = common::send_json(
        &app,
        Method::POST,
        "/api/subscriptions",
        token,
        Some(json!({ "kind": "ott", "platform": "Prime", "plan": "Monthly Plan", "due_date": today() })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["label"], "Prime - Monthly Plan");
    assert_eq!(created["amount_paise"], 17_900);
    let subscription_id = created["id"].as_str().unwrap().to_string();

    let (_, payments) = common::send_json(
        &app,
        Method::GET,
        &format!("/api/all-payments/{user_id}"),
        token,
        None,
    )
    .await;
    let payments = payments.as_array().unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0]["method"], "Subscription");
    assert_eq!(payments[0]["subscription_id"], subscription_id.as_str());

    common::send_json(
        &app,
        Method::POST,
        &format!("/api/deposit-balance/{user_id}"),
        token,
        Some(json!({ "amount": 200 })),
    )
    .await;
    common::send_json(&app, Method::POST, "/api/process-due-payments", token, None).await;

    let next_due = (payment_service::today() + Duration::days(30))
        .format("%Y-%m-%d")
        .to_string();

    let (_, subscriptions) =
        common::send_json(&app, Method::GET, "/api/subscriptions", token, None).await;
    assert_eq!(subscriptions[0]["status"], "active");
    assert_eq!(subscriptions[0]["next_due"], next_due.as_str());

    let (_, payments) = common::send_json(
        &app,
        Method::GET,
        &format!("/api/all-payments/{user_id}"),
        token,
        None,
    )
    .await;
    let statuses: Vec<(&str, &str)> = payments
        .as_array()
        .unwrap()
        .iter()
        .map(|p| (p["status"].as_str().unwrap(), p["due_date"].as_str().unwrap()))
        .collect();
    assert_eq!(
        statuses,
        [("SCHEDULED", next_due.as_str()), ("PAID", today().as_str())]
    );

    let (status, cancelled) = common::send_json(
        &app,
        Method::POST,
        &format!("/api/subscriptions/{subscription_id}/cancel"),
        token,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "cancelled");

    let (_, open) = common::send_json(
        &app,
        Method::GET,
        &format!("/api/payments/{user_id}"),
        token,
        None,
    )
    .await;
    assert!(
        open.as_array()
            .unwrap()
            .iter()
            .all(|p| p["status"] != "SCHEDULED")
    );

    let (status, _) = common::send_json(
        &app,
        Method::POST,
        &format!("/api/subscriptions/{subscription_id}/cancel"),
        token,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_signup_code_is_not_stored_in_notifications() {
    require_database!();
    let (app, state) = common::create_database_app().await;
    let email = format!("stored-{}@example.com", Uuid::new_v4().simple());

    let (status, _) = common::send_json(
        &app,
        Method::POST,
        "/api/send-otp",
        None,
        Some(json!({ "email": email, "phone_number": "9876543210" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let rows: Vec<(String, String, Option<String>)> = sqlx::query_as(
        "SELECT subject, body, payload->'data'->>'body' FROM notifications WHERE recipient = $1",
    )
    .bind(&email)
    .fetch_all(&state.pool)
    .await
    .unwrap();

    assert_eq!(rows.len(), 1);
    let (subject, body, payload_body) = &rows[0];
    assert_eq!(subject, "Autopay: Your verification code");
    assert_eq!(body, REDACTED_BODY);
    assert_eq!(payload_body.as_deref(), Some(REDACTED_BODY));
    assert!(!body.chars().any(|c| c.is_ascii_digit()));
}

#[tokio::test]
async fn test_otp_sends_are_capped_per_hour() {
    require_database!();
    let (app, state) = common::create_database_app().await;
    let email = format!("cap-{}@example.com", Uuid::new_v4().simple());
    let request = json!({ "email": email, "phone_number": "9876543210" });

    for _ in 0..state.config.otp_max_sends_per_hour {
        let (status, _) =
            common::send_json(&app, Method::POST, "/api/send-otp", None, Some(request.clone())).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) =
        common::send_json(&app, Method::POST, "/api/send-otp", None, Some(request)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["code"], "otp_send_limit");

    // Nothing new was issued, so the wrong-guess budget can't be refreshed
    let issued: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM otp_codes WHERE subject = $1")
        .bind(&email)
        .fetch_one(&state.pool)
        .await
        .unwrap();
    assert_eq!(issued, state.config.otp_max_sends_per_hour);
}

#[tokio::test]
async fn test_bank_otp_sends_are_capped_per_hour() {
    require_database!();
    let (app, state) = common::create_database_app().await;
    let (token, _, _) = register(&app, &state).await;
    let (account_number, _) = open_bank_account(&state).await;
    let request = json!({
        "bank_name": "GlobalBank",
        "phone_number": "9876543211",
        "account_number": account_number
    });

    for _ in 0..state.config.otp_max_sends_per_hour {
        let (status, _) = common::send_json(
            &app,
            Method::POST,
            "/api/send-bank-otp",
            Some(&token),
            Some(request.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, _) =
        common::send_json(&app, Method::POST, "/api/send-bank-otp", Some(&token), Some(request))
            .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_expired_otp_is_rejected() {
    require_database!();
    let (app, state) = common::create_database_app().await;
    let email = format!("expired-{}@example.com", Uuid::new_v4().simple());

    let code = otp_service::issue(&state.pool, OtpPurpose::Signup, &email, -1, 5)
        .await
        .unwrap();

    let (status, body) = common::send_json(
        &app,
        Method::POST,
        "/api/verify-otp",
        None,
        Some(json!({ "email": email, "otp_code": code })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "otp_expired");
}

#[tokio::test]
async fn test_password_reset_flow() {
    require_database!();
    let (app, state) = common::create_database_app().await;
    let (token, user_id, email) = register(&app, &state).await;
    let user_uuid = Uuid::parse_str(&user_id).unwrap();

    let (status, body) = common::send_json(
        &app,
        Method::POST,
        "/api/forgot-password-link",
        None,
        Some(json!({ "email": email })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], auth_service::RESET_LINK_MESSAGE);

    let issued: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM password_reset_tokens WHERE user_id = $1")
            .bind(user_uuid)
            .fetch_one(&state.pool)
            .await
            .unwrap();
    assert_eq!(issued, 1);

    // The emailed link is redacted in storage; plant a token with a known value
    let reset_token = credentials::generate_token();
    sqlx::query(
        r#"
        INSERT INTO password_reset_tokens (user_id, token_hash, expires_at)
        VALUES ($1, $2, NOW() + INTERVAL '10 minutes')
        "#,
    )
    .bind(user_uuid)
    .bind(credentials::sha256_hex(reset_token.as_bytes()))
    .execute(&state.pool)
    .await
    .unwrap();

    let reset = |email: &str| {
        json!({ "email": email, "token": reset_token, "new_password": "135790" })
    };

    let (status, _) = common::send_json(
        &app,
        Method::POST,
        "/api/reset-password-with-token",
        None,
        Some(reset("someone-else@example.com")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = common::send_json(
        &app,
        Method::POST,
        "/api/reset-password-with-token",
        None,
        Some(reset(&email)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Password has been reset successfully. Please log in.");

    // Old sessions are revoked
    let (status, _) = common::send_json(
        &app,
        Method::GET,
        &format!("/api/user/{user_id}"),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // The link works once
    let (status, body) = common::send_json(
        &app,
        Method::POST,
        "/api/reset-password-with-token",
        None,
        Some(reset(&email)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["message"],
        "Invalid or expired password reset link. Please request a new one."
    );

    let (status, _) = common::send_json(
        &app,
        Method::POST,
        "/api/login",
        None,
        Some(json!({ "email": email, "password": PASSWORD })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = common::send_json(
        &app,
        Method::POST,
        "/api/login",
        None,
        Some(json!({ "email": email, "password": "135790" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_cancel_subscription_while_sweep_holds_its_payment() {
    require_database!();
    let (app, state) = common::create_database_app().await;
    let (token, user_id, _) = register(&app, &state).await;
    let user_uuid = Uuid::parse_str(&user_id).unwrap();
    let next_week = (payment_service::today() + Duration::days(7))
        .format("%Y-%m-%d")
        .to_string();

    let (status, created) = common::send_json(
        &app,
        Method::POST,
        "/api/subscriptions",
        Some(&token),
        Some(json!({ "kind": "plan", "plan": "Spotify", "due_date": next_week })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    let subscription_id = Uuid::parse_str(created["id"].as_str().unwrap()).unwrap();

    // Take locks the way a sweep settling this payment does: payment row,
    // then the subscription row.
    let mut sweep = state.pool.begin().await.unwrap();
    sqlx::query("SELECT id FROM payments WHERE subscription_id = $1 FOR UPDATE")
        .bind(subscription_id)
        .execute(&mut *sweep)
        .await
        .unwrap();

    let pool = state.pool.clone();
    let cancel = tokio::spawn(async move {
        subscription_service::cancel_subscription(&pool, user_uuid, subscription_id).await
    });
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;

    sqlx::query("UPDATE subscriptions SET updated_at = NOW() WHERE id = $1")
        .bind(subscription_id)
        .execute(&mut *sweep)
        .await
        .unwrap();
    sweep.commit().await.unwrap();

    let cancelled = cancel.await.unwrap().unwrap();
    assert_eq!(cancelled.status, "cancelled");

    let open: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM payments WHERE subscription_id = $1 AND status <> 'CANCELLED'",
    )
    .bind(subscription_id)
    .fetch_one(&state.pool)
    .await
    .unwrap();
    assert_eq!(open, 0);
}

#[tokio::test]
async fn test_scheduler_settles_due_payments() {
    require_database!();
    let (app, state) = common::create_database_app().await;
    let (token, user_id, _) = register(&app, &state).await;
    let token = Some(token.as_str());

    common::send_json(
        &app,
        Method::POST,
        &format!("/api/deposit-balance/{user_id}"),
        token,
        Some(json!({ "amount": 100 })),
    )
    .await;
    let (status, body) = common::send_json(
        &app,
        Method::POST,
        "/api/schedule-payment",
        token,
        Some(json!({ "payee": "Broadband", "amount": 40, "due_date": today() })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let payment_id = body["payment_id"].as_str().unwrap().to_string();

    let scheduler = processing_service::spawn_scheduler(state.clone());

    let mut status = Value::Null;
    for _ in 0..50 {
        let (_, payments) = common::send_json(
            &app,
            Method::GET,
            &format!("/api/all-payments/{user_id}"),
            token,
            None,
        )
        .await;
        status = find(&payments, &payment_id).unwrap()["status"].clone();
        if status == "PAID" {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    scheduler.abort();

    assert_eq!(status, "PAID");
}
