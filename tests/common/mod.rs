use std::sync::Arc;

use autopay_server::AppState;
use autopay_server::config::Config;
use autopay_server::db;
use autopay_server::router::create_router;
use autopay_server::services::notification_service::Notifier;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use serde_json::Value;
use tower::ServiceExt;

/// Check if a test database is configured via environment variable.
#[allow(dead_code)]
pub fn database_available() -> bool {
    std::env::var("TEST_DATABASE_URL").is_ok()
}

/// Skip test with message if no test database is configured.
#[macro_export]
macro_rules! require_database {
    () => {
        if !crate::common::database_available() {
            eprintln!("Skipping: TEST_DATABASE_URL not set");
            return;
        }
    };
}

fn build_state(config: Config, pool: db::DbPool) -> Arc<AppState> {
    let notifier = Notifier::from_config(&config).expect("Failed to build notifier");
    Arc::new(AppState {
        config,
        pool,
        notifier,
    })
}

/// Create a test app whose pool never connects unless a request reaches
/// the database.
#[allow(dead_code)]
pub fn create_test_app() -> (Router, Arc<AppState>) {
    let config = Config::test_default();
    let pool = db::create_lazy_pool(&config.database_url).expect("Failed to create lazy pool");
    let state = build_state(config, pool);
    (create_router(state.clone()), state)
}

/// Create a test app backed by `TEST_DATABASE_URL`, with migrations applied.
#[allow(dead_code)]
pub async fn create_database_app() -> (Router, Arc<AppState>) {
    let mut config = Config::test_default();
    config.database_url =
        std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set");

    let pool = db::create_pool(&config.database_url)
        .await
        .expect("Failed to connect to test database");
    db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    let state = build_state(config, pool);
    (create_router(state.clone()), state)
}

/// Send a request and return the status with the body parsed as JSON
/// (`Value::Null` when the body is empty or not JSON).
#[allow(dead_code)]
pub async fn send_json(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}
