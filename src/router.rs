//! HTTP routing.

use std::sync::Arc;

use axum::{
    Router,
    http::{HeaderValue, Method, header, request::Parts},
    middleware as axum_middleware,
    routing::{get, post, put},
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::{AppState, handlers, middleware::auth::require_session};

/// Origins allowed to call the API: the configured frontend, plus plain
/// HTTP on localhost at any port for development.
fn origin_allowed(frontend_url: &str, origin: &str) -> bool {
    if origin == frontend_url {
        return true;
    }
    let Ok(url) = url::Url::parse(origin) else {
        return false;
    };
    url.scheme() == "http"
        && matches!(url.host_str(), Some("localhost") | Some("127.0.0.1"))
        && url.username().is_empty()
        && url.path() == "/"
        && url.query().is_none()
}

fn cors_layer(frontend_url: &str) -> CorsLayer {
    let frontend_url = frontend_url.trim_end_matches('/').to_string();

    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _parts: &Parts| {
                origin
                    .to_str()
                    .is_ok_and(|origin| origin_allowed(&frontend_url, origin))
            },
        ))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
}

/// Build the application router.
///
/// Public routes cover health, signup, login, password recovery and the
/// static catalogs. Everything else requires a session token.
pub fn create_router(state: Arc<AppState>) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/api/send-otp", post(handlers::auth::send_otp))
        .route("/api/verify-otp", post(handlers::auth::verify_otp))
        .route("/api/signup", post(handlers::auth::signup))
        .route("/api/login", post(handlers::auth::login))
        .route(
            "/api/forgot-password-link",
            post(handlers::auth::forgot_password_link),
        )
        .route(
            "/api/reset-password-with-token",
            post(handlers::auth::reset_password_with_token),
        )
        .route("/api/banks", get(handlers::bank::list_banks))
        .route(
            "/api/subscription-plans",
            get(handlers::subscriptions::list_plans),
        );

    let protected_routes = Router::new()
        .route("/api/logout", post(handlers::auth::logout))
        .route("/api/user/{user_id}", get(handlers::users::get_user))
        // Payments
        .route(
            "/api/schedule-payment",
            post(handlers::payments::schedule_payment),
        )
        .route(
            "/api/payments/{user_id}",
            get(handlers::payments::list_payments),
        )
        .route(
            "/api/failed-payments/{user_id}",
            get(handlers::payments::list_failed_payments),
        )
        .route(
            "/api/all-payments/{user_id}",
            get(handlers::payments::list_all_payments),
        )
        .route(
            "/api/payment/{payment_id}",
            put(handlers::payments::update_payment),
        )
        .route(
            "/api/payment/{payment_id}/cancel",
            post(handlers::payments::cancel_payment),
        )
        .route(
            "/api/deposit-balance/{user_id}",
            post(handlers::payments::deposit_balance),
        )
        .route(
            "/api/wallet/transactions",
            get(handlers::payments::list_wallet_transactions),
        )
        .route(
            "/api/process-due-payments",
            post(handlers::processing::process_due_payments),
        )
        // Bank
        .route("/api/send-bank-otp", post(handlers::bank::send_bank_otp))
        .route(
            "/api/verify-bank-otp",
            post(handlers::bank::verify_bank_otp),
        )
        .route("/api/bank-account", get(handlers::bank::get_bank_account))
        .route("/api/bank-transfer", post(handlers::bank::bank_transfer))
        // Subscriptions
        .route(
            "/api/subscriptions",
            post(handlers::subscriptions::create_subscription)
                .get(handlers::subscriptions::list_subscriptions),
        )
        .route(
            "/api/subscriptions/{subscription_id}/cancel",
            post(handlers::subscriptions::cancel_subscription),
        )
        // Reports
        .route(
            "/api/reports/summary/{user_id}",
            get(handlers::reports::payment_summary),
        )
        .route(
            "/api/export-excel",
            get(handlers::reports::export_payments),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors_layer(&state.config.frontend_url))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
