//! Subscription HTTP handlers.
//!
//! - GET /api/subscription-plans - Plan catalog
//! - POST /api/subscriptions - Subscribe
//! - GET /api/subscriptions - Caller's subscriptions
//! - POST /api/subscriptions/{id}/cancel - Unsubscribe

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    AppState,
    error::AppError,
    middleware::auth::AuthUser,
    models::subscription::{
        Catalog, CreateSubscriptionRequest, SubscriptionResponse, catalog,
    },
    services::{payment_service, subscription_service},
};

pub async fn list_plans() -> Json<Catalog> {
    Json(catalog())
}

/// Subscribe to a catalog plan.
///
/// # Request Body
///
/// ```json
/// { "kind": "recharge", "operator": "Jio", "mobile": "9876543210", "plan": "5G Unlimited" }
/// ```
///
/// # Response
///
/// - **201**: The subscription; its first payment is scheduled for
///   `next_due`
/// - **400**: Plan, operator, platform or mobile number not valid
pub async fn create_subscription(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Json(request): Json<CreateSubscriptionRequest>,
) -> Result<(StatusCode, Json<SubscriptionResponse>), AppError> {
    let subscription = subscription_service::create_subscription(
        &state.pool,
        auth.user_id,
        request,
        payment_service::today(),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(subscription.into())))
}

pub async fn list_subscriptions(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<Vec<SubscriptionResponse>>, AppError> {
    let subscriptions = subscription_service::list_subscriptions(&state.pool, auth.user_id).await?;
    Ok(Json(subscriptions.into_iter().map(Into::into).collect()))
}

/// Cancel a subscription along with its open payments.
pub async fn cancel_subscription(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Path(subscription_id): Path<Uuid>,
) -> Result<Json<SubscriptionResponse>, AppError> {
    let subscription =
        subscription_service::cancel_subscription(&state.pool, auth.user_id, subscription_id)
            .await?;
    Ok(Json(subscription.into()))
}
