//! AutoPay server: bill scheduling and automatic payment backend.
//!
//! Users sign up with an emailed one-time code, link a simulated bank
//! account, keep an AutoPay wallet topped up, and schedule bill payments and
//! recurring subscriptions. A background sweep settles due payments from the
//! wallet and emails the outcome.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (async queries, embedded migrations)
//! - **Authentication**: Opaque session tokens, stored as SHA-256 hashes
//! - **Notifications**: HMAC-signed JSON posted to a mail relay
//! - **Format**: JSON requests/responses, CSV export

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod money;
pub mod router;
pub mod services;

use config::Config;
use db::DbPool;
use services::notification_service::Notifier;

/// Shared application state, handed to every handler as `State<Arc<AppState>>`.
pub struct AppState {
    pub config: Config,
    pub pool: DbPool,
    pub notifier: Notifier,
}
