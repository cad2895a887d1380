//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives HTTP request data (JSON body, URL params, etc.)
//! 2. Calls into `services` for validation and database work
//! 3. Returns HTTP response (JSON, status code)

/// Signup, login and password recovery
pub mod auth;
/// Bank linking and transfers
pub mod bank;
/// Service health check
pub mod health;
/// Payments and wallet
pub mod payments;
/// Manual due-payment sweep
pub mod processing;
/// Summary and CSV export
pub mod reports;
/// Recurring subscriptions
pub mod subscriptions;
/// User profile
pub mod users;
