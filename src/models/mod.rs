//! Data models representing database entities and API payloads.

/// Simulated bank account records
pub mod bank_account;
/// Outbound notification records
pub mod notification;
/// One-time codes for signup and bank linking
pub mod otp;
/// Scheduled bill payments
pub mod payment;
/// Recurring subscriptions and the plan catalog
pub mod subscription;
/// Registered users and sessions
pub mod user;
/// Wallet ledger entries
pub mod wallet;
