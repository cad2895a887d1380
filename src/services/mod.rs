//! Business logic layer.
//!
//! Handlers stay thin; everything that touches balances or status goes
//! through these functions.

pub mod auth_service;
pub mod bank_service;
pub mod credentials;
pub mod notification_service;
pub mod otp_service;
pub mod payment_service;
pub mod processing_service;
pub mod report_service;
pub mod subscription_service;
