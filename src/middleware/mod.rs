//! HTTP middleware components.

/// Session token authentication middleware
pub mod auth;
