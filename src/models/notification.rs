//! Notification models for outbound email delivery.
//!
//! # Delivery Flow
//!
//! 1. A service builds an `Email` (recipient, subject, body)
//! 2. The notifier wraps it in a `NotificationPayload` with a fresh event id
//! 3. When a relay is configured, the payload is POSTed with an HMAC signature
//! 4. Every attempt is recorded in `notifications`, relay or not; bodies of
//!    sensitive emails are replaced with [`REDACTED_BODY`] in the record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stored in place of the body of an email that carries a code or link.
pub const REDACTED_BODY: &str = "[redacted: contains a one-time code or reset link]";

/// A message to deliver to one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    pub recipient: String,
    pub subject: String,
    pub body: String,
    /// Body holds a live credential and must not be persisted
    #[serde(skip)]
    pub sensitive: bool,
}

impl Email {
    pub fn new(
        recipient: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            recipient: recipient.into(),
            subject: subject.into(),
            body: body.into(),
            sensitive: false,
        }
    }

    /// Mark the body as carrying a one-time code or reset token.
    pub fn mark_sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// Body as it may be written to the database.
    pub fn stored_body(&self) -> &str {
        if self.sensitive {
            REDACTED_BODY
        } else {
            &self.body
        }
    }
}

/// Payload POSTed to the mail relay.
///
/// # Example
///
/// ```json
/// {
///   "event_type": "notification.email",
///   "event_id": "550e8400-e29b-41d4-a716-446655440000",
///   "created_at": "2026-10-18T10:30:00Z",
///   "data": {
///     "recipient": "asha@example.com",
///     "subject": "Autopay: Payment Successful for Water Board",
///     "body": "Dear Asha, ..."
///   }
/// }
/// ```
///
/// # Signature Verification
///
/// The request carries `X-Notify-Signature: sha256=<hex>`, the
/// HMAC-SHA256 of the raw JSON body keyed with the shared secret.
#[derive(Debug, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub event_type: String,
    pub event_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub data: Email,
}

impl NotificationPayload {
    pub fn new(event_id: Uuid, email: Email) -> Self {
        Self {
            event_type: "notification.email".to_string(),
            event_id,
            created_at: Utc::now(),
            data: email,
        }
    }

    /// JSON form for the `notifications` record, with a sensitive body
    /// redacted. The relay still receives the full payload.
    pub fn stored_json(&self) -> serde_json::Result<serde_json::Value> {
        let mut value = serde_json::to_value(self)?;
        if self.data.sensitive {
            value["data"]["body"] = serde_json::Value::from(REDACTED_BODY);
        }
        Ok(value)
    }
}

/// Delivery record written for every notification.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub id: Uuid,
    pub recipient: String,
    pub subject: String,
    pub body: String,
    pub payload: serde_json::Value,
    /// HTTP status from the relay; `None` when not sent or the request failed
    pub response_status: Option<i32>,
    pub response_body: Option<String>,
}
