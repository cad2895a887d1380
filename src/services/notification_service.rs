//! Notification delivery.
//!
//! Emails are handed to an external mail relay as signed JSON. Delivery is
//! best effort: a failed or missing relay is logged and recorded, and never
//! fails the operation that triggered the message. Records of sensitive
//! emails keep the subject but not the body.

use std::time::Duration;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

use crate::config::Config;
use crate::db::DbPool;
use crate::models::notification::{Email, NewNotification, NotificationPayload};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone)]
struct Relay {
    url: String,
    secret: String,
}

/// Sends notification emails through the configured relay.
#[derive(Debug, Clone)]
pub struct Notifier {
    relay: Option<Relay>,
    client: reqwest::Client,
}

impl Notifier {
    /// Build a notifier from configuration.
    ///
    /// Without `NOTIFY_WEBHOOK_URL` messages are only logged and recorded.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let relay = match (&config.notify_webhook_url, &config.notify_webhook_secret) {
            (Some(url), Some(secret)) => Some(Relay {
                url: url.clone(),
                secret: secret.clone(),
            }),
            _ => None,
        };

        // The sweep awaits each delivery
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self { relay, client })
    }

    /// Whether messages leave the process.
    pub fn is_relay_configured(&self) -> bool {
        self.relay.is_some()
    }

    /// Deliver one email and record the attempt.
    pub async fn send(&self, pool: &DbPool, email: Email) {
        let recipient = email.recipient.clone();
        let subject = email.subject.clone();

        if let Err(e) = self.deliver(pool, email).await {
            tracing::error!(
                recipient = %recipient,
                subject = %subject,
                error = %e,
                "Failed to record notification"
            );
        }
    }

    async fn deliver(&self, pool: &DbPool, email: Email) -> anyhow::Result<()> {
        let event_id = Uuid::new_v4();
        let payload = NotificationPayload::new(event_id, email.clone());
        let payload_json = serde_json::to_string(&payload)?;

        let (status, body) = match &self.relay {
            Some(relay) => {
                let signature = generate_signature(&relay.secret, &payload_json);
                let response = self
                    .client
                    .post(&relay.url)
                    .header("Content-Type", "application/json")
                    .header("X-Notify-Signature", &signature)
                    .header("X-Notify-Event-Id", event_id.to_string())
                    .body(payload_json)
                    .send()
                    .await;

                match response {
                    Ok(resp) => {
                        let status = resp.status().as_u16() as i32;
                        if !resp.status().is_success() {
                            tracing::warn!(status, recipient = %email.recipient, "Mail relay rejected notification");
                        }
                        (Some(status), resp.text().await.ok())
                    }
                    Err(e) => {
                        let error_msg = format!("Request failed: {}", e);
                        tracing::error!(recipient = %email.recipient, "{}", error_msg);
                        (None, Some(error_msg))
                    }
                }
            }
            None => {
                tracing::info!(
                    recipient = %email.recipient,
                    subject = %email.subject,
                    "No mail relay configured, notification logged only"
                );
                (None, None)
            }
        };

        let record = NewNotification {
            id: event_id,
            body: email.stored_body().to_string(),
            payload: payload.stored_json()?,
            recipient: email.recipient,
            subject: email.subject,
            response_status: status,
            response_body: body,
        };

        sqlx::query(
            r#"
            INSERT INTO notifications (
                id,
                recipient,
                subject,
                body,
                payload,
                response_status,
                response_body
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.id)
        .bind(record.recipient)
        .bind(record.subject)
        .bind(record.body)
        .bind(record.payload)
        .bind(record.response_status)
        .bind(record.response_body)
        .execute(pool)
        .await?;

        Ok(())
    }
}

/// Generate HMAC-SHA256 signature for a relay payload.
///
/// # Format
///
/// `sha256=<hex_encoded_hmac>`
pub fn generate_signature(secret: &str, payload: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC key length is valid");
    mac.update(payload.as_bytes());
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}
