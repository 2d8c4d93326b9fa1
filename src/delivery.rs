//! Outbound one-time passcode delivery.
//!
//! A channel either confirms it sent the code or reports that it fell back
//! to local/demo mode. Failure is never an error: the authenticator keeps the
//! challenge valid and, depending on policy, also accepts the fallback code.

use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

use crate::config::APP_NAME;

/// Subject line for passcode messages.
pub const OTP_SUBJECT: &str = "Your one-time login code";

/// How a delivery attempt ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Sent,
    Fallback { reason: String },
}

impl DeliveryOutcome {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback { .. })
    }
}

/// Errors constructing a delivery channel.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Invalid delivery endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("HTTP client error: {0}")]
    HttpClient(String),
}

/// Notification channel abstraction.
pub trait DeliveryChannel: Send + Sync {
    fn deliver(&self, destination: &str, code: &str, recipient_name: &str) -> DeliveryOutcome;
}

/// Plain-text body of a passcode message.
pub fn render_otp_message(recipient_name: &str, code: &str, validity_minutes: u64) -> String {
    format!(
        "Hello {recipient_name},\n\n\
         Your {APP_NAME} one-time password is: {code}\n\n\
         This code is valid for {validity_minutes} minutes.\n\
         If you didn't request this code, please ignore this message."
    )
}

// ═══════════════════════════════════════════════════════════
// Demo channel
// ═══════════════════════════════════════════════════════════

/// Channel used when no real transport is configured. Never sends.
#[derive(Debug, Default)]
pub struct DemoDelivery;

impl DeliveryChannel for DemoDelivery {
    fn deliver(&self, _destination: &str, _code: &str, recipient_name: &str) -> DeliveryOutcome {
        tracing::info!(recipient = recipient_name, "Delivery not configured, using demo mode");
        DeliveryOutcome::Fallback {
            reason: "delivery channel not configured".into(),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Webhook channel
// ═══════════════════════════════════════════════════════════

/// Request body posted to the notification webhook.
#[derive(Serialize)]
struct WebhookMessage<'a> {
    to: &'a str,
    recipient_name: &'a str,
    subject: &'a str,
    body: String,
}

/// Posts passcode messages to an HTTP notification relay (mail or SMS gateway).
pub struct WebhookDelivery {
    endpoint: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
    validity_minutes: u64,
}

impl WebhookDelivery {
    /// Must not be called from inside an async runtime (blocking client).
    pub fn new(
        endpoint: &str,
        timeout_secs: u64,
        validity_minutes: u64,
    ) -> Result<Self, DeliveryError> {
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(DeliveryError::InvalidEndpoint(endpoint.to_string()));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| DeliveryError::HttpClient(e.to_string()))?;

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client,
            timeout_secs,
            validity_minutes,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl DeliveryChannel for WebhookDelivery {
    fn deliver(&self, destination: &str, code: &str, recipient_name: &str) -> DeliveryOutcome {
        let message = WebhookMessage {
            to: destination,
            recipient_name,
            subject: OTP_SUBJECT,
            body: render_otp_message(recipient_name, code, self.validity_minutes),
        };

        let response = match self.client.post(&self.endpoint).json(&message).send() {
            Ok(response) => response,
            Err(e) => {
                let reason = if e.is_connect() {
                    format!("Cannot reach delivery relay at {}", self.endpoint)
                } else if e.is_timeout() {
                    format!("Delivery timed out after {}s", self.timeout_secs)
                } else {
                    e.to_string()
                };
                tracing::warn!(reason = %reason, "Passcode delivery failed, using fallback");
                return DeliveryOutcome::Fallback { reason };
            }
        };

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "Delivery relay rejected message");
            return DeliveryOutcome::Fallback {
                reason: format!("Delivery relay returned {}", status.as_u16()),
            };
        }

        tracing::info!(recipient = recipient_name, "Passcode delivered");
        DeliveryOutcome::Sent
    }
}

// ═══════════════════════════════════════════════════════════
// Mock channel
// ═══════════════════════════════════════════════════════════

/// A message captured by `MockDelivery`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveredMessage {
    pub destination: String,
    pub code: String,
    pub recipient_name: String,
}

/// Mock channel for unit testing: records messages, returns a fixed outcome.
pub struct MockDelivery {
    outcome: DeliveryOutcome,
    sent: Mutex<Vec<DeliveredMessage>>,
}

impl MockDelivery {
    pub fn sending() -> Self {
        Self::with_outcome(DeliveryOutcome::Sent)
    }

    pub fn falling_back() -> Self {
        Self::with_outcome(DeliveryOutcome::Fallback {
            reason: "mock fallback".into(),
        })
    }

    pub fn with_outcome(outcome: DeliveryOutcome) -> Self {
        Self {
            outcome,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn messages(&self) -> Vec<DeliveredMessage> {
        self.sent.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

impl DeliveryChannel for MockDelivery {
    fn deliver(&self, destination: &str, code: &str, recipient_name: &str) -> DeliveryOutcome {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(DeliveredMessage {
                destination: destination.to_string(),
                code: code.to_string(),
                recipient_name: recipient_name.to_string(),
            });
        }
        self.outcome.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_mentions_code_name_and_validity() {
        let body = render_otp_message("Priya Sharma", "042917", 5);
        assert!(body.contains("Hello Priya Sharma"));
        assert!(body.contains("042917"));
        assert!(body.contains("valid for 5 minutes"));
    }

    #[test]
    fn demo_delivery_always_falls_back() {
        let outcome = DemoDelivery.deliver("a@example.com", "123456", "A");
        assert!(outcome.is_fallback());
    }

    #[test]
    fn webhook_rejects_non_http_endpoint() {
        let result = WebhookDelivery::new("smtp://mail.example.com", 5, 5);
        assert!(matches!(result, Err(DeliveryError::InvalidEndpoint(_))));
    }

    #[test]
    fn webhook_trims_trailing_slash() {
        let hook = WebhookDelivery::new("http://127.0.0.1:9/notify/", 1, 5).unwrap();
        assert_eq!(hook.endpoint(), "http://127.0.0.1:9/notify");
    }

    #[test]
    fn unreachable_webhook_falls_back() {
        // Port 9 (discard) is closed on test hosts; the connect error must not escape.
        let hook = WebhookDelivery::new("http://127.0.0.1:9/notify", 1, 5).unwrap();
        let outcome = hook.deliver("rahul@example.com", "123456", "Rahul Kumar");
        assert!(outcome.is_fallback());
    }

    #[test]
    fn mock_records_messages() {
        let mock = MockDelivery::sending();
        assert_eq!(mock.deliver("x@example.com", "654321", "X"), DeliveryOutcome::Sent);
        let messages = mock.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].code, "654321");
        assert_eq!(messages[0].destination, "x@example.com");
    }

    #[test]
    fn outcome_serializes_with_mode_tag() {
        let json = serde_json::to_string(&DeliveryOutcome::Sent).unwrap();
        assert_eq!(json, r#"{"mode":"sent"}"#);
        let json = serde_json::to_string(&DeliveryOutcome::Fallback {
            reason: "offline".into(),
        })
        .unwrap();
        assert_eq!(json, r#"{"mode":"fallback","reason":"offline"}"#);
    }
}
