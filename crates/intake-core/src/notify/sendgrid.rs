//! SendGrid v3 mail-send notifier

use super::{DeliveryReceipt, EmailMessage, Notifier, NotifierError};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use std::time::Duration;

/// Public SendGrid mail-send endpoint
pub const DEFAULT_SENDGRID_ENDPOINT: &str = "https://api.sendgrid.com/v3/mail/send";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const ERROR_BODY_LIMIT: usize = 512;

/// Sends mail through the SendGrid HTTP API
#[derive(Clone)]
pub struct SendGridNotifier {
    client: reqwest::Client,
    endpoint: String,
    api_key: SecretString,
}

impl std::fmt::Debug for SendGridNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendGridNotifier")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl SendGridNotifier {
    /// Create a notifier for the public endpoint
    ///
    /// # Errors
    /// `Transport` if the HTTP client cannot be built
    pub fn new(api_key: SecretString) -> Result<Self, NotifierError> {
        Self::with_endpoint(api_key, DEFAULT_SENDGRID_ENDPOINT)
    }

    /// Create a notifier for a specific endpoint
    ///
    /// # Errors
    /// `Transport` if the HTTP client cannot be built
    pub fn with_endpoint(
        api_key: SecretString,
        endpoint: impl Into<String>,
    ) -> Result<Self, NotifierError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| NotifierError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        })
    }

    fn payload(message: &EmailMessage) -> Value {
        let mut payload = json!({
            "personalizations": [{
                "to": message.to.iter().map(|email| json!({ "email": email })).collect::<Vec<_>>(),
            }],
            "from": { "email": message.from.email, "name": message.from.name },
            "subject": message.subject,
            "content": [{ "type": "text/html", "value": message.html }],
        });
        if !message.attachments.is_empty() {
            payload["attachments"] = message
                .attachments
                .iter()
                .map(|a| {
                    json!({
                        "content": STANDARD.encode(&a.content),
                        "filename": a.filename,
                        "type": a.content_type,
                        "disposition": "attachment",
                    })
                })
                .collect();
        }
        payload
    }
}

#[async_trait]
impl Notifier for SendGridNotifier {
    async fn send(&self, message: EmailMessage) -> Result<DeliveryReceipt, NotifierError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&Self::payload(&message))
            .send()
            .await
            .map_err(|e| NotifierError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::ACCEPTED {
            let message_id = response
                .headers()
                .get("x-message-id")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            return Ok(DeliveryReceipt { message_id });
        }

        let mut body = response.text().await.unwrap_or_default();
        truncate_on_char_boundary(&mut body, ERROR_BODY_LIMIT);
        tracing::error!(status = status.as_u16(), "sendgrid rejected message");
        Err(NotifierError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

fn truncate_on_char_boundary(text: &mut String, limit: usize) {
    if text.len() <= limit {
        return;
    }
    let cut = (0..=limit)
        .rev()
        .find(|&i| text.is_char_boundary(i))
        .unwrap_or(0);
    text.truncate(cut);
}
