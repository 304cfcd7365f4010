//! Resend HTTP API (<https://resend.com/docs/api-reference/emails/send-email>).

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use log::debug;
use serde::Serialize;

use super::{EmailSender, OutboundEmail, SendError};

const RESEND_ENDPOINT: &str = "https://api.resend.com/emails";

#[derive(Serialize)]
struct ResendPayload<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<ResendAttachment<'a>>,
}

#[derive(Serialize)]
struct ResendAttachment<'a> {
    filename: &'a str,
    /// Base64 of the raw bytes; the API does not accept binary bodies.
    content: String,
    content_type: &'a str,
}

pub struct ResendSender {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl ResendSender {
    pub fn new(api_key: &str) -> Result<Self, SendError> {
        Self::with_endpoint(api_key, RESEND_ENDPOINT)
    }

    pub fn with_endpoint(api_key: &str, endpoint: &str) -> Result<Self, SendError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| SendError::Transport(format!("HTTP client error: {}", e)))?;
        Ok(ResendSender {
            client,
            api_key: api_key.to_string(),
            endpoint: endpoint.to_string(),
        })
    }
}

fn payload(email: &OutboundEmail) -> ResendPayload<'_> {
    ResendPayload {
        from: &email.from,
        to: [&email.to],
        subject: &email.subject,
        html: &email.html,
        attachments: email
            .attachments
            .iter()
            .map(|a| ResendAttachment {
                filename: &a.filename,
                content: STANDARD.encode(&a.bytes),
                content_type: &a.mime_type,
            })
            .collect(),
    }
}

#[async_trait]
impl EmailSender for ResendSender {
    async fn send(&self, email: OutboundEmail) -> Result<(), SendError> {
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload(&email))
            .send()
            .await
            .map_err(|e| SendError::Transport(format!("Resend request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SendError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!("[resend] accepted with status {}", status);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "resend"
    }
}
