//! Outbound email delivery.
//!
//! The relay only ever talks to [`EmailSender`]; which concrete provider
//! sits behind it is decided once at startup by [`build_sender`].

pub mod resend;
pub mod smtp;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{DeliveryConfig, ProviderConfig};

/// A provider-neutral email; the relay attaches zero or one photo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    /// Display form, e.g. `Problem Reports <relay@example.com>`.
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html: String,
    pub attachments: Vec<EmailAttachment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailAttachment {
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error("failed to build message: {0}")]
    Build(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("provider rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("provider did not answer within {0} seconds")]
    Timeout(u64),
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, email: OutboundEmail) -> Result<(), SendError>;

    /// Short provider name used in log lines.
    fn name(&self) -> &'static str;
}

pub fn build_sender(config: &DeliveryConfig) -> Result<Arc<dyn EmailSender>, SendError> {
    match &config.provider {
        ProviderConfig::Smtp {
            host,
            port,
            username,
            password,
        } => Ok(Arc::new(smtp::SmtpSender::new(host, *port, username, password)?)),
        ProviderConfig::Resend { api_key } => Ok(Arc::new(resend::ResendSender::new(api_key)?)),
    }
}
