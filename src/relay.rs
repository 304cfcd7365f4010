//! Turns a validated report into an email and hands it to the provider.

use std::time::Duration;

use askama::Template;
use chrono::{DateTime, SecondsFormat, Utc};
use lettre::message::Mailbox;
use lettre::Address;
use log::{error, info};
use uuid::Uuid;

use crate::config::{ConfigError, DeliveryConfig};
use crate::mailer::{EmailAttachment, EmailSender, OutboundEmail, SendError};
use crate::report::SubmissionRequest;
use crate::web::errors::ReportError;

#[derive(Template)]
#[template(path = "report_email.html")]
struct ReportEmailTemplate<'a> {
    reporter_name: &'a str,
    location: &'a str,
    description: &'a str,
    has_attachment: bool,
    attachment_name: &'a str,
    report_id: String,
    received_at: String,
}

/// Fixed sender and recipient, resolved once from [`DeliveryConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub from: String,
    pub to: String,
}

impl Envelope {
    /// Parses both addresses so an unusable configuration is caught at
    /// startup rather than on the first submission.
    pub fn from_config(config: &DeliveryConfig) -> Result<Self, ConfigError> {
        let invalid = |key: &str, value: &str| ConfigError::Invalid {
            key: key.to_string(),
            value: value.to_string(),
        };

        let from = if config.from_address.contains('<') {
            config
                .from_address
                .parse::<Mailbox>()
                .map_err(|_| invalid("EMAIL_FROM", &config.from_address))?
        } else {
            let address: Address = config
                .from_address
                .parse()
                .map_err(|_| invalid("EMAIL_FROM", &config.from_address))?;
            Mailbox::new(Some(config.sender_name.clone()), address)
        };
        let to: Mailbox = config
            .recipient
            .parse()
            .map_err(|_| invalid("EMAIL_RECEIVER", &config.recipient))?;

        Ok(Envelope {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

pub struct ComposeOptions<'a> {
    pub subject_prefix: &'a str,
    pub report_id: Uuid,
    pub received_at: DateTime<Utc>,
}

pub fn subject_for(prefix: &str, location: &str) -> String {
    format!("{}{}", prefix, location.replace(['\r', '\n'], " "))
}

pub fn compose(
    request: &SubmissionRequest,
    envelope: &Envelope,
    options: &ComposeOptions<'_>,
) -> Result<OutboundEmail, ReportError> {
    let attachment = request.attachment();
    let html = ReportEmailTemplate {
        reporter_name: request.reporter_name(),
        location: request.location(),
        description: request.description(),
        has_attachment: attachment.is_some(),
        attachment_name: attachment.map(|a| a.filename.as_str()).unwrap_or(""),
        report_id: options.report_id.to_string(),
        received_at: options
            .received_at
            .to_rfc3339_opts(SecondsFormat::Secs, true),
    }
    .render()?;

    Ok(OutboundEmail {
        from: envelope.from.clone(),
        to: envelope.to.clone(),
        subject: subject_for(options.subject_prefix, request.location()),
        html,
        attachments: attachment
            .map(|a| EmailAttachment {
                filename: a.filename.clone(),
                mime_type: a.mime_type.clone(),
                bytes: a.bytes.clone(),
            })
            .into_iter()
            .collect(),
    })
}

/// One send attempt, bounded by `timeout`. Failures are not retried.
pub async fn deliver(
    sender: &dyn EmailSender,
    email: OutboundEmail,
    timeout: Duration,
    report_id: Uuid,
) -> Result<(), SendError> {
    info!(
        "[relay] report {} sending via {} to {}",
        report_id,
        sender.name(),
        email.to
    );
    let outcome = match tokio::time::timeout(timeout, sender.send(email)).await {
        Ok(result) => result,
        Err(_) => Err(SendError::Timeout(timeout.as_secs())),
    };
    match &outcome {
        Ok(()) => info!("[relay] report {} sent", report_id),
        Err(e) => error!("[relay] report {} failed via {}: {}", report_id, sender.name(), e),
    }
    outcome
}
