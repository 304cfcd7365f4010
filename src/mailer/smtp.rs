use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use log::{debug, info};

use super::{EmailSender, OutboundEmail, SendError};

const STARTTLS_PORT: u16 = 587;

/// Authenticated SMTP submission. Port 587 negotiates STARTTLS, anything
/// else uses implicit TLS (Gmail listens on 465).
pub struct SmtpSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpSender {
    pub fn new(host: &str, port: u16, username: &str, password: &str) -> Result<Self, SendError> {
        let builder = (if port == STARTTLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
        })
        .map_err(|e| SendError::Transport(format!("failed to set up SMTP relay {}: {}", host, e)))?;

        let transport = builder
            .port(port)
            .credentials(Credentials::new(username.to_string(), password.to_string()))
            .build();

        info!("[smtp] transport ready for {}:{} as {}", host, port, username);
        Ok(SmtpSender { transport })
    }
}

pub(crate) fn build_message(email: &OutboundEmail) -> Result<Message, SendError> {
    let from: Mailbox = email
        .from
        .parse()
        .map_err(|e| SendError::Build(format!("invalid from address {:?}: {}", email.from, e)))?;
    let to: Mailbox = email
        .to
        .parse()
        .map_err(|e| SendError::Build(format!("invalid to address {:?}: {}", email.to, e)))?;

    let mut body = MultiPart::mixed().singlepart(SinglePart::html(email.html.clone()));
    for attachment in &email.attachments {
        let content_type = ContentType::parse(&attachment.mime_type)
            .or_else(|_| {
                debug!(
                    "[smtp] unparseable content type {:?}, sending as octet-stream",
                    attachment.mime_type
                );
                ContentType::parse("application/octet-stream")
            })
            .map_err(|e| SendError::Build(e.to_string()))?;
        body = body.singlepart(
            Attachment::new(attachment.filename.clone()).body(attachment.bytes.clone(), content_type),
        );
    }

    Message::builder()
        .from(from)
        .to(to)
        .subject(email.subject.clone())
        .multipart(body)
        .map_err(|e| SendError::Build(e.to_string()))
}

#[async_trait]
impl EmailSender for SmtpSender {
    async fn send(&self, email: OutboundEmail) -> Result<(), SendError> {
        let message = build_message(&email)?;
        let response = self
            .transport
            .send(message)
            .await
            .map_err(|e| SendError::Transport(e.to_string()))?;
        debug!("[smtp] server answered {:?}", response.code());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}
