use async_trait::async_trait;
use jobhost_protocol::{EmailAttachment, EmailRequest};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// An outgoing email built from a job's request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub from: String,
    pub to: String,
    pub cc: String,
    pub bcc: String,
    pub subject: String,
    pub body: String,
    pub attachments: Vec<EmailAttachment>,
}

impl MailMessage {
    pub fn from_request(from: impl Into<String>, request: EmailRequest) -> Self {
        Self {
            from: from.into(),
            to: request.to,
            cc: request.cc,
            bcc: request.bcc,
            subject: request.subject,
            body: request.body,
            attachments: request.attachments,
        }
    }
}

#[derive(Debug, Error)]
pub enum MailError {
    /// The transport refused or failed to deliver the message.
    #[error("{0}")]
    Delivery(String),

    #[error("sending cancelled")]
    Cancelled,
}

/// Delivers mail requested by jobs.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, message: &MailMessage, cancel: &CancellationToken) -> Result<(), MailError>;
}

/// Transport that records the message in the log instead of delivering it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailTransport;

#[async_trait]
impl MailTransport for LogMailTransport {
    async fn send(&self, message: &MailMessage, cancel: &CancellationToken) -> Result<(), MailError> {
        if cancel.is_cancelled() {
            return Err(MailError::Cancelled);
        }
        info!(
            from = %message.from,
            to = %message.to,
            cc = %message.cc,
            subject = %message.subject,
            attachments = message.attachments.len(),
            "mail delivery skipped (log transport)"
        );
        Ok(())
    }
}
