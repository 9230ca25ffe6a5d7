use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::envelope::{AttachmentShape, Envelope};

/// Marks a stdout line as a structured message rather than plain text.
pub const SENTINEL: &str = "##jobhost:";

/// A decoded structured message emitted by a job on stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleMessage {
    Log { message: String },
    Email(EmailRequest),
}

/// A job's request to send an email on its behalf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailRequest {
    pub subject: String,
    pub body: String,
    pub to: String,
    pub cc: String,
    pub bcc: String,
    pub attachments: Vec<EmailAttachment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailAttachment {
    pub file_name: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

/// Decode one stdout line.
///
/// Returns `None` for plain text and for any envelope that is malformed,
/// carries an unknown `type`, or has attachment content that is not valid
/// base64.
pub fn decode(line: &str) -> Option<ConsoleMessage> {
    let payload = line.trim_end_matches(['\r', '\n']).strip_prefix(SENTINEL)?;
    let envelope: Envelope = serde_json::from_str(payload).ok()?;

    match envelope {
        Envelope::Log { message } => Some(ConsoleMessage::Log { message }),
        Envelope::Email {
            subject,
            body,
            to,
            cc,
            bcc,
            attachments,
        } => {
            let attachments = attachments
                .into_iter()
                .map(|a| {
                    STANDARD.decode(a.content.as_bytes()).ok().map(|content| EmailAttachment {
                        file_name: a.file_name,
                        content_type: a.content_type,
                        content,
                    })
                })
                .collect::<Option<Vec<_>>>()?;
            Some(ConsoleMessage::Email(EmailRequest {
                subject,
                body,
                to,
                cc,
                bcc,
                attachments,
            }))
        }
    }
}

/// Encode a message as a single stdout line (without the trailing newline).
pub fn encode(message: &ConsoleMessage) -> String {
    let envelope = match message {
        ConsoleMessage::Log { message } => Envelope::Log {
            message: message.clone(),
        },
        ConsoleMessage::Email(email) => Envelope::Email {
            subject: email.subject.clone(),
            body: email.body.clone(),
            to: email.to.clone(),
            cc: email.cc.clone(),
            bcc: email.bcc.clone(),
            attachments: email
                .attachments
                .iter()
                .map(|a| AttachmentShape {
                    file_name: a.file_name.clone(),
                    content_type: a.content_type.clone(),
                    content: STANDARD.encode(&a.content),
                })
                .collect(),
        },
    };
    // Envelope holds only strings and vectors of strings, so serialization cannot fail.
    let json = serde_json::to_string(&envelope).unwrap_or_default();
    format!("{SENTINEL}{json}")
}
