use serde::{Deserialize, Serialize};

/// Raw JSON envelope carried after the sentinel.
/// Wire: `{ "type": "log", "message": "..." }` or `{ "type": "email", ... }`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    Log {
        message: String,
    },
    Email {
        subject: String,
        body: String,
        to: String,
        #[serde(default)]
        cc: String,
        #[serde(default)]
        bcc: String,
        #[serde(default)]
        attachments: Vec<AttachmentShape>,
    },
}

/// Attachment as it travels on the wire; content is base64 text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentShape {
    pub file_name: String,
    pub content_type: String,
    pub content: String,
}
