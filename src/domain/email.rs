use chrono::{DateTime, Utc};
use serde::Serialize;

/// Sequence number of a message inside one mailbox snapshot. Not stable
/// across sessions; never use it as a durable key.
pub type EmailId = u32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentInfo {
    pub filename: Option<String>,
    pub size: usize,
    pub content_type: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedEmail {
    pub id: EmailId,
    pub from: Vec<String>,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub subject: String,
    pub date: Option<DateTime<Utc>>,
    pub text: String,
    pub html: String,
    pub attachments: Vec<AttachmentInfo>,
}

/// One page of the sent folder, newest first.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SentPage {
    pub total: usize,
    pub emails: Vec<ParsedEmail>,
    pub senders: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SendersPage {
    pub total: usize,
    pub senders: Vec<String>,
}
