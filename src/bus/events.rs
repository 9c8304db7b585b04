use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One normalized inbound message from the webhook, immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Platform message id; unique per delivery attempt, but the platform
    /// may redeliver the same id.
    pub message_id: String,
    /// Sender phone number, digits only.
    pub sender: String,
    pub sender_name: Option<String>,
    pub group_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    Text {
        body: String,
    },
    Document {
        media_id: String,
        filename: Option<String>,
        mime_type: Option<String>,
        declared_bytes: Option<u64>,
        caption: Option<String>,
    },
    Image {
        media_id: String,
        mime_type: Option<String>,
        declared_bytes: Option<u64>,
        caption: Option<String>,
    },
    /// Anything the bot does not handle (audio, video, stickers, ...).
    Other {
        #[serde(rename = "other_kind")]
        kind: String,
    },
}

impl InboundEvent {
    pub fn text(message_id: &str, sender: &str, body: &str) -> Self {
        Self {
            message_id: message_id.to_string(),
            sender: sender.to_string(),
            sender_name: None,
            group_id: None,
            timestamp: Utc::now(),
            payload: EventPayload::Text {
                body: body.to_string(),
            },
        }
    }

    /// Short tag for logs and the message log's kind column.
    pub fn payload_kind(&self) -> &str {
        match &self.payload {
            EventPayload::Text { .. } => "text",
            EventPayload::Document { .. } => "document",
            EventPayload::Image { .. } => "image",
            EventPayload::Other { kind } => kind.as_str(),
        }
    }

    /// Loggable content preview: message text or media descriptor.
    pub fn content_preview(&self) -> String {
        match &self.payload {
            EventPayload::Text { body } => body.clone(),
            EventPayload::Document { filename, .. } => {
                format!("[document] {}", filename.as_deref().unwrap_or("unnamed"))
            }
            EventPayload::Image { caption, .. } => {
                format!("[image] {}", caption.as_deref().unwrap_or(""))
            }
            EventPayload::Other { kind } => format!("[{kind}]"),
        }
    }
}
