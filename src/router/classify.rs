use std::collections::HashSet;

use crate::bus::{EventPayload, InboundEvent};

/// Classification of one inbound event; decides the dispatch branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    Command { name: String, args: String },
    Text,
    Document { file_type: String },
    Image { mime: String },
    Unsupported { kind: String },
}

/// Policy-free event classifier.
///
/// Knows the command prefix and the supported type sets, nothing else:
/// whether a command token exists is the registry's business, so an unknown
/// token still classifies as Command.
pub struct Classifier {
    prefix: String,
    document_types: HashSet<String>,
    image_types: HashSet<String>,
}

impl Classifier {
    pub fn new(prefix: &str, document_types: &[String], image_types: &[String]) -> Self {
        Self {
            prefix: prefix.to_string(),
            document_types: document_types.iter().map(|t| t.to_lowercase()).collect(),
            image_types: image_types.iter().map(|t| t.to_lowercase()).collect(),
        }
    }

    pub fn classify(&self, event: &InboundEvent) -> MessageKind {
        match &event.payload {
            EventPayload::Text { body } => self.classify_text(body),
            EventPayload::Document { filename, .. } => self.classify_document(filename.as_deref()),
            EventPayload::Image { mime_type, .. } => self.classify_image(mime_type.as_deref()),
            EventPayload::Other { kind } => MessageKind::Unsupported { kind: kind.clone() },
        }
    }

    fn classify_text(&self, body: &str) -> MessageKind {
        let trimmed = body.trim();
        if let Some(rest) = trimmed.strip_prefix(&self.prefix) {
            let mut parts = rest.splitn(2, char::is_whitespace);
            let token = parts.next().unwrap_or("");
            if !token.is_empty() {
                return MessageKind::Command {
                    name: token.to_lowercase(),
                    args: parts.next().unwrap_or("").trim().to_string(),
                };
            }
        }
        MessageKind::Text
    }

    fn classify_document(&self, filename: Option<&str>) -> MessageKind {
        let ext = filename
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_lowercase());
        match ext {
            Some(ext) if self.document_types.contains(&ext) => {
                MessageKind::Document { file_type: ext }
            }
            Some(ext) => MessageKind::Unsupported { kind: ext },
            None => MessageKind::Unsupported {
                kind: "document".to_string(),
            },
        }
    }

    fn classify_image(&self, mime_type: Option<&str>) -> MessageKind {
        let Some(mime) = mime_type else {
            return MessageKind::Unsupported {
                kind: "image".to_string(),
            };
        };
        let essence = mime.split(';').next().unwrap_or(mime).trim();
        let subtype = essence.strip_prefix("image/").unwrap_or("").to_lowercase();
        if self.image_types.contains(&subtype) {
            MessageKind::Image {
                mime: essence.to_string(),
            }
        } else {
            MessageKind::Unsupported {
                kind: if subtype.is_empty() {
                    "image".to_string()
                } else {
                    subtype
                },
            }
        }
    }
}
