//! Message-related models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Message kind, as stored in the log's `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageKind {
    Text,
    Image,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
        }
    }
}

/// Message payload. Text messages carry a body, image messages a URL;
/// never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageBody {
    Text(String),
    Image { url: String },
}

impl MessageBody {
    pub fn kind(&self) -> MessageKind {
        match self {
            MessageBody::Text(_) => MessageKind::Text,
            MessageBody::Image { .. } => MessageKind::Image,
        }
    }
}

/// Chat message as delivered by the message log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub body: MessageBody,
    pub sender_id: String,
    pub sender_label: String,
    /// Server clock at write time. Defines the total order of the log.
    pub created_at: DateTime<Utc>,
    pub read: bool,
    pub reply_to_text: Option<String>,
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }

    pub fn text(&self) -> Option<&str> {
        match &self.body {
            MessageBody::Text(text) => Some(text),
            MessageBody::Image { .. } => None,
        }
    }

    pub fn image_url(&self) -> Option<&str> {
        match &self.body {
            MessageBody::Image { url } => Some(url),
            MessageBody::Text(_) => None,
        }
    }

    pub fn is_from(&self, user_id: &str) -> bool {
        self.sender_id == user_id
    }

    /// Sort key for the log's total order. Ties on the server clock are
    /// broken by id so every snapshot renders identically.
    pub fn order_key(&self) -> (DateTime<Utc>, &str) {
        (self.created_at, &self.id)
    }
}

/// A message about to be appended. The log assigns `id`, `created_at`
/// and starts every message with `read = false`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub body: MessageBody,
    pub sender_id: String,
    pub sender_label: String,
    pub reply_to_text: Option<String>,
}

impl NewMessage {
    pub fn text(
        sender_id: &str,
        sender_label: &str,
        text: &str,
        reply_to_text: Option<String>,
    ) -> Self {
        Self {
            body: MessageBody::Text(text.to_string()),
            sender_id: sender_id.to_string(),
            sender_label: sender_label.to_string(),
            reply_to_text,
        }
    }

    pub fn image(sender_id: &str, sender_label: &str, url: &str) -> Self {
        Self {
            body: MessageBody::Image {
                url: url.to_string(),
            },
            sender_id: sender_id.to_string(),
            sender_label: sender_label.to_string(),
            reply_to_text: None,
        }
    }
}

/// The only in-place mutation a logged message accepts. `read` goes
/// false -> true and never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessagePatch {
    MarkRead,
}

impl MessagePatch {
    pub fn apply(&self, message: &mut Message) {
        match self {
            MessagePatch::MarkRead => message.read = true,
        }
    }
}
