//! Render model for the chat page.

use chrono::{DateTime, Utc};

use crate::models::{Message, MessageBody, Profile};

/// Marker under the user's own messages once the partner has read them.
pub const SEEN_MARKER: &str = "✓ Seen";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowContent {
    Text(String),
    Image { url: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRow {
    pub id: String,
    pub sender: String,
    pub mine: bool,
    pub reply_quote: Option<String>,
    pub content: RowContent,
    pub created_at: DateTime<Utc>,
    /// Own message read by the partner.
    pub seen: bool,
}

impl MessageRow {
    pub fn from_message(message: &Message, me: &str) -> Self {
        let mine = message.is_from(me);
        let content = match &message.body {
            MessageBody::Text(text) => RowContent::Text(text.clone()),
            MessageBody::Image { url } => RowContent::Image { url: url.clone() },
        };
        Self {
            id: message.id.clone(),
            sender: message.sender_label.clone(),
            mine,
            reply_quote: message.reply_to_text.clone(),
            content,
            created_at: message.created_at,
            seen: mine && message.read,
        }
    }

    pub fn seen_marker(&self) -> Option<&'static str> {
        self.seen.then_some(SEEN_MARKER)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartnerHeader {
    pub name: String,
    pub initial: char,
    pub typing: bool,
}

impl PartnerHeader {
    pub fn new(partner: &Profile, typing: bool) -> Self {
        Self {
            name: partner.display_name.clone(),
            initial: partner.initial(),
            typing,
        }
    }

    pub fn title(&self) -> String {
        format!("Chatting with {}", self.name)
    }
}

/// Everything the chat page draws.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatView {
    /// Identity stream has not reported yet.
    pub loading: bool,
    pub signed_in: bool,
    pub me: Option<String>,
    pub partner: Option<PartnerHeader>,
    pub rows: Vec<MessageRow>,
    pub draft: String,
    /// Text of the staged reply target, shown above the composer.
    pub replying_to: Option<String>,
    pub emoji_picker_open: bool,
    /// Last send or upload failure.
    pub notice: Option<String>,
}
