//! Draft state for the message composer.

use crate::models::Message;

/// Horizontal swipe distance past which a message is staged as the reply
/// target.
pub const SWIPE_REPLY_THRESHOLD: f32 = 70.0;

/// Emoji offered by the picker.
pub const EMOJI_PALETTE: [&str; 8] = ["😀", "😂", "😍", "👍", "🙏", "🎉", "❤️", "😢"];

#[derive(Debug, Default, Clone)]
pub struct Composer {
    draft: String,
    reply_to: Option<Message>,
    emoji_picker_open: bool,
}

impl Composer {
    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, text: &str) {
        self.draft.clear();
        self.draft.push_str(text);
    }

    /// Append to the draft, e.g. a picked emoji.
    pub fn append(&mut self, text: &str) {
        self.draft.push_str(text);
    }

    pub fn reply_target(&self) -> Option<&Message> {
        self.reply_to.as_ref()
    }

    pub fn stage_reply(&mut self, message: Message) {
        self.reply_to = Some(message);
    }

    pub fn clear_reply(&mut self) {
        self.reply_to = None;
    }

    /// Stage `message` if the swipe went far enough. Returns whether it did.
    pub fn on_swipe(&mut self, message: &Message, delta_x: f32) -> bool {
        if delta_x > SWIPE_REPLY_THRESHOLD {
            self.stage_reply(message.clone());
            true
        } else {
            false
        }
    }

    pub fn emoji_picker_open(&self) -> bool {
        self.emoji_picker_open
    }

    pub fn toggle_emoji_picker(&mut self) {
        self.emoji_picker_open = !self.emoji_picker_open;
    }

    /// Text to send and the quoted reply text, or `None` for a blank draft.
    /// Image messages have no text to quote.
    pub fn outgoing(&self) -> Option<(String, Option<String>)> {
        let text = self.draft.trim();
        if text.is_empty() {
            return None;
        }
        let quote = self
            .reply_to
            .as_ref()
            .and_then(|m| m.text())
            .map(String::from);
        Some((text.to_string(), quote))
    }

    /// Reset after a successful send.
    pub fn clear_after_send(&mut self) {
        self.draft.clear();
        self.reply_to = None;
        self.emoji_picker_open = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageBody;
    use chrono::Utc;

    fn message(body: MessageBody) -> Message {
        Message {
            id: "m1".into(),
            body,
            sender_id: "u2".into(),
            sender_label: "Bo".into(),
            created_at: Utc::now(),
            read: false,
            reply_to_text: None,
        }
    }

    #[test]
    fn test_blank_draft_has_nothing_to_send() {
        let mut composer = Composer::default();
        composer.set_draft(" \t ");
        assert!(composer.outgoing().is_none());
        assert_eq!(composer.draft(), " \t ");
    }

    #[test]
    fn test_outgoing_trims_and_quotes_reply() {
        let mut composer = Composer::default();
        composer.stage_reply(message(MessageBody::Text("hi".into())));
        composer.set_draft("  yo ");
        assert_eq!(
            composer.outgoing(),
            Some(("yo".to_string(), Some("hi".to_string())))
        );
    }

    #[test]
    fn test_reply_to_image_has_no_quote() {
        let mut composer = Composer::default();
        composer.stage_reply(message(MessageBody::Image {
            url: "u".into(),
        }));
        composer.set_draft("nice");
        assert_eq!(composer.outgoing(), Some(("nice".to_string(), None)));
    }

    #[test]
    fn test_swipe_threshold() {
        let mut composer = Composer::default();
        let m = message(MessageBody::Text("hi".into()));
        assert!(!composer.on_swipe(&m, 70.0));
        assert!(composer.reply_target().is_none());
        assert!(composer.on_swipe(&m, 70.5));
        assert_eq!(composer.reply_target().map(|m| m.id.as_str()), Some("m1"));
    }

    #[test]
    fn test_clear_after_send_resets_everything() {
        let mut composer = Composer::default();
        composer.set_draft("hey");
        composer.toggle_emoji_picker();
        composer.append(EMOJI_PALETTE[3]);
        composer.stage_reply(message(MessageBody::Text("hi".into())));
        assert_eq!(composer.draft(), "hey👍");

        composer.clear_after_send();
        assert_eq!(composer.draft(), "");
        assert!(composer.reply_target().is_none());
        assert!(!composer.emoji_picker_open());
    }
}
