//! Chat session controller.
//!
//! Merges three live feeds (identity, message log, partner typing flag)
//! into one view and turns user intents into platform writes. The session
//! is driven by a single task: `next_event` waits for whichever feed fires
//! first and `apply` folds it into the view, so feed callbacks and user
//! actions never interleave.

use std::future::pending;
use std::path::Path;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::composer::Composer;
use super::partner::{self, Conversation};
use super::receipts::ReadReceipts;
use super::typing::TypingPulse;
use super::view::{ChatView, MessageRow, PartnerHeader};
use crate::error::{reason, ChatError};
use crate::models::{Identity, Message, NewMessage, Profile, TypingFlag};
use crate::platform::{Platform, Subscription};

/// One emission from any of the session's feeds.
#[derive(Debug)]
pub enum SessionEvent {
    Identity(Option<Identity>),
    Messages(Vec<Message>),
    PartnerTyping(TypingFlag),
    /// The identity stream is gone; nothing more will arrive.
    Closed,
}

pub struct ChatSession {
    platform: Platform,
    identity_rx: watch::Receiver<Option<Identity>>,
    identity_primed: bool,
    loading: bool,
    identity: Option<Identity>,
    conversation: Option<Conversation>,
    messages: Vec<Message>,
    snapshot_seen: bool,
    partner_typing: bool,
    composer: Composer,
    notice: Option<String>,
    message_feed: Option<Subscription<Vec<Message>>>,
    typing_feed: Option<Subscription<TypingFlag>>,
    pulse: Option<TypingPulse>,
    /// `None` when the session never shows messages to anyone.
    receipts: Option<ReadReceipts>,
    receipt_tasks: Vec<JoinHandle<()>>,
}

async fn next_snapshot(feed: &mut Option<Subscription<Vec<Message>>>) -> Option<Vec<Message>> {
    match feed {
        Some(sub) => sub.next_latest().await,
        None => pending().await,
    }
}

async fn next_flag(feed: &mut Option<Subscription<TypingFlag>>) -> Option<TypingFlag> {
    match feed {
        Some(sub) => sub.next_latest().await,
        None => pending().await,
    }
}

/// Content type for an upload, from the file extension.
fn content_type_for(file_name: &str) -> &'static str {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

/// Storage path for an upload: namespaced by sender, prefixed with a fresh
/// unique id so two uploads of the same file never collide.
pub fn upload_path(sender_id: &str, file_name: &str) -> String {
    let base = Path::new(file_name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload");
    format!("uploads/{}/{}-{}", sender_id, uuid::Uuid::new_v4(), base)
}

impl ChatSession {
    pub fn new(platform: Platform) -> Self {
        let receipts = ReadReceipts::new(platform.messages.clone());
        Self::build(platform, Some(receipts))
    }

    /// Session for callers that write without displaying the log. Partner
    /// messages stay unread.
    pub fn without_read_receipts(platform: Platform) -> Self {
        Self::build(platform, None)
    }

    fn build(platform: Platform, receipts: Option<ReadReceipts>) -> Self {
        let identity_rx = platform.auth.identity_changes();
        Self {
            platform,
            identity_rx,
            identity_primed: false,
            loading: true,
            identity: None,
            conversation: None,
            messages: Vec::new(),
            snapshot_seen: false,
            partner_typing: false,
            composer: Composer::default(),
            notice: None,
            message_feed: None,
            typing_feed: None,
            pulse: None,
            receipts,
            receipt_tasks: Vec::new(),
        }
    }

    /// Wait for the next feed emission. The first call reports the current
    /// identity.
    pub async fn next_event(&mut self) -> SessionEvent {
        if !self.identity_primed {
            self.identity_primed = true;
            return SessionEvent::Identity(self.identity_rx.borrow_and_update().clone());
        }

        tokio::select! {
            changed = self.identity_rx.changed() => match changed {
                Ok(()) => SessionEvent::Identity(self.identity_rx.borrow_and_update().clone()),
                Err(_) => SessionEvent::Closed,
            },
            Some(snapshot) = next_snapshot(&mut self.message_feed) => SessionEvent::Messages(snapshot),
            Some(flag) = next_flag(&mut self.typing_feed) => SessionEvent::PartnerTyping(flag),
        }
    }

    pub async fn apply(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Identity(identity) => self.on_identity(identity).await,
            SessionEvent::Messages(snapshot) => self.on_messages(snapshot),
            SessionEvent::PartnerTyping(flag) => self.on_partner_typing(flag),
            SessionEvent::Closed => self.close(),
        }
    }

    /// Process feed events until the identity is known and, when signed
    /// in, the first message snapshot has arrived.
    pub async fn settle(&mut self) -> Result<(), ChatError> {
        loop {
            if !self.loading {
                match self.identity {
                    None => return Err(ChatError::NotSignedIn),
                    Some(_) if self.snapshot_seen => return Ok(()),
                    Some(_) => {}
                }
            }
            match self.next_event().await {
                SessionEvent::Closed => return Err(ChatError::NotSignedIn),
                event => self.apply(event).await,
            }
        }
    }

    async fn on_identity(&mut self, identity: Option<Identity>) {
        self.loading = false;

        let Some(identity) = identity else {
            if self.identity.is_some() {
                tracing::info!("Signed out, clearing chat state");
            }
            self.teardown();
            return;
        };
        if self.identity.as_ref() == Some(&identity) && self.message_feed.is_some() {
            return;
        }

        self.teardown();
        let conversation = match partner::discover(&*self.platform.directory, &identity).await {
            Ok(conversation) => conversation,
            Err(e) => {
                tracing::error!("Error loading user: {:#}", e);
                Conversation {
                    me: Profile {
                        id: identity.id.clone(),
                        display_name: identity.display_name.clone(),
                        phone_number: identity.phone_number.clone(),
                        created_at: None,
                    },
                    partner: None,
                }
            }
        };

        match (&conversation.partner, conversation.id()) {
            (Some(partner), Some(id)) => {
                tracing::info!("Chatting with {} (conversation {})", partner.display_name, id)
            }
            _ => tracing::info!("No chat partner in the directory yet"),
        }

        self.message_feed = Some(self.platform.messages.subscribe_ordered());
        self.typing_feed = conversation
            .partner
            .as_ref()
            .map(|p| self.platform.typing.watch(&p.id));
        self.pulse = Some(TypingPulse::start(
            self.platform.typing.clone(),
            &identity.id,
        ));
        self.conversation = Some(conversation);
        self.identity = Some(identity);
    }

    fn on_messages(&mut self, mut snapshot: Vec<Message>) {
        snapshot.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
        self.messages = snapshot;
        self.snapshot_seen = true;

        self.receipt_tasks.retain(|task| !task.is_finished());
        if let (Some(identity), Some(receipts)) = (&self.identity, &self.receipts) {
            if let Some(task) = receipts.mark_seen(&self.messages, &identity.id) {
                self.receipt_tasks.push(task);
            }
        }
    }

    fn on_partner_typing(&mut self, flag: TypingFlag) {
        let is_partner = self
            .conversation
            .as_ref()
            .and_then(|c| c.partner.as_ref())
            .is_some_and(|p| p.id == flag.owner_id);
        if is_partner {
            self.partner_typing = flag.is_typing;
        }
    }

    /// Drop every feed and timer and clear the view. Safe to call any
    /// number of times.
    fn teardown(&mut self) {
        if let Some(mut feed) = self.message_feed.take() {
            feed.unsubscribe();
        }
        if let Some(mut feed) = self.typing_feed.take() {
            feed.unsubscribe();
        }
        if let Some(mut pulse) = self.pulse.take() {
            pulse.stop();
        }
        self.identity = None;
        self.conversation = None;
        self.messages.clear();
        self.snapshot_seen = false;
        self.partner_typing = false;
        self.composer = Composer::default();
        self.notice = None;
    }

    /// Unmount: stop all feeds. The session stays usable only for reading
    /// its (now empty) view.
    pub fn close(&mut self) {
        self.teardown();
    }

    /// Keystroke in the composer: replace the draft and pulse the typing
    /// flag.
    pub fn update_draft(&mut self, text: &str) {
        self.composer.set_draft(text);
        if let Some(pulse) = self.pulse.as_mut() {
            pulse.keystroke();
        }
    }

    /// Replace the draft without touching the typing flag.
    pub fn set_draft(&mut self, text: &str) {
        self.composer.set_draft(text);
    }

    pub fn append_to_draft(&mut self, text: &str) {
        self.composer.append(text);
    }

    pub fn toggle_emoji_picker(&mut self) {
        self.composer.toggle_emoji_picker();
    }

    /// Stage the message with `message_id` as the reply target.
    pub fn stage_reply(&mut self, message_id: &str) -> bool {
        match self.messages.iter().find(|m| m.id == message_id) {
            Some(message) => {
                self.composer.stage_reply(message.clone());
                true
            }
            None => false,
        }
    }

    /// Horizontal swipe on a message bubble.
    pub fn swipe(&mut self, message_id: &str, delta_x: f32) -> bool {
        match self.messages.iter().find(|m| m.id == message_id) {
            Some(message) => self.composer.on_swipe(message, delta_x),
            None => false,
        }
    }

    pub fn clear_reply(&mut self) {
        self.composer.clear_reply();
    }

    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    /// Send the draft as a text message. A blank draft is a no-op and
    /// returns `Ok(None)`. The new message is not inserted locally; it shows
    /// up with the next log snapshot.
    ///
    /// On failure the draft is kept and the error is both logged and put
    /// on the notice line.
    pub async fn send_message(&mut self) -> Result<Option<String>, ChatError> {
        let Some((text, reply_to_text)) = self.composer.outgoing() else {
            return Ok(None);
        };
        let me = self.me()?.clone();

        let message = NewMessage::text(&me.id, me.sender_label(), &text, reply_to_text);
        match self.platform.messages.append(&message).await {
            Ok(id) => {
                tracing::debug!("Sent message {}", id);
                self.composer.clear_after_send();
                self.notice = None;
                Ok(Some(id))
            }
            Err(e) => {
                tracing::error!("Error sending message: {:#}", e);
                Err(self.raise(ChatError::MessageWriteFailed(reason(&e))))
            }
        }
    }

    /// Upload an image and post it as an image message.
    pub async fn send_image(&mut self, bytes: Vec<u8>, file_name: &str) -> Result<String, ChatError> {
        let me = self.me()?.clone();
        let path = upload_path(&me.id, file_name);

        let url = match self
            .platform
            .blobs
            .upload(&path, bytes, content_type_for(file_name))
            .await
        {
            Ok(url) => url,
            Err(e) => {
                tracing::error!("Error uploading file: {:#}", e);
                return Err(self.raise(ChatError::UploadFailed(reason(&e))));
            }
        };

        let message = NewMessage::image(&me.id, me.sender_label(), &url);
        match self.platform.messages.append(&message).await {
            Ok(id) => {
                tracing::debug!("Sent image {} as {}", path, id);
                self.notice = None;
                Ok(id)
            }
            Err(e) => {
                tracing::error!("Error sending image message: {:#}", e);
                Err(self.raise(ChatError::MessageWriteFailed(reason(&e))))
            }
        }
    }

    pub async fn sign_out(&mut self) -> anyhow::Result<()> {
        self.platform.auth.sign_out().await?;
        self.on_identity(None).await;
        Ok(())
    }

    /// Wait for every read receipt issued so far to land.
    pub async fn flush_receipts(&mut self) {
        for task in self.receipt_tasks.drain(..) {
            if let Err(e) = task.await {
                tracing::debug!("Read receipt task ended early: {}", e);
            }
        }
    }

    fn me(&self) -> Result<&Profile, ChatError> {
        self.conversation
            .as_ref()
            .map(|c| &c.me)
            .ok_or(ChatError::NotSignedIn)
    }

    fn raise(&mut self, err: ChatError) -> ChatError {
        self.notice = Some(err.to_string());
        err
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn draft(&self) -> &str {
        self.composer.draft()
    }

    pub fn view(&self) -> ChatView {
        let me = self.identity.as_ref().map(|i| i.id.as_str()).unwrap_or("");
        ChatView {
            loading: self.loading,
            signed_in: self.identity.is_some(),
            me: self
                .conversation
                .as_ref()
                .map(|c| c.me.sender_label().to_string()),
            partner: self
                .conversation
                .as_ref()
                .and_then(|c| c.partner.as_ref())
                .map(|p| PartnerHeader::new(p, self.partner_typing)),
            rows: self
                .messages
                .iter()
                .map(|m| MessageRow::from_message(m, me))
                .collect(),
            draft: self.composer.draft().to_string(),
            replying_to: self
                .composer
                .reply_target()
                .map(|m| m.text().unwrap_or("[image]").to_string()),
            emoji_picker_open: self.composer.emoji_picker_open(),
            notice: self.notice.clone(),
        }
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::auth::{AuthFlow, StaticChallenge};
    use crate::chat::view::{RowContent, SEEN_MARKER};
    use crate::models::MessageKind;
    use crate::platform::memory::{Failures, MemoryServer};

    async fn sign_in(server: &MemoryServer, phone: &str, name: &str) -> Platform {
        let platform = server.platform();
        let mut flow = AuthFlow::new(
            &platform,
            Arc::new(StaticChallenge::new(Some("challenge".into()))),
        );
        flow.request_code(phone).await.unwrap();
        flow.verify_code("123456", name).await.unwrap();
        platform
    }

    async fn open(platform: Platform) -> ChatSession {
        let mut session = ChatSession::new(platform);
        session.settle().await.unwrap();
        session
    }

    /// Apply events until `done` holds.
    async fn pump_until(session: &mut ChatSession, done: impl Fn(&ChatSession) -> bool) {
        let result = tokio::time::timeout(Duration::from_secs(30), async {
            while !done(&*session) {
                let event = session.next_event().await;
                session.apply(event).await;
            }
        })
        .await;
        assert!(result.is_ok(), "session never reached expected state");
    }

    /// Alice and Bob both signed in, each with an open session.
    async fn pair(server: &MemoryServer) -> (ChatSession, ChatSession) {
        let alice = sign_in(server, "+15550001", "Alice").await;
        let bob = sign_in(server, "+15550002", "Bob").await;
        (open(alice).await, open(bob).await)
    }

    #[tokio::test]
    async fn test_signed_out_session_does_not_settle() {
        let server = MemoryServer::new();
        let mut session = ChatSession::new(server.platform());
        assert!(session.view().loading);
        assert!(matches!(session.settle().await, Err(ChatError::NotSignedIn)));
        assert!(!session.view().loading);
        assert_eq!(server.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_partner_is_first_other_profile() {
        let server = MemoryServer::new();
        let (alice, bob) = pair(&server).await;

        let header = alice.view().partner.unwrap();
        assert_eq!(header.name, "Bob");
        assert_eq!(header.initial, 'B');
        assert_eq!(header.title(), "Chatting with Bob");
        assert_eq!(bob.view().partner.unwrap().name, "Alice");
        assert_eq!(alice.view().me.as_deref(), Some("Alice"));
    }

    #[tokio::test]
    async fn test_hello_is_delivered_and_seen() {
        let server = MemoryServer::new();
        let (mut alice, mut bob) = pair(&server).await;

        alice.update_draft("hello");
        let id = alice.send_message().await.unwrap().unwrap();
        // No local echo; the log delivers it.
        assert!(alice.messages().is_empty());
        assert_eq!(alice.draft(), "");

        pump_until(&mut bob, |s| !s.messages().is_empty()).await;
        let row = &bob.view().rows[0];
        assert_eq!(row.id, id);
        assert_eq!(row.content, RowContent::Text("hello".into()));
        assert_eq!(row.sender, "Alice");
        assert!(!row.mine);
        assert!(!bob.messages()[0].read);

        pump_until(&mut alice, |s| s.messages().first().is_some_and(|m| m.read)).await;
        let row = &alice.view().rows[0];
        assert!(row.mine);
        assert_eq!(row.seen_marker(), Some(SEEN_MARKER));
        assert!(server.messages()[0].read);
    }

    #[tokio::test]
    async fn test_own_messages_are_never_marked_read_by_author() {
        let server = MemoryServer::new();
        let (mut alice, _bob) = pair(&server).await;

        alice.update_draft("note to self");
        alice.send_message().await.unwrap();
        pump_until(&mut alice, |s| s.messages().len() == 1).await;
        tokio::task::yield_now().await;

        assert!(!server.messages()[0].read);
        assert_eq!(alice.view().rows[0].seen_marker(), None);
    }

    #[tokio::test]
    async fn test_blank_send_is_noop() {
        let server = MemoryServer::new();
        let (mut alice, _bob) = pair(&server).await;

        alice.update_draft("   ");
        assert_eq!(alice.send_message().await.unwrap(), None);
        assert_eq!(alice.draft(), "   ");
        assert!(server.messages().is_empty());
    }

    #[tokio::test]
    async fn test_reply_carries_quoted_text() {
        let server = MemoryServer::new();
        let (mut alice, mut bob) = pair(&server).await;

        bob.update_draft("hi");
        bob.send_message().await.unwrap();
        pump_until(&mut alice, |s| s.messages().len() == 1).await;

        let target = alice.messages()[0].id.clone();
        assert!(!alice.swipe(&target, 40.0));
        assert!(alice.swipe(&target, 90.0));
        assert_eq!(alice.view().replying_to.as_deref(), Some("hi"));

        alice.toggle_emoji_picker();
        alice.update_draft("yo");
        alice.send_message().await.unwrap();

        let view = alice.view();
        assert!(view.replying_to.is_none());
        assert!(!view.emoji_picker_open);

        let sent = server.messages();
        assert_eq!(sent[1].text(), Some("yo"));
        assert_eq!(sent[1].reply_to_text.as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn test_clear_reply_drops_target() {
        let server = MemoryServer::new();
        let (mut alice, _bob) = pair(&server).await;
        server.insert_message(&NewMessage::text("someone", "S", "hi", None));
        pump_until(&mut alice, |s| s.messages().len() == 1).await;

        let id = alice.messages()[0].id.clone();
        assert!(alice.stage_reply(&id));
        alice.clear_reply();
        alice.update_draft("plain");
        alice.send_message().await.unwrap();

        assert_eq!(server.messages()[1].reply_to_text, None);
        assert!(!alice.stage_reply("missing"));
    }

    #[tokio::test]
    async fn test_image_upload_posts_image_message() {
        let server = MemoryServer::new();
        let (mut alice, _bob) = pair(&server).await;
        let me = alice.identity().unwrap().id.clone();

        alice
            .send_image(b"\x89PNG".to_vec(), "/tmp/cat.png")
            .await
            .unwrap();

        let stored = server.messages();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].kind(), MessageKind::Image);
        assert_eq!(stored[0].text(), None);
        assert!(!stored[0].read);

        let url = stored[0].image_url().unwrap();
        let path = url.trim_start_matches("memory://blobs/");
        assert!(path.starts_with(&format!("uploads/{}/", me)));
        assert!(path.ends_with("-cat.png"));
        assert_eq!(server.blob(path), Some(b"\x89PNG".to_vec()));
    }

    #[test]
    fn test_same_file_uploads_get_distinct_paths() {
        let a = upload_path("u1", "cat.png");
        let b = upload_path("u1", "cat.png");
        assert_ne!(a, b);
        assert_eq!(content_type_for("CAT.PNG"), "image/png");
        assert_eq!(content_type_for("notes"), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_send_failure_keeps_draft_and_sets_notice() {
        let server = MemoryServer::new();
        let (mut alice, _bob) = pair(&server).await;
        server.set_failures(Failures {
            message_writes: true,
            ..Failures::default()
        });

        alice.update_draft("hello");
        let err = alice.send_message().await.unwrap_err();
        assert!(matches!(err, ChatError::MessageWriteFailed(_)));
        assert_eq!(alice.draft(), "hello");
        assert!(alice.view().notice.is_some());

        server.set_failures(Failures::default());
        alice.send_message().await.unwrap();
        assert!(alice.view().notice.is_none());
    }

    #[tokio::test]
    async fn test_upload_failure_posts_nothing() {
        let server = MemoryServer::new();
        let (mut alice, _bob) = pair(&server).await;
        server.set_failures(Failures {
            uploads: true,
            ..Failures::default()
        });

        let err = alice.send_image(vec![1], "cat.png").await.unwrap_err();
        assert!(matches!(err, ChatError::UploadFailed(_)));
        assert!(server.messages().is_empty());
        assert!(alice.view().notice.unwrap().contains("upload"));
    }

    #[tokio::test]
    async fn test_snapshots_render_in_server_order() {
        let server = MemoryServer::new();
        let (mut alice, mut bob) = pair(&server).await;

        for text in ["one", "two", "three"] {
            alice.update_draft(text);
            alice.send_message().await.unwrap();
            bob.update_draft(text);
            bob.send_message().await.unwrap();
        }
        pump_until(&mut alice, |s| s.messages().len() == 6).await;

        let stamps: Vec<_> = alice.messages().iter().map(|m| m.created_at).collect();
        let mut sorted = stamps.clone();
        sorted.sort();
        assert_eq!(stamps, sorted);

        let texts: Vec<_> = alice.messages().iter().filter_map(|m| m.text()).collect();
        assert_eq!(texts, vec!["one", "one", "two", "two", "three", "three"]);
    }

    #[tokio::test]
    async fn test_unsorted_snapshot_is_ordered() {
        let server = MemoryServer::new();
        let (mut alice, _bob) = pair(&server).await;
        server.insert_message(&NewMessage::text("x", "X", "first", None));
        server.insert_message(&NewMessage::text("x", "X", "second", None));

        let mut snapshot = server.messages();
        snapshot.reverse();
        alice.apply(SessionEvent::Messages(snapshot)).await;

        let texts: Vec<_> = alice.messages().iter().filter_map(|m| m.text()).collect();
        assert_eq!(texts, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_partner_typing_surfaces_in_view() {
        let server = MemoryServer::new();
        let (mut alice, mut bob) = pair(&server).await;

        alice.update_draft("h");
        pump_until(&mut bob, |s| s.view().partner.is_some_and(|p| p.typing)).await;

        // Alice's own flag never shows as the partner's.
        assert!(!alice.view().partner.unwrap().typing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_flag_clears_after_last_keystroke() {
        let server = MemoryServer::new();
        let (mut alice, _bob) = pair(&server).await;
        let me = alice.identity().unwrap().id.clone();

        alice.update_draft("h");
        alice.update_draft("he");
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(server.typing_flag(&me), Some(true));

        tokio::time::sleep(Duration::from_secs(8)).await;
        assert_eq!(server.typing_flag(&me), Some(false));
    }

    #[tokio::test]
    async fn test_sign_out_tears_down_feeds_and_view() {
        let server = MemoryServer::new();
        let (mut alice, _bob) = pair(&server).await;
        alice.update_draft("draft");
        assert_eq!(server.active_subscriptions(), 4);

        alice.sign_out().await.unwrap();
        assert_eq!(server.active_subscriptions(), 2);
        let view = alice.view();
        assert!(!view.signed_in);
        assert!(view.rows.is_empty());
        assert!(view.partner.is_none());
        assert_eq!(view.draft, "");

        // The identity stream reports the sign-out too; applying it again
        // is harmless.
        let event = alice.next_event().await;
        assert!(matches!(event, SessionEvent::Identity(None)));
        alice.apply(event).await;
        assert_eq!(server.active_subscriptions(), 2);
    }

    #[tokio::test]
    async fn test_dropping_session_unsubscribes() {
        let server = MemoryServer::new();
        let (alice, bob) = pair(&server).await;
        assert_eq!(server.active_subscriptions(), 4);
        drop(alice);
        assert_eq!(server.active_subscriptions(), 2);

        let mut bob = bob;
        bob.close();
        bob.close();
        assert_eq!(server.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_session_without_receipts_leaves_partner_messages_unread() {
        let server = MemoryServer::new();
        let alice = sign_in(&server, "+15550001", "Alice").await;
        let _bob = sign_in(&server, "+15550002", "Bob").await;
        server.insert_message(&NewMessage::text("bob", "Bob", "are you there?", None));

        let mut alice = ChatSession::without_read_receipts(alice);
        alice.settle().await.unwrap();
        alice.set_draft("yes");
        alice.send_message().await.unwrap();
        alice.flush_receipts().await;
        alice.close();
        tokio::task::yield_now().await;

        let stored = server.messages();
        assert_eq!(stored.len(), 2);
        assert!(!stored[0].read);
    }
}
