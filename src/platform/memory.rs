//! In-process platform.
//!
//! A `MemoryServer` plays the hosted backend: one directory, one message
//! log, one typing table and one blob bucket shared by every client created
//! from it. Each client gets its own auth session, so two clients of the
//! same server behave like two phones talking through the platform.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use futures::future::BoxFuture;
use tokio::sync::{mpsc, watch};

use super::{
    AuthProvider, BlobStore, ConfirmationHandle, DirectoryStore, MessageLog, Platform,
    Subscription, TypingStore,
};
use crate::models::{Identity, Message, MessagePatch, NewMessage, Profile, TypingFlag};

/// Code accepted for any phone number without an explicit test code.
pub const DEFAULT_TEST_CODE: &str = "123456";

/// Write paths that can be made to fail.
#[derive(Debug, Default, Clone, Copy)]
pub struct Failures {
    pub profile_writes: bool,
    pub message_writes: bool,
    pub read_receipts: bool,
    pub uploads: bool,
    pub typing_writes: bool,
}

#[derive(Default)]
struct State {
    accounts: HashMap<String, Identity>,
    pending: HashMap<String, String>,
    codes: HashMap<String, String>,
    profiles: Vec<Profile>,
    profile_creates: usize,
    messages: Vec<Message>,
    message_subs: Vec<(u64, mpsc::UnboundedSender<Vec<Message>>)>,
    typing: HashMap<String, bool>,
    typing_writes: Vec<TypingFlag>,
    typing_subs: Vec<(u64, String, mpsc::UnboundedSender<TypingFlag>)>,
    blobs: HashMap<String, Vec<u8>>,
    next_sub_id: u64,
    last_stamp: Option<DateTime<Utc>>,
    failures: Failures,
}

impl State {
    /// Server clock. Strictly increasing so every append has its own slot
    /// in the total order.
    fn stamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let stamp = match self.last_stamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_stamp = Some(stamp);
        stamp
    }

    fn sub_id(&mut self) -> u64 {
        self.next_sub_id += 1;
        self.next_sub_id
    }

    fn ordered_messages(&self) -> Vec<Message> {
        let mut snapshot = self.messages.clone();
        snapshot.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
        snapshot
    }

    fn publish_messages(&mut self) {
        let snapshot = self.ordered_messages();
        self.message_subs
            .retain(|(_, tx)| tx.send(snapshot.clone()).is_ok());
    }

    fn publish_typing(&mut self, owner_id: &str) {
        let flag = TypingFlag {
            owner_id: owner_id.to_string(),
            is_typing: self.typing.get(owner_id).copied().unwrap_or(false),
        };
        self.typing_subs.retain(|(_, owner, tx)| {
            if owner != owner_id {
                return true;
            }
            tx.send(flag.clone()).is_ok()
        });
    }
}

struct Shared {
    state: Mutex<State>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Shared backend state. Cheap to clone.
#[derive(Clone)]
pub struct MemoryServer {
    shared: Arc<Shared>,
}

impl Default for MemoryServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryServer {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// A fresh client of this server, signed out.
    pub fn platform(&self) -> Platform {
        let store = Arc::new(MemoryStore {
            shared: Arc::clone(&self.shared),
        });
        let (identity_tx, _) = watch::channel(None);
        let auth = Arc::new(MemoryAuth {
            shared: Arc::clone(&self.shared),
            identity_tx,
        });

        Platform {
            auth,
            directory: store.clone(),
            messages: store.clone(),
            typing: store.clone(),
            blobs: store,
        }
    }
}

/// Inspection and fault injection for tests.
#[cfg(test)]
impl MemoryServer {
    /// Register the code a phone number must present.
    pub fn set_code(&self, phone_number: &str, code: &str) {
        self.shared
            .lock()
            .codes
            .insert(phone_number.to_string(), code.to_string());
    }

    pub fn set_failures(&self, failures: Failures) {
        self.shared.lock().failures = failures;
    }

    pub fn profiles(&self) -> Vec<Profile> {
        self.shared.lock().profiles.clone()
    }

    /// Number of directory records actually written.
    pub fn profile_creates(&self) -> usize {
        self.shared.lock().profile_creates
    }

    pub fn messages(&self) -> Vec<Message> {
        self.shared.lock().ordered_messages()
    }

    pub fn typing_flag(&self, owner_id: &str) -> Option<bool> {
        self.shared.lock().typing.get(owner_id).copied()
    }

    /// Every typing write in arrival order.
    pub fn typing_writes(&self) -> Vec<TypingFlag> {
        self.shared.lock().typing_writes.clone()
    }

    pub fn blob(&self, path: &str) -> Option<Vec<u8>> {
        self.shared.lock().blobs.get(path).cloned()
    }

    /// Live message and typing feeds across all clients.
    pub fn active_subscriptions(&self) -> usize {
        let state = self.shared.lock();
        state.message_subs.len() + state.typing_subs.len()
    }

    /// Append straight into the log, bypassing any client.
    pub fn insert_message(&self, message: &NewMessage) -> String {
        let mut state = self.shared.lock();
        let id = append_locked(&mut state, message);
        state.publish_messages();
        id
    }
}

fn append_locked(state: &mut State, message: &NewMessage) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    let created_at = state.stamp();
    state.messages.push(Message {
        id: id.clone(),
        body: message.body.clone(),
        sender_id: message.sender_id.clone(),
        sender_label: message.sender_label.clone(),
        created_at,
        read: false,
        reply_to_text: message.reply_to_text.clone(),
    });
    id
}

/// Per-client auth session.
struct MemoryAuth {
    shared: Arc<Shared>,
    identity_tx: watch::Sender<Option<Identity>>,
}

impl AuthProvider for MemoryAuth {
    fn send_verification_code<'a>(
        &'a self,
        phone_number: &'a str,
        verifier_token: &'a str,
    ) -> BoxFuture<'a, Result<ConfirmationHandle>> {
        Box::pin(async move {
            if verifier_token.trim().is_empty() {
                bail!("proof-of-human challenge rejected");
            }
            let digits = phone_number.trim_start_matches('+');
            if !phone_number.starts_with('+')
                || digits.is_empty()
                || !digits.chars().all(|c| c.is_ascii_digit())
            {
                bail!("invalid phone number: {}", phone_number);
            }

            let session_info = uuid::Uuid::new_v4().to_string();
            self.shared
                .lock()
                .pending
                .insert(session_info.clone(), phone_number.to_string());
            tracing::debug!("Issued verification session for {}", phone_number);

            Ok(ConfirmationHandle {
                phone_number: phone_number.to_string(),
                session_info,
            })
        })
    }

    fn confirm<'a>(
        &'a self,
        handle: &'a ConfirmationHandle,
        code: &'a str,
    ) -> BoxFuture<'a, Result<Identity>> {
        Box::pin(async move {
            let identity = {
                let mut state = self.shared.lock();
                let phone = state
                    .pending
                    .get(&handle.session_info)
                    .cloned()
                    .context("unknown verification session")?;
                let expected = state
                    .codes
                    .get(&phone)
                    .map(String::as_str)
                    .unwrap_or(DEFAULT_TEST_CODE);
                if code.trim() != expected {
                    bail!("invalid verification code");
                }

                state
                    .accounts
                    .entry(phone.clone())
                    .or_insert_with(|| Identity {
                        id: format!("uid-{}", uuid::Uuid::new_v4().simple()),
                        phone_number: phone,
                        display_name: String::new(),
                    })
                    .clone()
            };

            self.identity_tx.send_replace(Some(identity.clone()));
            Ok(identity)
        })
    }

    fn sign_out(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.identity_tx.send_replace(None);
            Ok(())
        })
    }

    fn identity_changes(&self) -> watch::Receiver<Option<Identity>> {
        self.identity_tx.subscribe()
    }
}

/// Directory, message log, typing table and blob bucket.
struct MemoryStore {
    shared: Arc<Shared>,
}

impl DirectoryStore for MemoryStore {
    fn get<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<Profile>>> {
        Box::pin(async move {
            let state = self.shared.lock();
            Ok(state.profiles.iter().find(|p| p.id == id).cloned())
        })
    }

    fn create_if_absent<'a>(&'a self, profile: &'a Profile) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let mut state = self.shared.lock();
            if state.failures.profile_writes {
                bail!("directory write rejected");
            }
            if state.profiles.iter().any(|p| p.id == profile.id) {
                return Ok(false);
            }
            let mut record = profile.clone();
            record.created_at = Some(state.stamp());
            state.profiles.push(record);
            state.profile_creates += 1;
            Ok(true)
        })
    }

    fn list_all(&self) -> BoxFuture<'_, Result<Vec<Profile>>> {
        Box::pin(async move { Ok(self.shared.lock().profiles.clone()) })
    }
}

impl MessageLog for MemoryStore {
    fn append<'a>(&'a self, message: &'a NewMessage) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let mut state = self.shared.lock();
            if state.failures.message_writes {
                bail!("message log write rejected");
            }
            let id = append_locked(&mut state, message);
            state.publish_messages();
            Ok(id)
        })
    }

    fn subscribe_ordered(&self) -> Subscription<Vec<Message>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut state = self.shared.lock();
            let id = state.sub_id();
            // A closed receiver can't happen here; rx is still in scope.
            let _ = tx.send(state.ordered_messages());
            state.message_subs.push((id, tx));
            id
        };

        let shared = Arc::clone(&self.shared);
        Subscription::new(rx, move || {
            shared.lock().message_subs.retain(|(sub, _)| *sub != id);
        })
    }

    fn patch<'a>(&'a self, id: &'a str, patch: MessagePatch) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut state = self.shared.lock();
            if state.failures.read_receipts {
                bail!("message patch rejected");
            }
            let message = state
                .messages
                .iter_mut()
                .find(|m| m.id == id)
                .with_context(|| format!("no message {}", id))?;
            patch.apply(message);
            state.publish_messages();
            Ok(())
        })
    }
}

impl TypingStore for MemoryStore {
    fn upsert<'a>(&'a self, owner_id: &'a str, is_typing: bool) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut state = self.shared.lock();
            if state.failures.typing_writes {
                bail!("typing write rejected");
            }
            state.typing.insert(owner_id.to_string(), is_typing);
            state.typing_writes.push(TypingFlag {
                owner_id: owner_id.to_string(),
                is_typing,
            });
            state.publish_typing(owner_id);
            Ok(())
        })
    }

    fn watch(&self, owner_id: &str) -> Subscription<TypingFlag> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut state = self.shared.lock();
            let id = state.sub_id();
            let _ = tx.send(TypingFlag {
                owner_id: owner_id.to_string(),
                is_typing: state.typing.get(owner_id).copied().unwrap_or(false),
            });
            state.typing_subs.push((id, owner_id.to_string(), tx));
            id
        };

        let shared = Arc::clone(&self.shared);
        Subscription::new(rx, move || {
            shared.lock().typing_subs.retain(|(sub, _, _)| *sub != id);
        })
    }
}

impl BlobStore for MemoryStore {
    fn upload<'a>(
        &'a self,
        path: &'a str,
        bytes: Vec<u8>,
        _content_type: &'a str,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let mut state = self.shared.lock();
            if state.failures.uploads {
                bail!("blob upload rejected");
            }
            state.blobs.insert(path.to_string(), bytes);
            Ok(format!("memory://blobs/{}", path))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageBody;

    #[tokio::test]
    async fn test_confirm_reuses_account_for_same_phone() {
        let server = MemoryServer::new();
        let platform = server.platform();

        let first = platform
            .auth
            .send_verification_code("+15550001", "token")
            .await
            .unwrap();
        let a = platform.auth.confirm(&first, "123456").await.unwrap();

        let second = platform
            .auth
            .send_verification_code("+15550001", "token")
            .await
            .unwrap();
        let b = platform.auth.confirm(&second, "123456").await.unwrap();

        assert_eq!(a.id, b.id);
        assert_eq!(*platform.auth.identity_changes().borrow(), Some(b));
    }

    #[tokio::test]
    async fn test_send_code_rejects_bad_input() {
        let platform = MemoryServer::new().platform();
        assert!(platform
            .auth
            .send_verification_code("+15550001", "")
            .await
            .is_err());
        assert!(platform
            .auth
            .send_verification_code("5550001", "token")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_wrong_code_is_rejected() {
        let server = MemoryServer::new();
        server.set_code("+15550002", "999999");
        let platform = server.platform();
        let handle = platform
            .auth
            .send_verification_code("+15550002", "token")
            .await
            .unwrap();
        assert!(platform.auth.confirm(&handle, "123456").await.is_err());
        assert!(platform.auth.identity_changes().borrow().is_none());
        assert!(platform.auth.confirm(&handle, "999999").await.is_ok());
    }

    #[tokio::test]
    async fn test_subscription_gets_initial_and_ordered_snapshots() {
        let server = MemoryServer::new();
        let platform = server.platform();
        let mut sub = platform.messages.subscribe_ordered();
        assert_eq!(sub.next().await, Some(vec![]));

        platform
            .messages
            .append(&NewMessage::text("a", "A", "one", None))
            .await
            .unwrap();
        platform
            .messages
            .append(&NewMessage::text("b", "B", "two", None))
            .await
            .unwrap();

        let snapshot = sub.next_latest().await.unwrap();
        let texts: Vec<_> = snapshot.iter().filter_map(|m| m.text()).collect();
        assert_eq!(texts, vec!["one", "two"]);
        assert!(snapshot[0].created_at < snapshot[1].created_at);
        assert!(snapshot.iter().all(|m| !m.read));
    }

    #[tokio::test]
    async fn test_dropped_subscription_is_removed() {
        let server = MemoryServer::new();
        let platform = server.platform();
        let sub = platform.messages.subscribe_ordered();
        let typing = platform.typing.watch("a");
        assert_eq!(server.active_subscriptions(), 2);
        drop(sub);
        drop(typing);
        assert_eq!(server.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_create_if_absent_never_overwrites() {
        let server = MemoryServer::new();
        let platform = server.platform();
        let identity = Identity {
            id: "u1".to_string(),
            phone_number: "+1".to_string(),
            display_name: String::new(),
        };
        let first = Profile::first_login(&identity, "alice");
        let second = Profile::first_login(&identity, "mallory");

        assert!(platform.directory.create_if_absent(&first).await.unwrap());
        assert!(!platform.directory.create_if_absent(&second).await.unwrap());

        let stored = platform.directory.get("u1").await.unwrap().unwrap();
        assert_eq!(stored.display_name, "alice");
        assert!(stored.created_at.is_some());
        assert_eq!(server.profile_creates(), 1);
    }

    #[tokio::test]
    async fn test_typing_watch_sees_upserts() {
        let server = MemoryServer::new();
        let platform = server.platform();
        let mut watch = platform.typing.watch("b");
        assert!(!watch.next().await.unwrap().is_typing);

        platform.typing.upsert("b", true).await.unwrap();
        platform.typing.upsert("a", true).await.unwrap();
        let flag = watch.next().await.unwrap();
        assert_eq!(flag.owner_id, "b");
        assert!(flag.is_typing);
    }

    #[tokio::test]
    async fn test_upload_stores_bytes() {
        let server = MemoryServer::new();
        let platform = server.platform();
        let url = platform
            .blobs
            .upload("uploads/u1/x-cat.png", vec![1, 2, 3], "image/png")
            .await
            .unwrap();
        assert!(url.ends_with("uploads/u1/x-cat.png"));
        assert_eq!(server.blob("uploads/u1/x-cat.png"), Some(vec![1, 2, 3]));

        let id = server.insert_message(&NewMessage::image("u1", "A", &url));
        let stored = server.messages();
        assert_eq!(stored[0].id, id);
        assert_eq!(stored[0].body, MessageBody::Image { url });
    }
}
