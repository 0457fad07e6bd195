//! Capabilities consumed from the hosted platform.
//!
//! Authentication, the profile directory, the message log, typing presence
//! and blob storage are all owned by the platform. The controllers only see
//! the traits below; `memory` implements them in-process and `firebase`
//! talks to the hosted REST endpoints.

pub mod firebase;
pub mod memory;
mod subscription;

use std::sync::Arc;

use anyhow::Result;
use futures::future::BoxFuture;
use tokio::sync::watch;

use crate::models::{Identity, Message, MessagePatch, NewMessage, Profile, TypingFlag};

pub use subscription::Subscription;

/// Opaque handle returned once a verification code has been sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationHandle {
    pub phone_number: String,
    /// Provider session reference the code is checked against.
    pub session_info: String,
}

pub trait AuthProvider: Send + Sync {
    /// Send a verification code to `phone_number`, proving humanity with
    /// `verifier_token`.
    fn send_verification_code<'a>(
        &'a self,
        phone_number: &'a str,
        verifier_token: &'a str,
    ) -> BoxFuture<'a, Result<ConfirmationHandle>>;

    /// Exchange the code for a verified identity.
    fn confirm<'a>(
        &'a self,
        handle: &'a ConfirmationHandle,
        code: &'a str,
    ) -> BoxFuture<'a, Result<Identity>>;

    fn sign_out(&self) -> BoxFuture<'_, Result<()>>;

    /// Identity stream. The current value is the signed-in identity, if any.
    fn identity_changes(&self) -> watch::Receiver<Option<Identity>>;
}

pub trait DirectoryStore: Send + Sync {
    fn get<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<Option<Profile>>>;

    /// Write `profile` unless a record with its id exists. Returns whether
    /// a record was created. Never overwrites.
    fn create_if_absent<'a>(&'a self, profile: &'a Profile) -> BoxFuture<'a, Result<bool>>;

    /// Every profile in the directory, in no guaranteed order.
    fn list_all(&self) -> BoxFuture<'_, Result<Vec<Profile>>>;
}

pub trait MessageLog: Send + Sync {
    /// Append a message; the log assigns id and timestamp. Returns the id.
    fn append<'a>(&'a self, message: &'a NewMessage) -> BoxFuture<'a, Result<String>>;

    /// Live snapshots of the whole log ordered by `created_at` ascending.
    /// The first snapshot is delivered right after subscribing.
    fn subscribe_ordered(&self) -> Subscription<Vec<Message>>;

    fn patch<'a>(&'a self, id: &'a str, patch: MessagePatch) -> BoxFuture<'a, Result<()>>;
}

pub trait TypingStore: Send + Sync {
    /// Create or overwrite the owner's flag.
    fn upsert<'a>(&'a self, owner_id: &'a str, is_typing: bool) -> BoxFuture<'a, Result<()>>;

    /// Live view of one participant's flag.
    fn watch(&self, owner_id: &str) -> Subscription<TypingFlag>;
}

pub trait BlobStore: Send + Sync {
    /// Store `bytes` at `path` and return a retrievable URL.
    fn upload<'a>(
        &'a self,
        path: &'a str,
        bytes: Vec<u8>,
        content_type: &'a str,
    ) -> BoxFuture<'a, Result<String>>;
}

/// The full set of capabilities one client holds.
#[derive(Clone)]
pub struct Platform {
    pub auth: Arc<dyn AuthProvider>,
    pub directory: Arc<dyn DirectoryStore>,
    pub messages: Arc<dyn MessageLog>,
    pub typing: Arc<dyn TypingStore>,
    pub blobs: Arc<dyn BlobStore>,
}
