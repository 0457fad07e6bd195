//! Read receipts.
//!
//! Each snapshot marks every message from someone else that is still unread.
//! The writes go out as one concurrent batch, fire-and-forget: failures are
//! logged and the id is released so the next snapshot asks again.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::join_all;
use tokio::task::JoinHandle;

use crate::error::{reason, ChatError};
use crate::models::{Message, MessagePatch};
use crate::platform::MessageLog;

pub struct ReadReceipts {
    log: Arc<dyn MessageLog>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

fn lock(set: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    set.lock().unwrap_or_else(|e| e.into_inner())
}

/// Messages not written by `me` and not yet read.
pub fn unread_from_others<'a>(
    messages: &'a [Message],
    me: &'a str,
) -> impl Iterator<Item = &'a Message> + 'a {
    messages.iter().filter(move |m| !m.is_from(me) && !m.read)
}

impl ReadReceipts {
    pub fn new(log: Arc<dyn MessageLog>) -> Self {
        Self {
            log,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Issue receipts for `snapshot` as seen by `me`. Returns the batch task
    /// when anything was sent.
    pub fn mark_seen(&self, snapshot: &[Message], me: &str) -> Option<JoinHandle<()>> {
        let ids: Vec<String> = {
            let mut in_flight = lock(&self.in_flight);
            in_flight.retain(|id| snapshot.iter().any(|m| &m.id == id && !m.read));
            unread_from_others(snapshot, me)
                .filter(|m| in_flight.insert(m.id.clone()))
                .map(|m| m.id.clone())
                .collect()
        };
        if ids.is_empty() {
            return None;
        }

        tracing::debug!("Marking {} message(s) read", ids.len());
        let log = Arc::clone(&self.log);
        let in_flight = Arc::clone(&self.in_flight);

        Some(tokio::spawn(async move {
            let writes = ids.iter().map(|id| log.patch(id, MessagePatch::MarkRead));
            let results = join_all(writes).await;

            for (id, result) in ids.iter().zip(results) {
                if let Err(e) = result {
                    let err = ChatError::ReadReceiptWriteFailed {
                        id: id.clone(),
                        reason: reason(&e),
                    };
                    tracing::warn!("{}", err);
                    lock(&in_flight).remove(id);
                }
            }
        }))
    }

    #[cfg(test)]
    pub fn in_flight(&self) -> usize {
        lock(&self.in_flight).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewMessage;
    use crate::platform::memory::{Failures, MemoryServer};

    #[tokio::test]
    async fn test_marks_only_other_senders() {
        let server = MemoryServer::new();
        server.insert_message(&NewMessage::text("me", "Me", "mine", None));
        server.insert_message(&NewMessage::text("them", "Them", "theirs", None));
        let receipts = ReadReceipts::new(server.platform().messages);

        let task = receipts.mark_seen(&server.messages(), "me").unwrap();
        task.await.unwrap();

        let stored = server.messages();
        assert!(!stored[0].read);
        assert!(stored[1].read);
    }

    #[tokio::test]
    async fn test_in_flight_ids_are_not_reissued() {
        let server = MemoryServer::new();
        server.insert_message(&NewMessage::text("them", "Them", "a", None));
        let receipts = ReadReceipts::new(server.platform().messages);
        let snapshot = server.messages();

        let first = receipts.mark_seen(&snapshot, "me");
        assert!(first.is_some());
        assert!(receipts.mark_seen(&snapshot, "me").is_none());
        first.unwrap().await.unwrap();

        // Once the log reports it read, nothing is pending.
        assert!(receipts.mark_seen(&server.messages(), "me").is_none());
        assert_eq!(receipts.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_failed_receipt_is_retried_on_next_snapshot() {
        let server = MemoryServer::new();
        server.insert_message(&NewMessage::text("them", "Them", "a", None));
        server.set_failures(Failures {
            read_receipts: true,
            ..Failures::default()
        });
        let receipts = ReadReceipts::new(server.platform().messages);

        receipts
            .mark_seen(&server.messages(), "me")
            .unwrap()
            .await
            .unwrap();
        assert!(!server.messages()[0].read);
        assert_eq!(receipts.in_flight(), 0);

        server.set_failures(Failures::default());
        receipts
            .mark_seen(&server.messages(), "me")
            .unwrap()
            .await
            .unwrap();
        assert!(server.messages()[0].read);
    }
}
