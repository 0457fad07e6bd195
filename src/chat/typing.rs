//! Typing presence writer.
//!
//! Every keystroke writes `isTyping = true` and re-arms a one-shot timer
//! that writes `false` after the quiet interval. Both writes run on a
//! spawned task; a keystroke never waits on the store. A periodic sweep also
//! writes `false` every quiet interval whatever the keystrokes do, so a
//! lost timer write can't leave the flag stuck. The two may race; both
//! only ever clear, and clearing is idempotent.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::models::TYPING_QUIET_INTERVAL;
use crate::platform::TypingStore;

pub struct TypingPulse {
    store: Arc<dyn TypingStore>,
    owner_id: String,
    quiet: Duration,
    pending_clear: Option<JoinHandle<()>>,
    sweep: Option<JoinHandle<()>>,
}

impl TypingPulse {
    /// Writer without the periodic sweep.
    pub fn new(store: Arc<dyn TypingStore>, owner_id: &str) -> Self {
        Self {
            store,
            owner_id: owner_id.to_string(),
            quiet: TYPING_QUIET_INTERVAL,
            pending_clear: None,
            sweep: None,
        }
    }

    /// Writer with the periodic sweep running.
    pub fn start(store: Arc<dyn TypingStore>, owner_id: &str) -> Self {
        let mut pulse = Self::new(store, owner_id);
        pulse.start_sweep();
        pulse
    }

    pub fn start_sweep(&mut self) {
        if self.sweep.is_some() {
            return;
        }
        let store = Arc::clone(&self.store);
        let owner_id = self.owner_id.clone();
        let quiet = self.quiet;

        self.sweep = Some(tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + quiet, quiet);
            loop {
                ticker.tick().await;
                if let Err(e) = store.upsert(&owner_id, false).await {
                    tracing::debug!("Typing sweep write failed: {:#}", e);
                }
            }
        }));
    }

    /// Mark the owner as typing and push the auto-clear out by one quiet
    /// interval.
    pub fn keystroke(&mut self) {
        if let Some(pending) = self.pending_clear.take() {
            pending.abort();
        }

        let store = Arc::clone(&self.store);
        let owner_id = self.owner_id.clone();
        let clear_at = Instant::now() + self.quiet;
        self.pending_clear = Some(tokio::spawn(async move {
            if let Err(e) = store.upsert(&owner_id, true).await {
                tracing::warn!("Failed to set typing flag: {:#}", e);
            }
            time::sleep_until(clear_at).await;
            if let Err(e) = store.upsert(&owner_id, false).await {
                tracing::debug!("Typing auto-clear write failed: {:#}", e);
            }
        }));
    }

    /// Cancel the timer and the sweep. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if let Some(pending) = self.pending_clear.take() {
            pending.abort();
        }
        if let Some(sweep) = self.sweep.take() {
            sweep.abort();
        }
    }
}

impl Drop for TypingPulse {
    fn drop(&mut self) {
        self.stop();
    }
}
