//! Live feed handle with idempotent teardown.

use tokio::sync::mpsc;

type Unsubscribe = Box<dyn FnOnce() + Send>;

/// Receiving end of a live feed.
///
/// Dropping the handle unsubscribes. `unsubscribe` may be called any number
/// of times; the provider's teardown runs once.
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<T>,
    unsubscribe: Option<Unsubscribe>,
}

impl<T> Subscription<T> {
    pub fn new(
        rx: mpsc::UnboundedReceiver<T>,
        unsubscribe: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            rx,
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Next emission. Returns `None` once unsubscribed or when the provider
    /// has gone away.
    pub async fn next(&mut self) -> Option<T> {
        if self.unsubscribe.is_none() {
            return None;
        }
        self.rx.recv().await
    }

    /// Next emission, skipping over any that are already queued behind it.
    /// For feeds that deliver whole snapshots only the newest one matters.
    pub async fn next_latest(&mut self) -> Option<T> {
        let mut latest = self.next().await?;
        while let Ok(newer) = self.rx.try_recv() {
            latest = newer;
        }
        Some(latest)
    }

    #[cfg(test)]
    pub fn is_active(&self) -> bool {
        self.unsubscribe.is_some()
    }

    pub fn unsubscribe(&mut self) {
        if let Some(teardown) = self.unsubscribe.take() {
            teardown();
            self.rx.close();
        }
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
