//! Hosted platform over its REST endpoints.
//!
//! Identity toolkit for phone sign-in, the document database for the
//! directory, message log and typing flags, and the storage bucket for
//! image uploads. Realtime listeners are emulated by polling at the
//! configured interval and emitting only when the result changes.

mod auth;
mod document;
mod firestore;
mod storage;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::{self, MissedTickBehavior};

use super::{Platform, Subscription};
use crate::auth::{SessionStore, StoredSession};
use crate::config::{Config, FirebaseConfig};
use crate::models::Identity;

pub(crate) struct Inner {
    http: reqwest::Client,
    config: FirebaseConfig,
    poll_interval: Duration,
    session: Mutex<Option<StoredSession>>,
    identity_tx: watch::Sender<Option<Identity>>,
}

/// Client of one hosted project. Cheap to clone.
#[derive(Clone)]
pub struct Firebase {
    inner: Arc<Inner>,
}

/// Build a platform from the stored configuration. A stored session makes
/// the client start out signed in.
pub fn connect(config: &Config) -> Result<Platform> {
    if !config.firebase.is_complete() {
        bail!(
            "Platform connection parameters missing. Fill in [firebase] in {}",
            Config::config_path()?.display()
        );
    }

    let session = config.get_session();
    let identity = session.as_ref().map(identity_of);
    let (identity_tx, _) = watch::channel(identity);

    let firebase = Firebase {
        inner: Arc::new(Inner {
            http: reqwest::Client::new(),
            config: config.firebase.clone(),
            poll_interval: config.poll_interval(),
            session: Mutex::new(session),
            identity_tx,
        }),
    };

    Ok(Platform {
        auth: Arc::new(firebase.clone()),
        directory: Arc::new(firebase.clone()),
        messages: Arc::new(firebase.clone()),
        typing: Arc::new(firebase.clone()),
        blobs: Arc::new(firebase),
    })
}

fn identity_of(session: &StoredSession) -> Identity {
    Identity {
        id: session.uid.clone(),
        phone_number: session.phone_number.clone(),
        display_name: String::new(),
    }
}

impl Inner {
    /// Current id token, refreshed first if it is about to expire.
    async fn id_token(&self) -> Result<String> {
        let mut guard = self.session.lock().await;
        let session = guard
            .as_ref()
            .context("Not signed in. Run 'duochat login' first.")?;

        if !session.id_token.is_expired() {
            return Ok(session.id_token.token.clone());
        }

        tracing::info!("Id token expired, refreshing...");
        let refreshed = self.refresh_session(session).await?;
        let token = refreshed.id_token.token.clone();
        persist_session(Some(&refreshed));
        *guard = Some(refreshed);
        Ok(token)
    }

    async fn set_session(&self, session: Option<StoredSession>) {
        persist_session(session.as_ref());
        let identity = session.as_ref().map(identity_of);
        *self.session.lock().await = session;
        self.identity_tx.send_replace(identity);
    }
}

/// Write the session into the config file. Failures only cost the next
/// run its cached sign-in, so they are logged and dropped.
fn persist_session(session: Option<&StoredSession>) {
    let result = Config::load().and_then(|mut config| {
        match session {
            Some(s) => config.set_session(s.clone()),
            None => config.clear_session(),
        }
        config.save()
    });
    if let Err(e) = result {
        tracing::warn!("Failed to persist session: {:#}", e);
    }
}

impl Firebase {
    /// Emulated realtime listener: re-run `fetch` every poll interval and
    /// forward the result whenever it differs from the last one sent.
    fn poll<T, F, Fut>(&self, what: &'static str, fetch: F) -> Subscription<T>
    where
        T: PartialEq + Clone + Send + 'static,
        F: Fn(Arc<Inner>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = Arc::clone(&self.inner);
        let interval = inner.poll_interval;

        let task = tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last: Option<T> = None;

            loop {
                ticker.tick().await;
                match fetch(Arc::clone(&inner)).await {
                    Ok(value) => {
                        if last.as_ref() == Some(&value) {
                            continue;
                        }
                        if tx.send(value.clone()).is_err() {
                            break;
                        }
                        last = Some(value);
                    }
                    Err(e) => tracing::warn!("{} listener poll failed: {:#}", what, e),
                }
            }
        });

        Subscription::new(rx, move || task.abort())
    }
}

/// Check HTTP response status code and return a clear error on failure.
async fn check_response(resp: reqwest::Response, url: &str) -> Result<reqwest::Response> {
    let status = resp.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        bail!(
            "401 Unauthorized for {}. Session may be invalid -- run 'duochat login'.",
            url
        );
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        bail!("HTTP {} for {}: {}", status.as_u16(), url, body);
    }
    Ok(resp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn offline_client(poll_interval: Duration) -> Firebase {
        let (identity_tx, _) = watch::channel(None);
        Firebase {
            inner: Arc::new(Inner {
                http: reqwest::Client::new(),
                config: FirebaseConfig {
                    api_key: "key".into(),
                    project_id: "demo".into(),
                    storage_bucket: "demo.appspot.com".into(),
                    auth_domain: String::new(),
                },
                poll_interval,
                session: Mutex::new(None),
                identity_tx,
            }),
        }
    }

    /// Listener whose `n`th fetch returns `script(n)`. Also returns the
    /// fetch counter.
    fn scripted<T>(
        client: &Firebase,
        script: fn(usize) -> Result<T>,
    ) -> (Subscription<T>, Arc<AtomicUsize>)
    where
        T: PartialEq + Clone + Send + 'static,
    {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let sub = client.poll("test", move |_inner| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move { script(n) }
        });
        (sub, calls)
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_emits_only_changes() {
        let client = offline_client(Duration::from_millis(100));
        let (mut sub, calls) = scripted(&client, |n| {
            Ok(match n {
                0 | 1 => 1u32,
                2..=4 => 2,
                _ => 3,
            })
        });

        assert_eq!(sub.next().await, Some(1));
        assert_eq!(sub.next().await, Some(2));
        assert_eq!(sub.next().await, Some(3));
        let settled_at = calls.load(Ordering::SeqCst);
        assert!(settled_at >= 6);

        let quiet = time::timeout(Duration::from_secs(1), sub.next()).await;
        assert!(quiet.is_err());
        assert!(calls.load(Ordering::SeqCst) > settled_at);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_survives_fetch_errors() {
        let client = offline_client(Duration::from_millis(100));
        let (mut sub, calls) = scripted(&client, |n| match n {
            0 | 1 => bail!("503 from backend"),
            _ => Ok("snapshot".to_string()),
        });

        assert_eq!(sub.next().await.as_deref(), Some("snapshot"));
        assert!(calls.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsubscribe_stops_polling() {
        let client = offline_client(Duration::from_millis(100));
        let (mut sub, calls) = scripted(&client, Ok::<usize, anyhow::Error>);

        assert_eq!(sub.next().await, Some(0));
        sub.unsubscribe();
        let stopped_at = calls.load(Ordering::SeqCst);

        time::sleep(Duration::from_secs(2)).await;
        assert_eq!(calls.load(Ordering::SeqCst), stopped_at);
        assert_eq!(sub.next().await, None);
    }
}
