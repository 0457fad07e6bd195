//! Proof-of-human challenge.
//!
//! The provider refuses to send a code without a challenge token. The
//! widget producing those tokens is set up at most once per process and
//! handed to the auth flow explicitly.

use std::sync::{Arc, OnceLock};

use anyhow::{bail, Result};
use futures::future::BoxFuture;

/// Produces a challenge token on demand.
pub trait HumanVerifier: Send + Sync {
    fn verify(&self) -> BoxFuture<'_, Result<String>>;
}

/// Verifier backed by a token obtained out of band (flag, environment or
/// config file).
pub struct StaticChallenge {
    token: Option<String>,
}

impl StaticChallenge {
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }
}

impl HumanVerifier for StaticChallenge {
    fn verify(&self) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            match &self.token {
                Some(token) => Ok(token.clone()),
                None => bail!(
                    "no proof-of-human token; pass --challenge-token or set {}",
                    crate::config::CHALLENGE_TOKEN_ENV
                ),
            }
        })
    }
}

/// Lazily initialized verifier slot.
pub struct VerifierHandle {
    cell: OnceLock<Arc<dyn HumanVerifier>>,
}

impl VerifierHandle {
    pub const fn new() -> Self {
        Self {
            cell: OnceLock::new(),
        }
    }

    /// Return the verifier, running `init` only if none exists yet.
    pub fn get_or_init(
        &self,
        init: impl FnOnce() -> Arc<dyn HumanVerifier>,
    ) -> Arc<dyn HumanVerifier> {
        let verifier = self.cell.get_or_init(|| {
            tracing::debug!("Initializing proof-of-human verifier");
            init()
        });
        Arc::clone(verifier)
    }

    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl Default for VerifierHandle {
    fn default() -> Self {
        Self::new()
    }
}

static PROCESS_VERIFIER: VerifierHandle = VerifierHandle::new();

/// The process-wide verifier slot.
pub fn process_verifier() -> &'static VerifierHandle {
    &PROCESS_VERIFIER
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_runs_once() {
        let handle = VerifierHandle::new();
        let mut inits = 0;

        handle.get_or_init(|| {
            inits += 1;
            Arc::new(StaticChallenge::new(Some("a".into())))
        });
        handle.get_or_init(|| {
            inits += 1;
            Arc::new(StaticChallenge::new(Some("b".into())))
        });

        assert_eq!(inits, 1);
        assert!(handle.is_initialized());
    }

    #[tokio::test]
    async fn test_second_init_keeps_first_verifier() {
        let handle = VerifierHandle::new();
        handle.get_or_init(|| Arc::new(StaticChallenge::new(Some("first".into()))));
        let v = handle.get_or_init(|| Arc::new(StaticChallenge::new(Some("second".into()))));
        assert_eq!(v.verify().await.unwrap(), "first");
    }

    #[tokio::test]
    async fn test_missing_token_fails() {
        assert!(StaticChallenge::new(None).verify().await.is_err());
    }
}
