//! Stored platform session tokens

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Stored id token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub token: String,
    pub expires_at: Option<u64>,
}

impl StoredToken {
    pub fn new(token: String, expires_in_secs: Option<u64>) -> Self {
        let expires_at = expires_in_secs.map(|secs| now_secs() + secs);
        Self { token, expires_at }
    }

    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            // Consider expired if less than 5 minutes remaining
            Some(exp) => now_secs() + 300 >= exp,
            None => false,
        }
    }
}

/// Signed-in platform session, persisted between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    pub uid: String,
    pub phone_number: String,
    pub id_token: StoredToken,
    pub refresh_token: String,
}

/// Session store trait for different storage backends
pub trait SessionStore {
    fn get_session(&self) -> Option<StoredSession>;
    fn set_session(&mut self, session: StoredSession);
    fn clear_session(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_expiry_margin() {
        assert!(StoredToken::new("t".into(), Some(60)).is_expired());
        assert!(!StoredToken::new("t".into(), Some(3600)).is_expired());
        assert!(!StoredToken::new("t".into(), None).is_expired());
    }
}
