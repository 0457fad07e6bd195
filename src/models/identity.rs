//! Identity and directory profile models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Display name used when the user did not supply one at sign-in.
pub const ANONYMOUS_NAME: &str = "Anonymous";

/// Verified principal produced by phone-number authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,
    pub phone_number: String,
    #[serde(default)]
    pub display_name: String,
}

/// Durable directory record describing a participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub display_name: String,
    pub phone_number: String,
    /// Server-assigned; `None` until the directory has stamped it.
    pub created_at: Option<DateTime<Utc>>,
}

impl Profile {
    /// Profile for a first-time sign-in. A blank name falls back to
    /// [`ANONYMOUS_NAME`].
    pub fn first_login(identity: &Identity, name: &str) -> Self {
        let name = name.trim();
        let display_name = if !name.is_empty() {
            name.to_string()
        } else if !identity.display_name.trim().is_empty() {
            identity.display_name.trim().to_string()
        } else {
            ANONYMOUS_NAME.to_string()
        };

        Self {
            id: identity.id.clone(),
            display_name,
            phone_number: identity.phone_number.clone(),
            created_at: None,
        }
    }

    /// Label stamped on outgoing messages: the name, or the phone number
    /// when the name is empty.
    pub fn sender_label(&self) -> &str {
        if self.display_name.is_empty() {
            &self.phone_number
        } else {
            &self.display_name
        }
    }

    /// Avatar initial shown in the partner header.
    pub fn initial(&self) -> char {
        self.display_name
            .chars()
            .next()
            .and_then(|c| c.to_uppercase().next())
            .unwrap_or('P')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> Identity {
        Identity {
            id: "u1".to_string(),
            phone_number: "+15550001".to_string(),
            display_name: String::new(),
        }
    }

    #[test]
    fn test_first_login_defaults_to_anonymous() {
        let profile = Profile::first_login(&identity(), "   ");
        assert_eq!(profile.display_name, ANONYMOUS_NAME);
        assert_eq!(profile.phone_number, "+15550001");
        assert!(profile.created_at.is_none());
    }

    #[test]
    fn test_first_login_uses_supplied_name() {
        let profile = Profile::first_login(&identity(), " alice ");
        assert_eq!(profile.display_name, "alice");
        assert_eq!(profile.initial(), 'A');
    }

    #[test]
    fn test_sender_label_falls_back_to_phone() {
        let mut profile = Profile::first_login(&identity(), "bob");
        profile.display_name.clear();
        assert_eq!(profile.sender_label(), "+15550001");
        assert_eq!(profile.initial(), 'P');
    }
}
