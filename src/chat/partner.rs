//! Who the signed-in user is talking to.
//!
//! There is no conversation record on the platform. The partner is found
//! by scanning the whole directory and taking the first profile that isn't
//! the caller's. That only makes sense while the directory holds two
//! people; with more, whoever lists first wins. Kept as a placeholder
//! behind `Conversation` until conversations are stored explicitly.

use anyhow::{Context, Result};

use crate::models::{Identity, Profile};
use crate::platform::DirectoryStore;

/// The signed-in participant and, once discovered, the other one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub me: Profile,
    pub partner: Option<Profile>,
}

impl Conversation {
    /// Stable key for the pair, independent of who is asking.
    pub fn id(&self) -> Option<String> {
        self.partner
            .as_ref()
            .map(|p| conversation_id(&self.me.id, &p.id))
    }
}

pub fn conversation_id(a: &str, b: &str) -> String {
    if a <= b {
        format!("{}_{}", a, b)
    } else {
        format!("{}_{}", b, a)
    }
}

/// First profile in `profiles` that isn't `me`.
pub fn pick_partner(profiles: Vec<Profile>, me: &str) -> Option<Profile> {
    profiles.into_iter().find(|p| p.id != me)
}

/// Load the caller's profile and scan for the partner. A caller without a
/// profile still gets one built from the identity, so sends carry at least
/// the phone number as sender label.
pub async fn discover(directory: &dyn DirectoryStore, identity: &Identity) -> Result<Conversation> {
    let me = directory
        .get(&identity.id)
        .await
        .context("Failed to load own profile")?
        .unwrap_or_else(|| {
            tracing::warn!("No profile for {}; using identity", identity.id);
            Profile {
                id: identity.id.clone(),
                display_name: identity.display_name.clone(),
                phone_number: identity.phone_number.clone(),
                created_at: None,
            }
        });

    let profiles = directory
        .list_all()
        .await
        .context("Failed to list directory")?;
    let partner = pick_partner(profiles, &identity.id);

    Ok(Conversation { me, partner })
}
