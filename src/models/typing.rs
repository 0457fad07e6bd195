//! Typing presence model

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Quiet interval after which a typing flag is cleared.
pub const TYPING_QUIET_INTERVAL: Duration = Duration::from_secs(4);

/// Ephemeral per-user typing flag. One record per participant, overwritten
/// in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingFlag {
    pub owner_id: String,
    pub is_typing: bool,
}
