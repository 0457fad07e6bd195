//! Data models for chat entities

mod identity;
mod message;
mod typing;

pub use identity::*;
pub use message::*;
pub use typing::*;
