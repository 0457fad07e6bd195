//! Chat session: live feeds, composer, receipts and typing presence.

pub mod commands;
pub mod composer;
pub mod partner;
pub mod receipts;
pub mod session;
pub mod typing;
pub mod view;

pub use commands::{read_messages, run_demo, send_message, upload_image};
pub use composer::EMOJI_PALETTE;
pub use session::{ChatSession, SessionEvent};
pub use view::{ChatView, MessageRow, RowContent};
