//! Phone-number sign-in
//!
//! Drives the verification-code state machine against the platform's auth
//! provider and provisions the user's directory profile on first login.

pub mod flow;
pub mod login;
pub mod tokens;
pub mod verifier;

pub use flow::AuthFlow;
pub use login::{login, logout, status};
pub use tokens::{SessionStore, StoredSession, StoredToken};
pub use verifier::StaticChallenge;
