//! Error taxonomy for the sign-in flow and the chat session.
//!
//! Only the auth-flow variants are meant for the user as-is. Chat-side
//! write failures are logged where they happen and reported through the
//! session's notice line.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Please enter your phone number")]
    BlankPhoneNumber,

    #[error("Please enter the verification code")]
    BlankCode,

    #[error("No verification code has been requested")]
    NoPendingCode,

    #[error("Failed to send verification code: {0}")]
    CodeSendFailed(String),

    #[error("Invalid code. Please try again.")]
    CodeInvalid,

    #[error("Failed to write profile: {0}")]
    ProfileWriteFailed(String),

    #[error("Failed to send message: {0}")]
    MessageWriteFailed(String),

    #[error("Failed to mark message {id} as read: {reason}")]
    ReadReceiptWriteFailed { id: String, reason: String },

    #[error("Failed to upload file: {0}")]
    UploadFailed(String),

    #[error("Not signed in. Run 'duochat login' first.")]
    NotSignedIn,
}

impl ChatError {
    /// Whether the error belongs on screen verbatim (the auth page errors).
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            ChatError::BlankPhoneNumber
                | ChatError::BlankCode
                | ChatError::NoPendingCode
                | ChatError::CodeSendFailed(_)
                | ChatError::CodeInvalid
                | ChatError::NotSignedIn
        )
    }
}

/// Render an adapter error with its context chain on one line.
pub(crate) fn reason(err: &anyhow::Error) -> String {
    format!("{:#}", err)
}
