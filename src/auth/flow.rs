//! Verification-code sign-in state machine.
//!
//! `Unauthenticated -> CodeRequested -> Verified`, with `cancel` going back
//! from `CodeRequested` and `sign_out` going back from anywhere.

use std::sync::Arc;

use crate::error::{reason, ChatError};
use crate::models::{Identity, Profile};
use crate::platform::{AuthProvider, ConfirmationHandle, DirectoryStore, Platform};

use super::verifier::HumanVerifier;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    CodeRequested(ConfirmationHandle),
    Verified(Identity),
}

/// Result of a successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignIn {
    pub identity: Identity,
    /// A directory profile was created by this sign-in.
    pub first_login: bool,
}

pub struct AuthFlow {
    auth: Arc<dyn AuthProvider>,
    directory: Arc<dyn DirectoryStore>,
    verifier: Arc<dyn HumanVerifier>,
    state: AuthState,
}

impl AuthFlow {
    pub fn new(platform: &Platform, verifier: Arc<dyn HumanVerifier>) -> Self {
        Self {
            auth: Arc::clone(&platform.auth),
            directory: Arc::clone(&platform.directory),
            verifier,
            state: AuthState::Unauthenticated,
        }
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }

    /// Ask the provider to text a code to `phone_number`. The provider owns
    /// format validation; only blank input is rejected here. Never retries.
    pub async fn request_code(&mut self, phone_number: &str) -> Result<(), ChatError> {
        let phone_number = phone_number.trim();
        if phone_number.is_empty() {
            return Err(ChatError::BlankPhoneNumber);
        }

        let token = self.verifier.verify().await.map_err(|e| {
            tracing::error!("Proof-of-human challenge failed: {:#}", e);
            ChatError::CodeSendFailed(reason(&e))
        })?;

        let handle = self
            .auth
            .send_verification_code(phone_number, &token)
            .await
            .map_err(|e| {
                tracing::error!("Error sending code to {}: {:#}", phone_number, e);
                ChatError::CodeSendFailed(reason(&e))
            })?;

        tracing::info!("Verification code sent to {}", phone_number);
        self.state = AuthState::CodeRequested(handle);
        Ok(())
    }

    /// Check `code` and, on success, make sure the user has a directory
    /// profile. A rejected code leaves the flow in `CodeRequested` so the
    /// user can try again.
    pub async fn verify_code(
        &mut self,
        code: &str,
        display_name: &str,
    ) -> Result<SignIn, ChatError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(ChatError::BlankCode);
        }
        let AuthState::CodeRequested(handle) = &self.state else {
            return Err(ChatError::NoPendingCode);
        };

        let identity = self.auth.confirm(handle, code).await.map_err(|e| {
            tracing::warn!("Invalid verification code: {:#}", e);
            ChatError::CodeInvalid
        })?;

        let first_login = match provision_profile(&*self.directory, &identity, display_name).await
        {
            Ok(created) => created,
            Err(e) => {
                tracing::error!("{}", e);
                false
            }
        };

        self.state = AuthState::Verified(identity.clone());
        Ok(SignIn {
            identity,
            first_login,
        })
    }

    /// Back out of code entry, e.g. to fix the phone number.
    pub fn cancel(&mut self) {
        if matches!(self.state, AuthState::CodeRequested(_)) {
            self.state = AuthState::Unauthenticated;
        }
    }

    pub async fn sign_out(&mut self) -> anyhow::Result<()> {
        self.auth.sign_out().await?;
        self.state = AuthState::Unauthenticated;
        Ok(())
    }
}

/// Create the directory profile unless one exists. Returns whether it was
/// created. The write is create-if-absent, so a concurrent duplicate
/// verification can't overwrite a profile the first one wrote.
pub async fn provision_profile(
    directory: &dyn DirectoryStore,
    identity: &Identity,
    display_name: &str,
) -> Result<bool, ChatError> {
    let existing = directory
        .get(&identity.id)
        .await
        .map_err(|e| ChatError::ProfileWriteFailed(reason(&e)))?;
    if existing.is_some() {
        tracing::info!("Welcome back, {}", identity.phone_number);
        return Ok(false);
    }

    let profile = Profile::first_login(identity, display_name);
    let created = directory
        .create_if_absent(&profile)
        .await
        .map_err(|e| ChatError::ProfileWriteFailed(reason(&e)))?;
    if created {
        tracing::info!("New user created: {}", profile.display_name);
    }
    Ok(created)
}
