//! Phone-number sign-in against the identity toolkit.

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use serde::Deserialize;
use tokio::sync::watch;

use super::{check_response, Firebase, Inner};
use crate::auth::{StoredSession, StoredToken};
use crate::models::Identity;
use crate::platform::{AuthProvider, ConfirmationHandle};

const IDENTITY_TOOLKIT: &str = "https://identitytoolkit.googleapis.com/v1";
const SECURE_TOKEN: &str = "https://securetoken.googleapis.com/v1/token";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendCodeResponse {
    session_info: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    id_token: String,
    refresh_token: String,
    expires_in: Option<String>,
    local_id: String,
    phone_number: Option<String>,
}

/// The secure token endpoint answers in snake_case.
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    expires_in: Option<String>,
}

fn parse_expiry(expires_in: Option<&str>) -> Option<u64> {
    expires_in.and_then(|s| s.parse().ok())
}

impl Inner {
    fn toolkit_url(&self, method: &str) -> String {
        format!(
            "{}/accounts:{}?key={}",
            IDENTITY_TOOLKIT, method, self.config.api_key
        )
    }

    pub(super) async fn refresh_session(&self, session: &StoredSession) -> Result<StoredSession> {
        let url = format!("{}?key={}", SECURE_TOKEN, self.config.api_key);
        let resp = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", session.refresh_token.as_str()),
            ])
            .send()
            .await
            .context("Failed to call secure token endpoint")?;
        let resp = check_response(resp, SECURE_TOKEN).await?;
        let body: RefreshResponse = resp
            .json()
            .await
            .context("Failed to parse token refresh response")?;

        Ok(StoredSession {
            uid: session.uid.clone(),
            phone_number: session.phone_number.clone(),
            id_token: StoredToken::new(body.id_token, parse_expiry(body.expires_in.as_deref())),
            refresh_token: body.refresh_token,
        })
    }
}

impl AuthProvider for Firebase {
    fn send_verification_code<'a>(
        &'a self,
        phone_number: &'a str,
        verifier_token: &'a str,
    ) -> BoxFuture<'a, Result<ConfirmationHandle>> {
        Box::pin(async move {
            let url = self.inner.toolkit_url("sendVerificationCode");
            let body = serde_json::json!({
                "phoneNumber": phone_number,
                "recaptchaToken": verifier_token,
            });

            tracing::debug!("Requesting verification code for {}", phone_number);
            let resp = self
                .inner
                .http
                .post(&url)
                .json(&body)
                .send()
                .await
                .context("Failed to call sendVerificationCode")?;
            let resp = check_response(resp, "accounts:sendVerificationCode").await?;
            let sent: SendCodeResponse = resp
                .json()
                .await
                .context("Failed to parse sendVerificationCode response")?;

            Ok(ConfirmationHandle {
                phone_number: phone_number.to_string(),
                session_info: sent.session_info,
            })
        })
    }

    fn confirm<'a>(
        &'a self,
        handle: &'a ConfirmationHandle,
        code: &'a str,
    ) -> BoxFuture<'a, Result<Identity>> {
        Box::pin(async move {
            let url = self.inner.toolkit_url("signInWithPhoneNumber");
            let body = serde_json::json!({
                "sessionInfo": handle.session_info,
                "code": code,
            });

            let resp = self
                .inner
                .http
                .post(&url)
                .json(&body)
                .send()
                .await
                .context("Failed to call signInWithPhoneNumber")?;
            let resp = check_response(resp, "accounts:signInWithPhoneNumber").await?;
            let signed_in: SignInResponse = resp
                .json()
                .await
                .context("Failed to parse signInWithPhoneNumber response")?;

            let session = StoredSession {
                uid: signed_in.local_id,
                phone_number: signed_in
                    .phone_number
                    .unwrap_or_else(|| handle.phone_number.clone()),
                id_token: StoredToken::new(
                    signed_in.id_token,
                    parse_expiry(signed_in.expires_in.as_deref()),
                ),
                refresh_token: signed_in.refresh_token,
            };
            let identity = super::identity_of(&session);
            self.inner.set_session(Some(session)).await;
            tracing::info!("Signed in as {}", identity.phone_number);

            Ok(identity)
        })
    }

    fn sign_out(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.inner.set_session(None).await;
            Ok(())
        })
    }

    fn identity_changes(&self) -> watch::Receiver<Option<Identity>> {
        self.inner.identity_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_in_response_parses() {
        let body = r#"{
            "idToken": "id",
            "refreshToken": "ref",
            "expiresIn": "3600",
            "localId": "uid-1",
            "isNewUser": true,
            "phoneNumber": "+15550001"
        }"#;
        let parsed: SignInResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.local_id, "uid-1");
        assert_eq!(parse_expiry(parsed.expires_in.as_deref()), Some(3600));
    }

    #[test]
    fn test_refresh_response_parses() {
        let body = r#"{
            "id_token": "id2",
            "refresh_token": "ref2",
            "expires_in": "3600",
            "user_id": "uid-1",
            "token_type": "Bearer"
        }"#;
        let parsed: RefreshResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.id_token, "id2");
        assert_eq!(parse_expiry(Some("bogus")), None);
    }
}
