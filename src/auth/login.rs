//! `login`, `logout` and `status` commands.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};

use super::flow::{AuthFlow, SignIn};
use super::tokens::SessionStore;
use super::verifier::{process_verifier, HumanVerifier, StaticChallenge};
use crate::config::Config;
use crate::error::ChatError;
use crate::platform::firebase;

/// Print `label` and read one line. `None` once input is exhausted.
async fn prompt<R>(lines: &mut Lines<R>, label: &str) -> Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut stdout = tokio::io::stdout();
    stdout.write_all(label.as_bytes()).await?;
    stdout.flush().await?;
    Ok(lines.next_line().await?)
}

/// Walk the verification flow interactively.
///
/// The phone number comes from `phone` on the first pass and from input
/// afterwards. At the code prompt an empty line or `back` cancels back to
/// the phone number; a wrong code asks again.
pub async fn sign_in_interactive<R>(
    flow: &mut AuthFlow,
    lines: &mut Lines<R>,
    mut phone: Option<String>,
    display_name: &str,
) -> Result<SignIn>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let number = match phone.take() {
            Some(number) => number,
            None => prompt(lines, "Phone number (e.g. +15551234567): ")
                .await?
                .context("Login aborted")?,
        };

        if let Err(e) = flow.request_code(&number).await {
            if !e.is_user_visible() {
                return Err(e.into());
            }
            eprintln!("{}", e);
            continue;
        }
        println!("Verification code sent to {}.", number.trim());

        loop {
            let code = prompt(lines, "Verification code (blank or 'back' to change number): ")
                .await?
                .context("Login aborted")?;
            let code = code.trim();
            if code.is_empty() || code.eq_ignore_ascii_case("back") {
                flow.cancel();
                break;
            }

            match flow.verify_code(code, display_name).await {
                Ok(sign_in) => return Ok(sign_in),
                Err(e @ ChatError::CodeInvalid) => eprintln!("{}", e),
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Sign in against the configured platform.
pub async fn login(
    phone: Option<String>,
    name: Option<String>,
    challenge_token: Option<String>,
) -> Result<()> {
    let config = Config::load()?;
    let platform = firebase::connect(&config)?;

    let verifier = process_verifier().get_or_init(|| {
        let token = config.resolve_challenge_token(challenge_token.as_deref());
        Arc::new(StaticChallenge::new(token)) as Arc<dyn HumanVerifier>
    });
    let mut flow = AuthFlow::new(&platform, verifier);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let display_name = match name {
        Some(name) => name,
        None => prompt(&mut lines, "Your name (blank for Anonymous): ")
            .await?
            .unwrap_or_default(),
    };

    let sign_in = sign_in_interactive(&mut flow, &mut lines, phone, &display_name).await?;
    if sign_in.first_login {
        println!("Welcome! Your profile has been created.");
    } else {
        println!("Welcome back, {}.", sign_in.identity.phone_number);
    }
    println!("Login successful.");
    Ok(())
}

/// Sign out and forget the stored session.
pub async fn logout() -> Result<()> {
    let mut config = Config::load()?;
    if config.get_session().is_none() {
        println!("Not signed in.");
        return Ok(());
    }

    match firebase::connect(&config) {
        Ok(platform) => platform.auth.sign_out().await?,
        Err(e) => {
            tracing::debug!("Platform unavailable ({:#}); clearing local session only", e);
            config.clear_session();
            config.save()?;
        }
    }
    println!("Logged out.");
    Ok(())
}

/// Display current auth status
pub async fn status() -> Result<()> {
    let config = Config::load()?;

    println!("Config:      {}", Config::config_path()?.display());
    if config.firebase.is_complete() {
        println!("Project:     {}", config.firebase.project_id);
    } else {
        println!("Project:     (not configured)");
    }

    match config.get_session() {
        Some(session) => {
            println!("Signed in:   {} ({})", session.phone_number, session.uid);
            if session.id_token.is_expired() {
                println!("Id token:    expired (refreshed on next use)");
            } else {
                println!("Id token:    valid");
                if let Some(exp) = session.id_token.expires_at {
                    println!("  expires_at: {}", exp);
                }
            }
        }
        None => println!("Signed in:   no"),
    }

    let challenge = if config.resolve_challenge_token(None).is_some() {
        "present"
    } else {
        "none"
    };
    println!("Challenge:   {}", challenge);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::flow::AuthState;
    use crate::platform::memory::MemoryServer;

    fn flow(server: &MemoryServer) -> AuthFlow {
        AuthFlow::new(
            &server.platform(),
            Arc::new(StaticChallenge::new(Some("challenge".into()))),
        )
    }

    fn input(text: &'static str) -> Lines<BufReader<&'static [u8]>> {
        BufReader::new(text.as_bytes()).lines()
    }

    #[tokio::test]
    async fn test_signs_in_with_flag_phone() {
        let server = MemoryServer::new();
        let mut flow = flow(&server);
        let mut lines = input("123456\n");

        let sign_in = sign_in_interactive(&mut flow, &mut lines, Some("+15550001".into()), "Al")
            .await
            .unwrap();
        assert!(sign_in.first_login);
        assert_eq!(server.profiles()[0].display_name, "Al");
    }

    #[tokio::test]
    async fn test_wrong_code_then_right_code() {
        let server = MemoryServer::new();
        let mut flow = flow(&server);
        let mut lines = input("000000\n123456\n");

        let sign_in = sign_in_interactive(&mut flow, &mut lines, Some("+15550001".into()), "")
            .await
            .unwrap();
        assert_eq!(sign_in.identity.phone_number, "+15550001");
        assert!(matches!(flow.state(), AuthState::Verified(_)));
    }

    #[tokio::test]
    async fn test_back_returns_to_phone_prompt() {
        let server = MemoryServer::new();
        let mut flow = flow(&server);
        let mut lines = input("back\n+15550002\n123456\n");

        let sign_in = sign_in_interactive(&mut flow, &mut lines, Some("+15550001".into()), "")
            .await
            .unwrap();
        assert_eq!(sign_in.identity.phone_number, "+15550002");
    }

    #[tokio::test]
    async fn test_rejected_number_reprompts_and_eof_aborts() {
        let server = MemoryServer::new();
        let mut flow = flow(&server);
        let mut lines = input("still bad\n");

        let result = sign_in_interactive(&mut flow, &mut lines, Some("bad".into()), "").await;
        assert!(result.is_err());
        assert_eq!(flow.state(), &AuthState::Unauthenticated);
    }
}
