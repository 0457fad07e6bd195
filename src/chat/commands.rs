//! One-shot chat commands and the scripted demo.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Local;

use super::session::ChatSession;
use super::view::{ChatView, MessageRow, RowContent};
use super::EMOJI_PALETTE;
use crate::auth::{AuthFlow, StaticChallenge};
use crate::config::Config;
use crate::platform::memory::{MemoryServer, DEFAULT_TEST_CODE};
use crate::platform::{firebase, Platform};

/// How long the demo waits for a feed to catch up.
const DEMO_STEP_TIMEOUT: Duration = Duration::from_secs(10);

/// Open a session on the configured platform and wait for the first
/// snapshot. Only sessions that print the log send read receipts.
async fn open_session(shows_messages: bool) -> Result<ChatSession> {
    let config = Config::load()?;
    let platform = firebase::connect(&config)?;
    let mut session = if shows_messages {
        ChatSession::new(platform)
    } else {
        ChatSession::without_read_receipts(platform)
    };
    session.settle().await?;
    Ok(session)
}

fn format_row(row: &MessageRow) -> Vec<String> {
    let time = row.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M");
    let body = match &row.content {
        RowContent::Text(text) => text.clone(),
        RowContent::Image { url } => format!("[image] {}", url),
    };

    let mut lines = Vec::new();
    if let Some(quote) = &row.reply_quote {
        lines.push(format!("    > {}", quote));
    }
    lines.push(format!("[{}] {}: {}", time, row.sender, body));
    lines.push(format!("    id: {}", row.id));
    if let Some(marker) = row.seen_marker() {
        lines.push(format!("    {}", marker));
    }
    lines
}

fn print_view(view: &ChatView) {
    match &view.partner {
        Some(partner) => {
            let typing = if partner.typing { "  (Typing...)" } else { "" };
            println!("[{}] {}{}", partner.initial, partner.title(), typing);
        }
        None => println!("(no chat partner yet)"),
    }
    println!("{:-<60}", "");

    if view.rows.is_empty() {
        println!("(no messages)");
    }
    for row in &view.rows {
        for line in format_row(row) {
            println!("{}", line);
        }
    }
    if let Some(quote) = &view.replying_to {
        println!("Replying to: {}", quote);
    }
    if !view.draft.is_empty() {
        println!("Draft: {}", view.draft);
    }
    if let Some(notice) = &view.notice {
        println!("! {}", notice);
    }
}

/// Print the last `limit` messages. Reading marks the partner's messages
/// as read, the same as opening the chat page.
pub async fn read_messages(limit: usize) -> Result<()> {
    let mut session = open_session(true).await?;
    session.flush_receipts().await;

    let mut view = session.view();
    let skip = view.rows.len().saturating_sub(limit);
    view.rows.drain(..skip);
    print_view(&view);
    Ok(())
}

pub async fn send_message(text: &str, reply_to: Option<&str>) -> Result<()> {
    let mut session = open_session(false).await?;
    if let Some(id) = reply_to {
        if !session.stage_reply(id) {
            bail!("No message with id {}", id);
        }
    }

    session.set_draft(text);
    match session.send_message().await? {
        Some(id) => println!("Message sent ({}).", id),
        None => println!("Nothing to send."),
    }
    session.close();
    Ok(())
}

pub async fn upload_image(path: &Path) -> Result<()> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .context("Upload path has no file name")?;

    let mut session = open_session(false).await?;
    let id = session.send_image(bytes, name).await?;
    println!("Image sent ({}).", id);
    session.close();
    Ok(())
}

/// A client of `server` signed in as `phone`.
async fn demo_user(server: &MemoryServer, phone: &str, name: &str) -> Result<Platform> {
    let platform = server.platform();
    let mut flow = AuthFlow::new(
        &platform,
        Arc::new(StaticChallenge::new(Some("demo".into()))),
    );
    flow.request_code(phone).await?;
    let sign_in = flow.verify_code(DEFAULT_TEST_CODE, name).await?;
    tracing::info!(
        "{} signed in ({})",
        name,
        if sign_in.first_login {
            "new user created"
        } else {
            "welcome back"
        }
    );
    Ok(platform)
}

async fn open(platform: Platform) -> Result<ChatSession> {
    let mut session = ChatSession::new(platform);
    session.settle().await?;
    Ok(session)
}

/// Apply feed events until `done` holds.
async fn pump(session: &mut ChatSession, done: impl Fn(&ChatSession) -> bool) -> Result<()> {
    tokio::time::timeout(DEMO_STEP_TIMEOUT, async {
        while !done(&*session) {
            let event = session.next_event().await;
            session.apply(event).await;
        }
    })
    .await
    .context("Demo feed stalled")
}

/// Scripted two-party conversation on the in-memory platform.
pub async fn run_demo() -> Result<()> {
    let server = MemoryServer::new();
    // Both profiles must exist before either session looks for a partner.
    let alice = demo_user(&server, "+15550001", "Alice").await?;
    let bob = demo_user(&server, "+15550002", "Bob").await?;
    let mut alice = open(alice).await?;
    let mut bob = open(bob).await?;

    alice.update_draft("hello");
    pump(&mut bob, |s| s.view().partner.is_some_and(|p| p.typing)).await?;
    println!("Bob sees Alice typing...\n");

    alice.send_message().await?;
    pump(&mut bob, |s| !s.messages().is_empty()).await?;
    bob.flush_receipts().await;
    pump(&mut alice, |s| s.messages().first().is_some_and(|m| m.read)).await?;

    let hello = bob.messages()[0].id.clone();
    bob.swipe(&hello, 90.0);
    bob.update_draft("hi Alice");
    bob.toggle_emoji_picker();
    bob.append_to_draft(" ");
    bob.append_to_draft(EMOJI_PALETTE[0]);
    bob.send_message().await?;

    alice
        .send_image(b"\x89PNG demo".to_vec(), "wave.png")
        .await?;
    pump(&mut alice, |s| s.messages().len() == 3).await?;
    alice.flush_receipts().await;
    pump(&mut bob, |s| {
        s.messages().len() == 3 && s.messages().iter().all(|m| m.read)
    })
    .await?;

    println!("== Alice ==");
    print_view(&alice.view());
    println!("\n== Bob ==");
    print_view(&bob.view());
    Ok(())
}
