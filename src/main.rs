//! duochat - two-party realtime chat
//!
//! Phone-number sign-in and a shared conversation in the terminal.

mod auth;
mod chat;
mod config;
mod error;
mod models;
mod platform;
mod tui;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "duochat")]
#[command(about = "Two-party realtime chat with phone-number sign-in", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with a verification code sent to your phone
    Login {
        /// Phone number in international format, e.g. +15551234567
        #[arg(short, long)]
        phone: Option<String>,

        /// Display name used when your profile is first created
        #[arg(short, long)]
        name: Option<String>,

        /// Proof-of-human token for the code request
        #[arg(long)]
        challenge_token: Option<String>,
    },

    /// Sign out and clear the stored session
    Logout,

    /// Show current sign-in status
    Status,

    /// Open the chat page
    Chat,

    /// Send a text message
    Send {
        /// Message text
        text: String,

        /// Id of the message being replied to (from `read` output)
        #[arg(short, long)]
        reply_to: Option<String>,
    },

    /// Print the conversation
    Read {
        /// Maximum number of messages to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Upload an image and post it
    Upload {
        /// Image file to send
        path: PathBuf,
    },

    /// Run a scripted two-party conversation in memory
    Demo,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging. The chat page owns the terminal, so its logs go
    // to the status bar instead of stderr.
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());
    let log_tail = tui::LogTail::new();
    match cli.command {
        Commands::Chat => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .without_time()
                    .with_writer(log_tail.clone()),
            )
            .init(),
        _ => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init(),
    }

    match cli.command {
        Commands::Login {
            phone,
            name,
            challenge_token,
        } => {
            tracing::info!("Starting sign-in flow...");
            auth::login(phone, name, challenge_token).await?;
        }
        Commands::Logout => {
            auth::logout().await?;
        }
        Commands::Status => {
            auth::status().await?;
        }
        Commands::Chat => {
            let config = config::Config::load()?;
            let platform = platform::firebase::connect(&config)?;
            tui::run(platform, log_tail).await?;
        }
        Commands::Send { text, reply_to } => {
            chat::send_message(&text, reply_to.as_deref()).await?;
        }
        Commands::Read { limit } => {
            chat::read_messages(limit).await?;
        }
        Commands::Upload { path } => {
            tracing::info!("Uploading {}...", path.display());
            chat::upload_image(&path).await?;
        }
        Commands::Demo => {
            chat::run_demo().await?;
        }
    }

    Ok(())
}
