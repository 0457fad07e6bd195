//! Configuration and session storage

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::auth::{SessionStore, StoredSession};

/// Environment variable that overrides the configured challenge token.
pub const CHALLENGE_TOKEN_ENV: &str = "DUOCHAT_CHALLENGE_TOKEN";

const DEFAULT_POLL_INTERVAL_MS: u64 = 1500;

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

/// Connection parameters for the hosted platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirebaseConfig {
    pub api_key: String,
    pub project_id: String,
    pub storage_bucket: String,
    #[serde(default)]
    pub auth_domain: String,
}

impl FirebaseConfig {
    pub fn is_complete(&self) -> bool {
        !self.api_key.is_empty() && !self.project_id.is_empty() && !self.storage_bucket.is_empty()
    }
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub firebase: FirebaseConfig,
    /// How often the realtime listeners re-read the database
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Proof-of-human token handed to the verification endpoint
    #[serde(default)]
    pub challenge_token: Option<String>,
    /// Signed-in platform session (from last login)
    #[serde(default)]
    pub session: Option<StoredSession>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            firebase: FirebaseConfig::default(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            challenge_token: None,
            session: None,
        }
    }
}

impl Config {
    /// Get config directory path
    fn config_dir() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "duochat", "duochat")
            .context("Could not determine config directory")?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }

    /// Get config file path
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from disk
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        Self::parse(&content)
    }

    fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir).context("Failed to create config directory")?;

        let path = Self::config_path()?;
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, content).context("Failed to write config file")?;

        // Set restrictive permissions on config file (contains tokens)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&path, perms).context("Failed to set config permissions")?;
        }

        Ok(())
    }

    /// Challenge token: flag, then environment, then config file.
    pub fn resolve_challenge_token(&self, flag: Option<&str>) -> Option<String> {
        flag.map(String::from)
            .or_else(|| std::env::var(CHALLENGE_TOKEN_ENV).ok())
            .or_else(|| self.challenge_token.clone())
            .filter(|t| !t.trim().is_empty())
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms.max(100))
    }
}

impl SessionStore for Config {
    fn get_session(&self) -> Option<StoredSession> {
        self.session.clone()
    }

    fn set_session(&mut self, session: StoredSession) {
        self.session = Some(session);
    }

    fn clear_session(&mut self) {
        self.session = None;
    }
}
