//! Configuration management

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Privileged Telegram user allowed to run `/ss` and `/ss22users`.
pub const DEFAULT_ADMIN_ID: i64 = 6061124706;

/// OpenRouter-compatible API root
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

pub const DEFAULT_MODEL: &str = "mistralai/mistral-small-24b-instruct-2501:free";

/// Max completion length in tokens
pub const DEFAULT_MAX_TOKENS: u32 = 150;

pub const DEFAULT_USERS_FILE: &str = "users.json";

/// Bot configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Telegram bot token
    pub telegram_token: String,

    /// OpenRouter API key
    pub api_key: String,

    /// Base URL of the chat completion API
    pub base_url: String,

    /// Model identifier sent with every completion request
    pub model: String,

    /// Maximum response length in tokens
    pub max_tokens: u32,

    /// JSON file holding registered users
    pub users_file: PathBuf,

    /// Admin identity
    pub admin_id: i64,
}

impl Config {
    /// Config with compiled-in defaults for everything except the secrets
    pub fn new(telegram_token: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            telegram_token: telegram_token.into(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            users_file: PathBuf::from(DEFAULT_USERS_FILE),
            admin_id: DEFAULT_ADMIN_ID,
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let telegram_token = std::env::var("TELEGRAM_TOKEN")
            .or_else(|_| std::env::var("TELOXIDE_TOKEN"))
            .context("TELEGRAM_TOKEN must be set")?;

        let api_key =
            std::env::var("OPENROUTER_API_KEY").context("OPENROUTER_API_KEY must be set")?;

        let mut config = Self::new(telegram_token, api_key);

        if let Ok(base_url) = std::env::var("OPENROUTER_BASE_URL") {
            config.base_url = base_url.trim_end_matches('/').to_string();
        }

        if let Ok(model) = std::env::var("RELAYBOT_MODEL") {
            config.model = model;
        }

        config.max_tokens = std::env::var("RELAYBOT_MAX_TOKENS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_TOKENS);

        if let Ok(path) = std::env::var("RELAYBOT_USERS_FILE") {
            config.users_file = PathBuf::from(path);
        }

        if let Ok(raw) = std::env::var("RELAYBOT_ADMIN_ID") {
            config.admin_id = raw
                .trim()
                .parse()
                .with_context(|| format!("RELAYBOT_ADMIN_ID is not a numeric ID: {}", raw))?;
        }

        Ok(config)
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        user_id == self.admin_id
    }
}
