//! Messaging platform boundary
//!
//! The router only needs "send text to someone". [`Messenger`] is that seam;
//! [`TelegramMessenger`] implements it on top of teloxide.

use async_trait::async_trait;
use std::fmt;
use teloxide::prelude::*;
use teloxide::types::Recipient;
use thiserror::Error;

/// Telegram rejects messages above 4096 characters
pub const MAX_MESSAGE_CHARS: usize = 4000;

#[derive(Error, Debug)]
pub enum SendError {
    #[error("Send failed: {0}")]
    Failed(String),

    #[error(transparent)]
    Telegram(#[from] teloxide::RequestError),
}

/// Who an outbound message goes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Numeric chat or user ID
    Chat(i64),
    /// Public handle, always stored with its leading `@`
    Handle(String),
}

impl Target {
    /// All-digit input is a chat ID, anything else a handle
    pub fn parse(raw: &str) -> Self {
        if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(id) = raw.parse() {
                return Self::Chat(id);
            }
        }
        Self::Handle(format!("@{}", raw))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chat(id) => write!(f, "{}", id),
            Self::Handle(handle) => f.write_str(handle),
        }
    }
}

impl From<Target> for Recipient {
    fn from(target: Target) -> Self {
        match target {
            Target::Chat(id) => Recipient::Id(ChatId(id)),
            Target::Handle(handle) => Recipient::ChannelUsername(handle),
        }
    }
}

/// Outbound side of the messaging platform
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_text(&self, target: &Target, text: &str) -> Result<(), SendError>;
}

/// teloxide-backed messenger
#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn send_text(&self, target: &Target, text: &str) -> Result<(), SendError> {
        for chunk in chunk_message(text) {
            self.bot.send_message(target.clone(), chunk).await?;
        }
        Ok(())
    }
}

/// Split text into Telegram-sized pieces on char boundaries
pub fn chunk_message(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        let split_at = remaining
            .char_indices()
            .nth(MAX_MESSAGE_CHARS)
            .map(|(i, _)| i)
            .unwrap_or(remaining.len());
        let (chunk, rest) = remaining.split_at(split_at);
        chunks.push(chunk.to_string());
        remaining = rest;
    }

    chunks
}
