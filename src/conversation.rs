//! Conversation Store
//!
//! In-memory transcripts, one per user, sent wholesale to the model on
//! every message. Nothing is persisted: a restart forgets every conversation.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OwnedMutexGuard;
use tracing::debug;

/// First turn of every transcript
pub const SYSTEM_PROMPT: &str = "Ты дружелюбный голосовой помощник.";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConversationError {
    #[error("No conversation for user {0}")]
    Missing(i64),
}

/// Author of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in a transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Per-user transcripts.
///
/// Transcripts are never trimmed and grow for as long as the process runs.
/// Memory use is unbounded under sustained traffic from a single user.
pub struct ConversationStore {
    system_prompt: String,
    transcripts: Mutex<HashMap<i64, Vec<Turn>>>,
    user_locks: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::with_system_prompt(SYSTEM_PROMPT)
    }

    pub fn with_system_prompt(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            transcripts: Mutex::new(HashMap::new()),
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Serialize all transcript work for one user.
    ///
    /// Hold the guard across a whole exchange so a second message from the
    /// same user cannot slip its turn in between a question and its answer.
    pub async fn lock_user(&self, user_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.user_locks.lock();
            Arc::clone(locks.entry(user_id).or_default())
        };
        lock.lock_owned().await
    }

    /// Transcript for the user, seeded with the system turn if absent
    pub fn get_or_create(&self, user_id: i64) -> Vec<Turn> {
        let mut transcripts = self.transcripts.lock();
        transcripts
            .entry(user_id)
            .or_insert_with(|| {
                debug!("New conversation for user {}", user_id);
                vec![Turn::system(self.system_prompt.clone())]
            })
            .clone()
    }

    pub fn append_user_turn(&self, user_id: i64, text: &str) -> Result<(), ConversationError> {
        self.append(user_id, Turn::user(text))
    }

    pub fn append_assistant_turn(
        &self,
        user_id: i64,
        text: &str,
    ) -> Result<(), ConversationError> {
        self.append(user_id, Turn::assistant(text))
    }

    fn append(&self, user_id: i64, turn: Turn) -> Result<(), ConversationError> {
        let mut transcripts = self.transcripts.lock();
        let transcript = transcripts
            .get_mut(&user_id)
            .ok_or(ConversationError::Missing(user_id))?;
        transcript.push(turn);
        Ok(())
    }

    /// Drop the transcript. Returns whether there was one.
    pub fn reset(&self, user_id: i64) -> bool {
        let removed = self.transcripts.lock().remove(&user_id).is_some();
        debug!("Reset conversation for user {} (existed: {})", user_id, removed);
        removed
    }

    pub fn transcript(&self, user_id: i64) -> Option<Vec<Turn>> {
        self.transcripts.lock().get(&user_id).cloned()
    }

    /// Number of turns, 0 when the user has no conversation
    pub fn len(&self, user_id: i64) -> usize {
        self.transcripts
            .lock()
            .get(&user_id)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Number of users with a live conversation
    pub fn active_users(&self) -> usize {
        self.transcripts.lock().len()
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}
