//! Completion Gateway
//!
//! Sends a user's whole transcript to an OpenAI-compatible chat completion
//! endpoint (OpenRouter by default) and records the answer.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::Config;
use crate::conversation::{ConversationError, ConversationStore, Turn};

/// Completion failures. None of them are retried.
#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error(transparent)]
    Conversation(#[from] ConversationError),
}

/// What gets sent to the model
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Turn>,
    pub max_tokens: u32,
}

/// Anything that can turn a transcript into one completion text
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;
}

/// API response
#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenRouter chat completion client
#[derive(Clone)]
pub struct OpenRouterClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenRouterClient {
    pub fn new(api_key: &str, base_url: &str) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(120))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Create from config
    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.api_key, &config.base_url)
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl CompletionBackend for OpenRouterClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        debug!(
            "Calling completion API: model={}, turns={}",
            request.model,
            request.messages.len()
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Api { status, body });
        }

        let result: ChatResponse = response.json().await?;
        extract_content(result)
    }
}

fn extract_content(response: ChatResponse) -> Result<String, CompletionError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| CompletionError::Malformed("no choices in response".to_string()))?;

    choice
        .message
        .content
        .ok_or_else(|| CompletionError::Malformed("choice has no content".to_string()))
}

/// Bridges the conversation store and a completion backend
pub struct CompletionGateway {
    backend: Arc<dyn CompletionBackend>,
    model: String,
    max_tokens: u32,
}

impl CompletionGateway {
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        model: impl Into<String>,
        max_tokens: u32,
    ) -> Self {
        Self {
            backend,
            model: model.into(),
            max_tokens,
        }
    }

    pub fn from_config(backend: Arc<dyn CompletionBackend>, config: &Config) -> Self {
        Self::new(backend, config.model.clone(), config.max_tokens)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// One exchange: append the user turn, ask the model, append its answer.
    ///
    /// On error the user turn stays in the transcript and no assistant turn
    /// is added. A blank answer counts as an error. Callers should hold
    /// [`ConversationStore::lock_user`].
    pub async fn exchange(
        &self,
        store: &ConversationStore,
        user_id: i64,
        text: &str,
    ) -> Result<String, CompletionError> {
        store.get_or_create(user_id);
        store.append_user_turn(user_id, text)?;

        let messages = store.get_or_create(user_id);
        let request = CompletionRequest {
            model: self.model.clone(),
            messages,
            max_tokens: self.max_tokens,
        };

        let answer = self.backend.complete(&request).await?;
        let answer = answer.trim().to_string();
        if answer.is_empty() {
            return Err(CompletionError::Malformed("empty completion".to_string()));
        }

        store.append_assistant_turn(user_id, &answer)?;

        info!(
            "Completion for user {}: {} chars, transcript now {} turns",
            user_id,
            answer.len(),
            store.len(user_id)
        );

        Ok(answer)
    }
}
