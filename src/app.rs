//! Process-wide state shared by every handler

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::completion::{CompletionBackend, CompletionGateway, OpenRouterClient};
use crate::config::Config;
use crate::conversation::ConversationStore;
use crate::platform::Messenger;
use crate::registry::UserRegistry;

/// Everything the router needs. Built once at startup, then shared as
/// `Arc<AppContext>`.
pub struct AppContext {
    pub config: Config,
    pub registry: UserRegistry,
    pub conversations: ConversationStore,
    pub gateway: CompletionGateway,
    pub messenger: Arc<dyn Messenger>,
    /// This bot's username, used to ignore `/cmd@other_bot`
    pub bot_username: Option<String>,
}

impl AppContext {
    pub fn new(
        config: Config,
        registry: UserRegistry,
        backend: Arc<dyn CompletionBackend>,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        let gateway = CompletionGateway::from_config(backend, &config);
        Self {
            config,
            registry,
            conversations: ConversationStore::new(),
            gateway,
            messenger,
            bot_username: None,
        }
    }

    pub fn with_bot_username(mut self, username: Option<String>) -> Self {
        self.bot_username = username;
        self
    }

    /// Load the registry from `config.users_file` and talk to OpenRouter
    pub fn from_config(config: Config, messenger: Arc<dyn Messenger>) -> Result<Self> {
        let registry = UserRegistry::load(&config.users_file).with_context(|| {
            format!("Failed to load user registry {}", config.users_file.display())
        })?;
        let backend = Arc::new(OpenRouterClient::from_config(&config));
        Ok(Self::new(config, registry, backend, messenger))
    }
}
