//! Telegram runtime
//!
//! Long-polls Telegram, turns each text message into an [`InboundEvent`],
//! runs it through the router and sends the reply back to the same chat.
//!
//! Uses explicit Dispatcher pattern for reliable message polling.

use anyhow::Result;
use chrono::Local;
use std::sync::Arc;
use teloxide::{
    dispatching::{Dispatcher, UpdateFilterExt},
    dptree,
    error_handlers::LoggingErrorHandler,
    prelude::*,
    types::Update,
};

use crate::app::AppContext;
use crate::config::Config;
use crate::platform::{Target, TelegramMessenger};
use crate::router::{self, InboundEvent, Sender};

/// Run the bot until Ctrl-C
pub async fn run_bot(config: Config) -> Result<()> {
    let bot = Bot::new(config.telegram_token.clone());

    // Verify bot token by calling getMe
    tracing::info!("Verifying bot token...");
    let bot_username = match bot.get_me().await {
        Ok(me) => {
            tracing::info!(
                "Bot authenticated: @{} (ID: {})",
                me.username.as_deref().unwrap_or("unknown"),
                me.id
            );
            me.username.clone()
        }
        Err(e) => {
            tracing::error!("Failed to authenticate bot: {}", e);
            anyhow::bail!("Bot authentication failed: {}", e);
        }
    };

    // Delete any existing webhook to ensure polling works
    if let Err(e) = bot.delete_webhook().await {
        tracing::warn!("Failed to delete webhook: {} (continuing anyway)", e);
    }

    let messenger = Arc::new(TelegramMessenger::new(bot.clone()));
    let ctx = AppContext::from_config(config, messenger)?.with_bot_username(bot_username);
    let ctx = Arc::new(ctx);

    tracing::info!("===========================================");
    tracing::info!("  Registry: {:?} ({} users)", ctx.registry.path(), ctx.registry.len());
    tracing::info!("  Model: {}", ctx.gateway.model());
    tracing::info!("  Admin ID: {}", ctx.config.admin_id);
    tracing::info!("===========================================");

    let handler = dptree::entry().branch(Update::filter_message().endpoint(message_handler));

    tracing::info!("Бот запущен");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![ctx])
        .default_handler(|upd| async move {
            tracing::debug!("Unhandled update: {:?}", upd);
        })
        .error_handler(LoggingErrorHandler::with_custom_text(
            "Error in message handler",
        ))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    tracing::warn!("Dispatcher stopped");
    Ok(())
}

/// Message handler endpoint for the dispatcher
async fn message_handler(msg: Message, ctx: Arc<AppContext>) -> ResponseResult<()> {
    let Some(event) = to_event(&msg) else {
        tracing::debug!("Skipping non-text message in chat {}", msg.chat.id);
        return Ok(());
    };

    if let Some(reply) = router::dispatch(&ctx, &event).await {
        let target = Target::Chat(event.chat_id);
        if let Err(e) = ctx.messenger.send_text(&target, &reply).await {
            tracing::error!("Failed to reply in chat {}: {}", event.chat_id, e);
        }
    }

    Ok(())
}

/// Only text messages with a known sender become events
fn to_event(msg: &Message) -> Option<InboundEvent> {
    let text = msg.text()?;
    let user = msg.from.as_ref()?;

    Some(InboundEvent {
        sender: Sender {
            id: user.id.0 as i64,
            handle: user.username.clone(),
            full_name: user.full_name(),
        },
        chat_id: msg.chat.id.0,
        text: text.to_string(),
        received_at: msg.date.with_timezone(&Local),
    })
}
