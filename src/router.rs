//! Command Router
//!
//! Maps one inbound event to one operation:
//!
//! ```text
//! /start      -> register sender, greet
//! /ss         -> admin: send text to a user or handle
//! /image      -> stub
//! /text       -> stub
//! /reset      -> drop sender's transcript
//! /ss22users  -> admin: list registered users
//! /<other>    -> logged, no reply
//! plain text  -> completion gateway
//! ```
//!
//! Dispatch is stateless. Everything it touches lives in [`AppContext`].

use chrono::{DateTime, Local};
use tracing::{debug, info, warn};

use crate::app::AppContext;
use crate::platform::Target;

/// Fixed reply texts
pub mod replies {
    pub const GREETING: &str = "Привет! Я готов к работе.";
    pub const NOT_IMPLEMENTED: &str = "В разработке";
    pub const RESET_DONE: &str = "Контекст сброшен.";
    pub const ADMIN_ONLY: &str = "Команда доступна только администратору.";
    pub const SEND_USAGE: &str = "Использование: /ss <username_or_id> <текст>";
    pub const NO_USERS: &str = "Пользователи не найдены.";
    pub const USERS_HEADER: &str = "Пользователи:";
    pub const COMPLETION_FAILED: &str = "Извините, произошла ошибка при получении ответа от AI.";

    pub fn sent_to(target: &str) -> String {
        format!("Сообщение отправлено {}", target)
    }

    pub fn send_failed(target: &str) -> String {
        format!("Не удалось отправить сообщение {}", target)
    }
}

/// Who sent an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub id: i64,
    /// Telegram username without `@`
    pub handle: Option<String>,
    pub full_name: String,
}

/// A text event from the platform
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub sender: Sender,
    pub chat_id: i64,
    pub text: String,
    pub received_at: DateTime<Local>,
}

impl InboundEvent {
    pub fn new(sender: Sender, chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            sender,
            chat_id,
            text: text.into(),
            received_at: Local::now(),
        }
    }
}

/// Recognized command tokens
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Send,
    Image,
    Text,
    Reset,
    ListUsers,
    Unknown(String),
}

impl Command {
    /// Tokens match case-insensitively, as Telegram clients send them
    pub fn from_token(token: &str) -> Self {
        match token.to_lowercase().as_str() {
            "start" => Self::Start,
            "ss" => Self::Send,
            "image" => Self::Image,
            "text" => Self::Text,
            "reset" => Self::Reset,
            "ss22users" => Self::ListUsers,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// A command with its whitespace-separated arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub command: Command,
    pub args: Vec<String>,
}

/// Parse `/token[@bot] args...`. Returns `None` for plain text.
///
/// A command addressed to a different bot parses as [`Command::Unknown`].
/// With no `bot_username` every `@bot` suffix is accepted.
pub fn parse_command(text: &str, bot_username: Option<&str>) -> Option<ParsedCommand> {
    let rest = text.strip_prefix('/')?;

    // "/ foo" is not a command
    if rest.starts_with(char::is_whitespace) {
        return None;
    }

    let mut words = rest.split_whitespace();
    let head = words.next()?;
    let (token, addressee) = match head.split_once('@') {
        Some((token, bot)) => (token, Some(bot)),
        None => (head, None),
    };
    if token.is_empty() {
        return None;
    }

    let for_us = match (addressee, bot_username) {
        (Some(bot), Some(me)) => bot.eq_ignore_ascii_case(me),
        _ => true,
    };
    let command = if for_us {
        Command::from_token(token)
    } else {
        Command::Unknown(head.to_string())
    };

    Some(ParsedCommand {
        command,
        args: words.map(str::to_string).collect(),
    })
}

/// Log line written for every event before dispatch
pub fn describe_event(event: &InboundEvent) -> String {
    format!(
        "[{}] FROM {} ({}) [ID: {}]: {}",
        event.received_at.format("%Y-%m-%d %H:%M:%S"),
        event.sender.handle.as_deref().unwrap_or("без username"),
        event.sender.full_name,
        event.sender.id,
        event.text
    )
}

/// Handle one event. Returns the reply for the originating chat, if any.
pub async fn dispatch(ctx: &AppContext, event: &InboundEvent) -> Option<String> {
    info!("{}", describe_event(event));

    let Some(parsed) = parse_command(&event.text, ctx.bot_username.as_deref()) else {
        return Some(relay_text(ctx, event).await);
    };

    let reply = match parsed.command {
        Command::Start => handle_start(ctx, &event.sender),
        Command::Send => handle_send(ctx, &event.sender, &parsed.args).await,
        Command::Image | Command::Text => replies::NOT_IMPLEMENTED.to_string(),
        Command::Reset => handle_reset(ctx, &event.sender).await,
        Command::ListUsers => handle_list_users(ctx, &event.sender),
        Command::Unknown(token) => {
            debug!("Ignoring unknown command /{} from {}", token, event.sender.id);
            return None;
        }
    };

    Some(reply)
}

fn handle_start(ctx: &AppContext, sender: &Sender) -> String {
    match ctx.registry.register(sender.id, sender.handle.as_deref()) {
        Ok(true) => info!("New user registered: {}", sender.id),
        Ok(false) => debug!("User {} already registered", sender.id),
        Err(e) => warn!("Failed to persist registration of {}: {}", sender.id, e),
    }
    replies::GREETING.to_string()
}

async fn relay_text(ctx: &AppContext, event: &InboundEvent) -> String {
    let user_id = event.sender.id;
    let _guard = ctx.conversations.lock_user(user_id).await;

    match ctx
        .gateway
        .exchange(&ctx.conversations, user_id, &event.text)
        .await
    {
        Ok(answer) => answer,
        Err(e) => {
            warn!("Completion failed for user {}: {}", user_id, e);
            replies::COMPLETION_FAILED.to_string()
        }
    }
}

async fn handle_reset(ctx: &AppContext, sender: &Sender) -> String {
    let _guard = ctx.conversations.lock_user(sender.id).await;
    ctx.conversations.reset(sender.id);
    replies::RESET_DONE.to_string()
}

async fn handle_send(ctx: &AppContext, sender: &Sender, args: &[String]) -> String {
    if !ctx.config.is_admin(sender.id) {
        warn!("Non-admin {} tried /ss", sender.id);
        return replies::ADMIN_ONLY.to_string();
    }

    let [raw_target, words @ ..] = args else {
        return replies::SEND_USAGE.to_string();
    };
    if words.is_empty() {
        return replies::SEND_USAGE.to_string();
    }

    let target = Target::parse(raw_target);
    let text = words.join(" ");

    match ctx.messenger.send_text(&target, &text).await {
        Ok(()) => {
            info!("Admin message delivered to {}", target);
            replies::sent_to(raw_target)
        }
        Err(e) => {
            warn!("Failed to deliver admin message to {}: {}", target, e);
            replies::send_failed(raw_target)
        }
    }
}

fn handle_list_users(ctx: &AppContext, sender: &Sender) -> String {
    if !ctx.config.is_admin(sender.id) {
        warn!("Non-admin {} tried /ss22users", sender.id);
        return replies::ADMIN_ONLY.to_string();
    }

    let users = ctx.registry.list();
    if users.is_empty() {
        return replies::NO_USERS.to_string();
    }

    let lines: Vec<String> = users
        .iter()
        .map(|u| format!("ID: {}, Username: @{}", u.user_id, u.handle))
        .collect();

    format!("{}\n{}", replies::USERS_HEADER, lines.join("\n"))
}
