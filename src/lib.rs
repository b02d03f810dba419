//! relaybot
//!
//! Telegram bot that relays each user's messages, together with that user's
//! conversation so far, to an OpenRouter chat model and sends back the answer.
//!
//! # Architecture
//!
//! ```text
//! Telegram ──► telegram::message_handler ──► router::dispatch
//!                                               │
//!                                               ├── registry     (/start, /ss22users)
//!                                               ├── conversation (/reset, plain text)
//!                                               ├── completion   (plain text ──► OpenRouter)
//!                                               └── platform     (/ss ──► any chat)
//! ```

pub mod app;
pub mod completion;
pub mod config;
pub mod conversation;
pub mod platform;
pub mod registry;
pub mod router;
pub mod telegram;

pub use app::AppContext;
pub use completion::{
    CompletionBackend, CompletionError, CompletionGateway, CompletionRequest, OpenRouterClient,
};
pub use config::Config;
pub use conversation::{ConversationStore, Role, Turn};
pub use platform::{Messenger, SendError, Target, TelegramMessenger};
pub use registry::{RegistryError, UserRecord, UserRegistry};
pub use router::{dispatch, Command, InboundEvent, Sender};
