//! Router Integration Tests
//!
//! Drives `dispatch` end to end with an in-process completion backend and
//! messenger, and a registry file in a temp dir.

use async_trait::async_trait;
use parking_lot::Mutex;
use relaybot::conversation::{Role, Turn, SYSTEM_PROMPT};
use relaybot::router::replies;
use relaybot::{
    dispatch, AppContext, CompletionBackend, CompletionError, CompletionRequest, Config,
    InboundEvent, Messenger, SendError, Sender, Target, UserRegistry,
};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

const ADMIN: i64 = 6061124706;

/// Answers from a script; an exhausted script behaves like an API outage
#[derive(Default)]
struct FakeBackend {
    answers: Mutex<Vec<Result<String, CompletionError>>>,
    calls: Mutex<Vec<CompletionRequest>>,
}

impl FakeBackend {
    fn answer(&self, text: &str) {
        self.answers.lock().insert(0, Ok(text.to_string()));
    }

    fn fail(&self) {
        self.answers.lock().insert(
            0,
            Err(CompletionError::Api {
                status: 503,
                body: "unavailable".into(),
            }),
        );
    }
}

#[async_trait]
impl CompletionBackend for FakeBackend {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        self.calls.lock().push(request.clone());
        self.answers
            .lock()
            .pop()
            .unwrap_or_else(|| Err(CompletionError::Malformed("no scripted answer".into())))
    }
}

#[derive(Default)]
struct FakeMessenger {
    sent: Mutex<Vec<(Target, String)>>,
    reject: Mutex<bool>,
}

#[async_trait]
impl Messenger for FakeMessenger {
    async fn send_text(&self, target: &Target, text: &str) -> Result<(), SendError> {
        if *self.reject.lock() {
            return Err(SendError::Failed("chat not found".into()));
        }
        self.sent.lock().push((target.clone(), text.to_string()));
        Ok(())
    }
}

struct Harness {
    ctx: AppContext,
    backend: Arc<FakeBackend>,
    messenger: Arc<FakeMessenger>,
    dir: TempDir,
}

const BOT_USERNAME: &str = "relay_bot";

fn create_harness() -> Harness {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let users_file = dir.path().join("users.json");
    build_harness(dir, users_file)
}

fn build_harness(dir: TempDir, users_file: PathBuf) -> Harness {
    let mut config = Config::new("token", "key");
    config.users_file = users_file;

    let registry = UserRegistry::load(&config.users_file).expect("Failed to load registry");
    let backend = Arc::new(FakeBackend::default());
    let messenger = Arc::new(FakeMessenger::default());
    let ctx = AppContext::new(config, registry, backend.clone(), messenger.clone())
        .with_bot_username(Some(BOT_USERNAME.to_string()));

    Harness {
        ctx,
        backend,
        messenger,
        dir,
    }
}

fn event(user_id: i64, handle: Option<&str>, text: &str) -> InboundEvent {
    InboundEvent::new(
        Sender {
            id: user_id,
            handle: handle.map(str::to_string),
            full_name: "Test User".into(),
        },
        user_id,
        text,
    )
}

#[tokio::test]
async fn test_start_registers_once() {
    let h = create_harness();

    let reply = dispatch(&h.ctx, &event(42, Some("alice"), "/start")).await;
    assert_eq!(reply.as_deref(), Some(replies::GREETING));
    assert!(h.ctx.registry.contains(42));

    let file = h.dir.path().join("users.json");
    let first = std::fs::read_to_string(&file).unwrap();
    assert_eq!(first, "{\n  \"42\": \"alice\"\n}");

    let reply = dispatch(&h.ctx, &event(42, Some("other"), "/start")).await;
    assert_eq!(reply.as_deref(), Some(replies::GREETING));
    assert_eq!(std::fs::read_to_string(&file).unwrap(), first);
    assert_eq!(h.ctx.registry.len(), 1);
}

#[tokio::test]
async fn test_start_without_handle() {
    let h = create_harness();
    dispatch(&h.ctx, &event(7, None, "/start")).await;

    let users = h.ctx.registry.list();
    assert_eq!(users[0].handle, "неизвестно");
}

#[tokio::test]
async fn test_start_still_greets_when_registry_write_fails() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "").unwrap();
    let users_file = blocker.join("users.json");
    let h = build_harness(dir, users_file);

    let reply = dispatch(&h.ctx, &event(42, Some("alice"), "/start")).await;
    assert_eq!(reply.as_deref(), Some(replies::GREETING));
    assert!(!h.ctx.registry.contains(42));
    assert!(h.ctx.registry.is_empty());
}

#[tokio::test]
async fn test_full_scenario() {
    let h = create_harness();

    dispatch(&h.ctx, &event(42, Some("alice"), "/start")).await;

    h.backend.answer("hi");
    let reply = dispatch(&h.ctx, &event(42, Some("alice"), "hello")).await;
    assert_eq!(reply.as_deref(), Some("hi"));
    assert_eq!(
        h.ctx.conversations.transcript(42).unwrap(),
        vec![
            Turn::system(SYSTEM_PROMPT),
            Turn::user("hello"),
            Turn::assistant("hi")
        ]
    );

    let reply = dispatch(&h.ctx, &event(42, Some("alice"), "/reset")).await;
    assert_eq!(reply.as_deref(), Some(replies::RESET_DONE));
    assert!(h.ctx.conversations.transcript(42).is_none());

    h.backend.answer("fresh");
    dispatch(&h.ctx, &event(42, Some("alice"), "again")).await;
    let transcript = h.ctx.conversations.transcript(42).unwrap();
    assert_eq!(transcript.len(), 3);
    assert_eq!(transcript[0], Turn::system(SYSTEM_PROMPT));
    assert_eq!(transcript[1], Turn::user("again"));
}

#[tokio::test]
async fn test_transcript_growth_per_exchange() {
    let h = create_harness();

    h.backend.answer("one");
    dispatch(&h.ctx, &event(1, None, "a")).await;
    assert_eq!(h.ctx.conversations.len(1), 3);

    h.backend.fail();
    let reply = dispatch(&h.ctx, &event(1, None, "b")).await;
    assert_eq!(reply.as_deref(), Some(replies::COMPLETION_FAILED));
    // Failed exchange keeps the user turn, adds no assistant turn
    assert_eq!(h.ctx.conversations.len(1), 4);
    let last = h.ctx.conversations.transcript(1).unwrap().pop().unwrap();
    assert_eq!(last.role, Role::User);

    h.backend.answer("two");
    dispatch(&h.ctx, &event(1, None, "c")).await;
    assert_eq!(h.ctx.conversations.len(1), 6);

    // Whole transcript goes out each time
    let calls = h.backend.calls.lock();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[2].messages.len(), 5);
    assert_eq!(calls[2].max_tokens, 150);
}

#[tokio::test]
async fn test_blank_answer_gets_apology() {
    let h = create_harness();

    h.backend.answer("  \n ");
    let reply = dispatch(&h.ctx, &event(1, None, "hello")).await;
    assert_eq!(reply.as_deref(), Some(replies::COMPLETION_FAILED));

    // Counted as a failed exchange: user turn only
    let transcript = h.ctx.conversations.transcript(1).unwrap();
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript[1], Turn::user("hello"));
}

#[tokio::test]
async fn test_reset_without_conversation() {
    let h = create_harness();
    let reply = dispatch(&h.ctx, &event(9, None, "/reset")).await;
    assert_eq!(reply.as_deref(), Some(replies::RESET_DONE));
}

#[tokio::test]
async fn test_stub_commands() {
    let h = create_harness();
    for text in ["/image", "/text a cat"] {
        let reply = dispatch(&h.ctx, &event(3, None, text)).await;
        assert_eq!(reply.as_deref(), Some(replies::NOT_IMPLEMENTED));
    }
    assert!(h.backend.calls.lock().is_empty());
    assert!(h.ctx.conversations.transcript(3).is_none());
}

#[tokio::test]
async fn test_unknown_command_is_silent() {
    let h = create_harness();
    let reply = dispatch(&h.ctx, &event(3, None, "/help")).await;
    assert!(reply.is_none());
    assert!(h.backend.calls.lock().is_empty());
    assert!(h.ctx.conversations.transcript(3).is_none());
}

#[tokio::test]
async fn test_commands_ignore_case() {
    let h = create_harness();

    let reply = dispatch(&h.ctx, &event(42, Some("alice"), "/START")).await;
    assert_eq!(reply.as_deref(), Some(replies::GREETING));
    assert!(h.ctx.registry.contains(42));

    let reply = dispatch(&h.ctx, &event(42, Some("alice"), "/Reset@Relay_Bot")).await;
    assert_eq!(reply.as_deref(), Some(replies::RESET_DONE));
}

#[tokio::test]
async fn test_commands_for_other_bots_are_ignored() {
    let h = create_harness();

    h.backend.answer("hi");
    dispatch(&h.ctx, &event(42, Some("alice"), "hello")).await;

    let reply = dispatch(&h.ctx, &event(42, Some("alice"), "/start@some_other_bot")).await;
    assert!(reply.is_none());
    assert!(!h.ctx.registry.contains(42));

    let reply = dispatch(&h.ctx, &event(42, Some("alice"), "/reset@some_other_bot")).await;
    assert!(reply.is_none());
    assert_eq!(h.ctx.conversations.len(42), 3);

    let reply = dispatch(&h.ctx, &event(42, Some("alice"), "/start@relay_bot")).await;
    assert_eq!(reply.as_deref(), Some(replies::GREETING));
}

#[tokio::test]
async fn test_admin_commands_reject_others() {
    let h = create_harness();
    dispatch(&h.ctx, &event(5, Some("eve"), "/start")).await;

    let reply = dispatch(&h.ctx, &event(5, Some("eve"), "/ss 42 hello there")).await;
    assert_eq!(reply.as_deref(), Some(replies::ADMIN_ONLY));

    let reply = dispatch(&h.ctx, &event(5, Some("eve"), "/ss22users")).await;
    assert_eq!(reply.as_deref(), Some(replies::ADMIN_ONLY));

    assert!(h.messenger.sent.lock().is_empty());
    assert_eq!(h.ctx.registry.len(), 1);
}

#[tokio::test]
async fn test_send_usage() {
    let h = create_harness();
    for text in ["/ss", "/ss 42"] {
        let reply = dispatch(&h.ctx, &event(ADMIN, None, text)).await;
        assert_eq!(reply.as_deref(), Some(replies::SEND_USAGE));
    }
    assert!(h.messenger.sent.lock().is_empty());
}

#[tokio::test]
async fn test_send_resolves_targets() {
    let h = create_harness();

    let reply = dispatch(&h.ctx, &event(ADMIN, None, "/ss 42 hello   there")).await;
    assert_eq!(reply.as_deref(), Some("Сообщение отправлено 42"));

    let reply = dispatch(&h.ctx, &event(ADMIN, None, "/ss alice ping")).await;
    assert_eq!(reply.as_deref(), Some("Сообщение отправлено alice"));

    let sent = h.messenger.sent.lock();
    assert_eq!(sent[0], (Target::Chat(42), "hello there".to_string()));
    assert_eq!(sent[1], (Target::Handle("@alice".into()), "ping".to_string()));
}

#[tokio::test]
async fn test_send_failure_names_target() {
    let h = create_harness();
    *h.messenger.reject.lock() = true;

    let reply = dispatch(&h.ctx, &event(ADMIN, None, "/ss ghost boo")).await;
    assert_eq!(reply.as_deref(), Some("Не удалось отправить сообщение ghost"));
}

#[tokio::test]
async fn test_list_users() {
    let h = create_harness();

    let reply = dispatch(&h.ctx, &event(ADMIN, None, "/ss22users")).await;
    assert_eq!(reply.as_deref(), Some(replies::NO_USERS));

    dispatch(&h.ctx, &event(42, Some("alice"), "/start")).await;
    dispatch(&h.ctx, &event(100, None, "/start")).await;

    // Registration order, not string order of the IDs
    let reply = dispatch(&h.ctx, &event(ADMIN, None, "/ss22users")).await.unwrap();
    let lines: Vec<&str> = reply.lines().collect();
    assert_eq!(
        lines,
        vec![
            "Пользователи:",
            "ID: 42, Username: @alice",
            "ID: 100, Username: @неизвестно"
        ]
    );
}

#[tokio::test]
async fn test_concurrent_messages_same_user_do_not_interleave() {
    let h = create_harness();
    let ctx = Arc::new(h.ctx);
    h.backend.answer("first answer");
    h.backend.answer("second answer");

    let a = {
        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move { dispatch(&ctx, &event(8, None, "q1")).await })
    };
    let b = {
        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move { dispatch(&ctx, &event(8, None, "q2")).await })
    };
    a.await.unwrap();
    b.await.unwrap();

    let roles: Vec<Role> = ctx
        .conversations
        .transcript(8)
        .unwrap()
        .iter()
        .map(|t| t.role)
        .collect();
    assert_eq!(
        roles,
        vec![Role::System, Role::User, Role::Assistant, Role::User, Role::Assistant]
    );
}
