//! relaybot - Entry Point

use relaybot::Config;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("relaybot v{}", env!("CARGO_PKG_VERSION"));
        println!();
        println!("Usage: relaybot [--help]");
        println!();
        println!("Environment variables:");
        println!("  TELEGRAM_TOKEN        Telegram bot token (required)");
        println!("  OPENROUTER_API_KEY    OpenRouter API key (required)");
        println!("  OPENROUTER_BASE_URL   API root (default: https://openrouter.ai/api/v1)");
        println!("  RELAYBOT_MODEL        Model identifier");
        println!("  RELAYBOT_MAX_TOKENS   Max reply tokens (default: 150)");
        println!("  RELAYBOT_USERS_FILE   Registered users file (default: users.json)");
        println!("  RELAYBOT_ADMIN_ID     Admin Telegram user ID");
        println!("  RUST_LOG              trace|debug|info|warn|error (default: info)");
        return Ok(());
    }

    let log_level = std::env::var("RUST_LOG")
        .map(|s| match s.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        })
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("relaybot v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    relaybot::telegram::run_bot(config).await?;

    Ok(())
}
