mod bot;
mod config;
mod dispatch;
mod filter;
mod google;
mod platform;
mod server;
mod store;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bot::BotContext;
use crate::config::Config;
use crate::platform::line::LineClient;
use crate::server::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Optional .env file
    dotenv::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,recallbot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Keyword: {}", config.bot.keyword);
    info!("  Window capacity: {}", config.window.capacity);
    info!("  Store backend: {}", config.store.backend);

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.line.timeout_secs))
        .build()
        .context("Failed to build HTTP client")?;

    let messenger = Arc::new(LineClient::new(config.line.clone(), http.clone()));
    let window = store::open_window(&config, http)?;
    let address = config.bind_address();

    let bot = BotContext::new(config, messenger, window)?;

    info!("Bot is starting...");
    server::run(AppState::new(bot), &address).await?;

    Ok(())
}
