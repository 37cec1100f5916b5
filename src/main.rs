mod bot;
mod classifier;
mod config;
mod error;
mod escalation;
mod health;
mod llm;
mod prompt;
mod redact;
mod router;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bot::AppState;
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,spamwatch=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Failed to load configuration from environment")?;

    info!("Configuration loaded successfully");
    info!("  Admin chat: {}", config.admin_id);
    info!("  Monitored group: {}", config.group_id);
    info!("  Whitelisted ids: {}", config.whitelist.len());
    info!("  Model stack: {:?}", config.model_stack);

    // Liveness probe runs on its own task so a stalled classification
    // call never affects liveness reporting.
    let health_port = config.health_port;
    tokio::spawn(async move {
        if let Err(e) = health::serve(health_port).await {
            error!("Health check server failed: {:#}", e);
        }
    });

    let state = Arc::new(AppState::new(config));

    info!("Bot is starting...");
    bot::run(state).await?;

    Ok(())
}
