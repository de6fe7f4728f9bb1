mod airtable;
mod bot;
mod config;
mod photos;
mod platform;
mod webhook;

#[cfg(test)]
mod testutil;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::airtable::AirtableClient;
use crate::bot::AppState;
use crate::config::{Config, UpdateMode};
use crate::platform::telegram;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,photobot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if dotenvy::dotenv().is_ok() {
        info!("Loaded environment from .env");
    }

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Airtable table: {}", config.airtable.table_name);
    info!("  Update mode: {:?}", config.bot.update_mode);
    info!("  Delivery: {:?}", config.bot.delivery);
    info!("  Max photos: {}", config.bot.max_photos);

    let timeout = config.bot.http_timeout();
    let tg = telegram::create_bot(&config.telegram.bot_token, timeout)?;
    let username = telegram::fetch_username(&tg).await?;
    info!("Authorized as @{}", username);

    let airtable = AirtableClient::new(config.airtable.clone(), config.fields.clone(), timeout)?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let update_mode = config.bot.update_mode;
    let webhook_url = config.webhook_url();
    let register = config.telegram.register_webhook;

    let state = Arc::new(AppState::new(
        config,
        Arc::new(airtable),
        Arc::new(tg.clone()),
        username,
    ));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    info!("Listening on {}", addr);

    match update_mode {
        UpdateMode::Webhook => {
            match (register, webhook_url) {
                (true, Some(url)) => telegram::register_webhook(&tg, &url).await?,
                (true, None) => warn!("No public hostname configured, webhook not registered"),
                (false, _) => info!("Webhook registration disabled"),
            }

            let (submitter, worker) = webhook::submitter_for(&state);
            let served = webhook::serve(listener, webhook::router(state, submitter)).await;
            webhook::drain(worker).await;
            served?;
        }
        UpdateMode::Polling => {
            tokio::spawn(async move {
                if let Err(e) = webhook::serve(listener, webhook::liveness_router()).await {
                    warn!("Liveness server stopped: {:#}", e);
                }
            });
            telegram::run_polling(tg, state, timeout / 2).await?;
        }
    }

    info!("Bot stopped");
    Ok(())
}
