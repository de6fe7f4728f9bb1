use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Url;
use teloxide::prelude::*;
use teloxide::types::InputFile;
use teloxide::update_listeners::Polling;
use tracing::info;

use crate::bot::{self, AppState};
use crate::platform::ReplySink;

/// Creates a Bot whose HTTP client gives up after `timeout`.
pub fn create_bot(token: &str, timeout: Duration) -> Result<Bot> {
    let client = teloxide::net::default_reqwest_settings()
        .timeout(timeout)
        .build()
        .context("Failed to build Telegram HTTP client")?;
    Ok(Bot::with_client(token, client))
}

/// Username used to accept `/command@username` addressed to this bot.
pub async fn fetch_username(bot: &Bot) -> Result<String> {
    let me = bot.get_me().await.context("Failed to call getMe")?;
    Ok(me.user.username.clone().unwrap_or_default())
}

#[async_trait]
impl ReplySink for Bot {
    async fn send_photo(&self, chat_id: ChatId, photo_url: &str, caption: &str) -> Result<()> {
        let url = Url::parse(photo_url)
            .with_context(|| format!("Invalid photo URL: {}", photo_url))?;
        Requester::send_photo(self, chat_id, InputFile::url(url))
            .caption(caption)
            .await
            .context("Telegram rejected sendPhoto")?;
        Ok(())
    }

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<()> {
        self.send_message(chat_id, text)
            .await
            .context("Telegram rejected sendMessage")?;
        Ok(())
    }
}

/// Point Telegram at `webhook_url`, unless it already is.
///
/// Run once at startup; the serving loop never touches registration.
pub async fn register_webhook(bot: &Bot, webhook_url: &str) -> Result<()> {
    let url = Url::parse(webhook_url).context("Invalid webhook URL")?;
    let host = url.host_str().unwrap_or_default().to_string();

    let current = bot
        .get_webhook_info()
        .await
        .context("Failed to call getWebhookInfo")?;

    if current.url.as_ref() == Some(&url) {
        info!("Webhook already registered for {}", host);
        return Ok(());
    }

    bot.set_webhook(url)
        .await
        .context("Failed to call setWebhook")?;
    info!("Webhook registered for {}", host);
    Ok(())
}

/// Run the bot with long polling instead of a webhook.
pub async fn run_polling(bot: Bot, state: Arc<AppState>, poll_timeout: Duration) -> Result<()> {
    info!("Starting Telegram long polling...");

    let listener = Polling::builder(bot.clone())
        .timeout(poll_timeout)
        .delete_webhook()
        .await
        .build();

    let handler = dptree::entry().endpoint(on_update);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .error_handler(LoggingErrorHandler::with_custom_text("telegram"))
        .enable_ctrlc_handler()
        .build()
        .dispatch_with_listener(
            listener,
            LoggingErrorHandler::with_custom_text("Error from update listener"),
        )
        .await;

    Ok(())
}

async fn on_update(update: Update, state: Arc<AppState>) -> ResponseResult<()> {
    bot::handle_update(&state, update).await;
    Ok(())
}
