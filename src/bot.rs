use std::sync::Arc;

use teloxide::types::{Update, UpdateKind};
use teloxide::utils::command::BotCommands;
use tracing::{debug, error, info};

use crate::airtable::PhotoSource;
use crate::config::Config;
use crate::photos;
use crate::platform::ReplySink;

/// Bot commands enum with descriptions
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Команды:")]
pub enum Command {
    #[command(description = "прислать фотографии из каталога")]
    Photos,
    #[command(description = "показать список команд")]
    Start,
    #[command(description = "показать список команд")]
    Help,
}

/// What the bot decided to do with a text message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Photos,
    Help,
}

/// Lifecycle end state of one update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Handled,
    /// Not a message, no text, or no matching command.
    Dropped,
    /// A reply could not be sent; already logged.
    Failed,
}

/// Shared application state, built once at startup.
pub struct AppState {
    pub config: Config,
    pub photos: Arc<dyn PhotoSource>,
    pub replies: Arc<dyn ReplySink>,
    pub bot_username: String,
}

impl AppState {
    pub fn new(
        config: Config,
        photos: Arc<dyn PhotoSource>,
        replies: Arc<dyn ReplySink>,
        bot_username: String,
    ) -> Self {
        Self {
            config,
            photos,
            replies,
            bot_username,
        }
    }
}

pub fn route_text(text: &str, bot_username: &str, reply_to_any_text: bool) -> Option<Action> {
    match Command::parse(text, bot_username) {
        Ok(Command::Photos) => Some(Action::Photos),
        Ok(Command::Start) | Ok(Command::Help) => Some(Action::Help),
        Err(_) if reply_to_any_text && !text.trim_start().starts_with('/') => Some(Action::Photos),
        Err(_) => None,
    }
}

/// Route one decoded update and run its handler to completion.
pub async fn handle_update(state: &AppState, update: Update) -> Outcome {
    let update_id = update.id.0;

    let msg = match update.kind {
        UpdateKind::Message(msg) => msg,
        _ => {
            debug!("Ignoring non-message update {}", update_id);
            return Outcome::Dropped;
        }
    };

    let text = match msg.text() {
        Some(t) => t,
        None => {
            debug!("Ignoring update {} without text", update_id);
            return Outcome::Dropped;
        }
    };

    let action = match route_text(text, &state.bot_username, state.config.bot.reply_to_any_text) {
        Some(action) => action,
        None => {
            debug!("No command matched update {}", update_id);
            return Outcome::Dropped;
        }
    };

    let chat_id = msg.chat.id;
    info!("Update {} from chat {}: {:?}", update_id, chat_id, action);

    match action {
        Action::Photos => {
            let mut records = state.photos.fetch_photos().await;
            let limit = state.config.bot.max_photos;
            if records.len() > limit {
                info!("Sending the first {} of {} photos", limit, records.len());
                records.truncate(limit);
            }
            photos::deliver_photos(state.replies.as_ref(), chat_id, &records).await;
            Outcome::Handled
        }
        Action::Help => {
            let help = Command::descriptions().to_string();
            match state.replies.send_text(chat_id, &help).await {
                Ok(()) => Outcome::Handled,
                Err(e) => {
                    error!("Failed to send help to {}: {:#}", chat_id, e);
                    Outcome::Failed
                }
            }
        }
    }
}
