pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;
use teloxide::types::ChatId;

/// Outbound side of the messaging platform: everything the bot says goes through here.
#[async_trait]
pub trait ReplySink: Send + Sync {
    /// Send a photo by URL with the given caption.
    async fn send_photo(&self, chat_id: ChatId, photo_url: &str, caption: &str) -> Result<()>;

    /// Send a plain text message.
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<()>;
}
