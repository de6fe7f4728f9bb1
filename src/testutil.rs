//! Fakes shared by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use axum::Router;
use serde_json::{json, Value};
use teloxide::types::{ChatId, Update};

use crate::airtable::{PhotoRecord, PhotoSource};
use crate::bot::AppState;
use crate::config::Config;
use crate::platform::ReplySink;

pub const TEST_TOKEN: &str = "123:abc";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Photo {
        chat_id: i64,
        url: String,
        caption: String,
    },
    Text {
        chat_id: i64,
        text: String,
    },
}

impl Sent {
    pub fn photo(chat_id: i64, url: &str, caption: &str) -> Self {
        Sent::Photo {
            chat_id,
            url: url.to_string(),
            caption: caption.to_string(),
        }
    }

    pub fn text(chat_id: i64, text: &str) -> Self {
        Sent::Text {
            chat_id,
            text: text.to_string(),
        }
    }
}

/// Records successful sends; photos whose URL is in `fail_urls` are rejected.
#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<Sent>>,
    fail_urls: Vec<String>,
}

impl RecordingSink {
    pub fn failing_on(urls: &[&str]) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_urls: urls.iter().map(|u| u.to_string()).collect(),
        }
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReplySink for RecordingSink {
    async fn send_photo(&self, chat_id: ChatId, photo_url: &str, caption: &str) -> Result<()> {
        if self.fail_urls.iter().any(|u| u == photo_url) {
            anyhow::bail!("Bad Request: wrong file identifier/HTTP URL specified");
        }
        self.sent
            .lock()
            .unwrap()
            .push(Sent::photo(chat_id.0, photo_url, caption));
        Ok(())
    }

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<()> {
        self.sent.lock().unwrap().push(Sent::text(chat_id.0, text));
        Ok(())
    }
}

/// Fixed photo list that counts how often it was asked.
#[derive(Default)]
pub struct StaticSource {
    photos: Vec<PhotoRecord>,
    calls: AtomicUsize,
}

impl StaticSource {
    pub fn new(photos: Vec<PhotoRecord>) -> Self {
        Self {
            photos,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PhotoSource for StaticSource {
    async fn fetch_photos(&self) -> Vec<PhotoRecord> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.photos.clone()
    }
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.telegram.bot_token = TEST_TOKEN.to_string();
    config.airtable.token = "pat-test".to_string();
    config.airtable.base_id = "appTest".to_string();
    config
}

pub fn test_state(
    config: Config,
    photos: Arc<StaticSource>,
    replies: Arc<RecordingSink>,
) -> Arc<AppState> {
    Arc::new(AppState::new(config, photos, replies, "photo_bot".to_string()))
}

/// Telegram update envelope carrying a private text message.
pub fn text_update(update_id: u32, chat_id: i64, text: &str) -> Value {
    json!({
        "update_id": update_id,
        "message": {
            "message_id": update_id,
            "date": 1700000000,
            "chat": {"id": chat_id, "type": "private", "first_name": "Tester"},
            "from": {"id": chat_id, "is_bot": false, "first_name": "Tester"},
            "text": text
        }
    })
}

/// Decode an envelope the way the webhook does: from raw bytes.
pub fn decode_update(envelope: &Value) -> Update {
    serde_json::from_slice(envelope.to_string().as_bytes()).unwrap()
}

/// Serve `app` on an ephemeral local port and return its base URL.
pub async fn spawn_server(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}
