use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// How updates reach the bot.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UpdateMode {
    #[default]
    Webhook,
    Polling,
}

/// How the webhook endpoint hands a decoded update to the dispatcher.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Acknowledge immediately, process on the worker task.
    #[default]
    Queue,
    /// Process within the request before acknowledging.
    Inline,
}

impl std::str::FromStr for UpdateMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "webhook" => Ok(UpdateMode::Webhook),
            "polling" => Ok(UpdateMode::Polling),
            other => anyhow::bail!("Unknown update mode '{}' (expected webhook or polling)", other),
        }
    }
}

impl std::str::FromStr for DeliveryMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "queue" => Ok(DeliveryMode::Queue),
            "inline" => Ok(DeliveryMode::Inline),
            other => anyhow::bail!("Unknown delivery mode '{}' (expected queue or inline)", other),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub airtable: AirtableConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub fields: FieldsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    /// Externally routable hostname used to build the webhook URL.
    #[serde(default)]
    pub public_hostname: Option<String>,
    #[serde(default = "default_true")]
    pub register_webhook: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AirtableConfig {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub base_id: String,
    #[serde(default = "default_table_name")]
    pub table_name: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BotConfig {
    /// Upper bound on photos sent for one command.
    #[serde(default = "default_max_photos")]
    pub max_photos: usize,
    /// Treat every plain text message as a photos request.
    #[serde(default)]
    pub reply_to_any_text: bool,
    #[serde(default)]
    pub update_mode: UpdateMode,
    #[serde(default)]
    pub delivery: DeliveryMode,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

/// Ordered candidate keys for each logical record field. Earlier keys win.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct FieldsConfig {
    #[serde(default = "default_name_keys")]
    pub name: Vec<String>,
    #[serde(default = "default_photo_keys")]
    pub photo: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_table_name() -> String {
    "Photos".to_string()
}

fn default_api_url() -> String {
    "https://api.airtable.com/v0".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    10000
}

fn default_max_photos() -> usize {
    10
}

fn default_queue_capacity() -> usize {
    100
}

fn default_http_timeout_secs() -> u64 {
    10
}

fn default_name_keys() -> Vec<String> {
    vec!["Name".to_string(), "Название".to_string()]
}

fn default_photo_keys() -> Vec<String> {
    ["Photo URL", "Photo", "Photos", "Фото", "Attachments"]
        .iter()
        .map(|k| k.to_string())
        .collect()
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            public_hostname: None,
            register_webhook: default_true(),
        }
    }
}

impl Default for AirtableConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            base_id: String::new(),
            table_name: default_table_name(),
            api_url: default_api_url(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            max_photos: default_max_photos(),
            reply_to_any_text: false,
            update_mode: UpdateMode::default(),
            delivery: DeliveryMode::default(),
            queue_capacity: default_queue_capacity(),
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

impl Default for FieldsConfig {
    fn default() -> Self {
        Self {
            name: default_name_keys(),
            photo: default_photo_keys(),
        }
    }
}

impl BotConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

impl Config {
    /// Load the optional TOML file, apply process environment overrides and validate.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::parse(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Config::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid TOML")
    }

    /// Override file values with environment variables read through `lookup`.
    /// Blank values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("BOT_TOKEN") {
            self.telegram.bot_token = v;
        }
        if let Some(v) = get("RENDER_EXTERNAL_HOSTNAME") {
            self.telegram.public_hostname = Some(v);
        }
        if let Some(v) = get("AIRTABLE_TOKEN") {
            self.airtable.token = v;
        }
        if let Some(v) = get("BASE_ID") {
            self.airtable.base_id = v;
        }
        if let Some(v) = get("TABLE_NAME") {
            self.airtable.table_name = v;
        }
        if let Some(v) = get("PORT") {
            self.server.port = v
                .trim()
                .parse()
                .with_context(|| format!("PORT must be a port number, got '{}'", v))?;
        }
        if let Some(v) = get("MAX_PHOTOS") {
            self.bot.max_photos = v
                .trim()
                .parse()
                .with_context(|| format!("MAX_PHOTOS must be a positive integer, got '{}'", v))?;
        }
        if let Some(v) = get("UPDATE_MODE") {
            self.bot.update_mode = v.parse()?;
        }
        if let Some(v) = get("DELIVERY_MODE") {
            self.bot.delivery = v.parse()?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            anyhow::bail!("Missing Telegram bot token (set BOT_TOKEN)");
        }
        if self.airtable.token.trim().is_empty() {
            anyhow::bail!("Missing Airtable token (set AIRTABLE_TOKEN)");
        }
        if self.airtable.base_id.trim().is_empty() {
            anyhow::bail!("Missing Airtable base id (set BASE_ID)");
        }
        if self.airtable.table_name.trim().is_empty() {
            anyhow::bail!("Airtable table name must not be empty");
        }
        if self.bot.max_photos == 0 {
            anyhow::bail!("max_photos must be at least 1");
        }
        if self.bot.http_timeout_secs == 0 {
            anyhow::bail!("http_timeout_secs must be at least 1");
        }
        if self.bot.queue_capacity == 0 {
            anyhow::bail!("queue_capacity must be at least 1");
        }
        if self.fields.name.is_empty() || self.fields.photo.is_empty() {
            anyhow::bail!("Field candidate lists must not be empty");
        }
        Ok(())
    }

    /// Public webhook URL, if a hostname is configured.
    pub fn webhook_url(&self) -> Option<String> {
        self.telegram
            .public_hostname
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(|host| {
                let host = host
                    .trim_start_matches("https://")
                    .trim_start_matches("http://")
                    .trim_end_matches('/');
                format!("https://{}/{}", host, self.telegram.bot_token)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn configured() -> Config {
        let vars = env(&[
            ("BOT_TOKEN", "123:abc"),
            ("AIRTABLE_TOKEN", "pat-xyz"),
            ("BASE_ID", "appBase"),
        ]);
        let mut config = Config::default();
        config.apply_env(|k| vars.get(k).cloned()).unwrap();
        config
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.airtable.table_name, "Photos");
        assert_eq!(config.server.port, 10000);
        assert_eq!(config.bot.max_photos, 10);
        assert_eq!(config.bot.update_mode, UpdateMode::Webhook);
        assert_eq!(config.bot.delivery, DeliveryMode::Queue);
        assert_eq!(config.bot.http_timeout(), Duration::from_secs(10));
        assert_eq!(config.fields.name, vec!["Name", "Название"]);
        assert_eq!(config.fields.photo[0], "Photo URL");
        assert_eq!(config.fields.photo[4], "Attachments");
    }

    #[test]
    fn test_env_overrides() {
        let vars = env(&[
            ("BOT_TOKEN", "123:abc"),
            ("AIRTABLE_TOKEN", "pat-xyz"),
            ("BASE_ID", "appBase"),
            ("TABLE_NAME", "Catalog"),
            ("PORT", "8080"),
            ("DELIVERY_MODE", "inline"),
            ("UPDATE_MODE", "Polling"),
            ("MAX_PHOTOS", "3"),
        ]);
        let mut config = Config::default();
        config.apply_env(|k| vars.get(k).cloned()).unwrap();
        config.validate().unwrap();

        assert_eq!(config.telegram.bot_token, "123:abc");
        assert_eq!(config.airtable.table_name, "Catalog");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.bot.delivery, DeliveryMode::Inline);
        assert_eq!(config.bot.update_mode, UpdateMode::Polling);
        assert_eq!(config.bot.max_photos, 3);
    }

    #[test]
    fn test_blank_env_does_not_override_file() {
        let mut config = Config::parse("[airtable]\ntable_name = \"Gallery\"\n").unwrap();
        let vars = env(&[("TABLE_NAME", "  ")]);
        config.apply_env(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(config.airtable.table_name, "Gallery");
    }

    #[test]
    fn test_missing_credentials_rejected() {
        let err = Config::default().validate().unwrap_err();
        assert!(err.to_string().contains("BOT_TOKEN"));

        let mut config = configured();
        config.airtable.base_id.clear();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("BASE_ID"));
    }

    #[test]
    fn test_invalid_numbers_rejected() {
        let vars = env(&[("PORT", "ten thousand")]);
        let mut config = Config::default();
        assert!(config.apply_env(|k| vars.get(k).cloned()).is_err());

        let mut config = configured();
        config.bot.max_photos = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = configured();
        config.bot.http_timeout_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("http_timeout_secs"));
    }

    #[test]
    fn test_unknown_delivery_mode_rejected() {
        let vars = env(&[("DELIVERY_MODE", "carrier-pigeon")]);
        let mut config = Config::default();
        assert!(config.apply_env(|k| vars.get(k).cloned()).is_err());
    }

    #[test]
    fn test_toml_field_candidates() {
        let config = Config::parse(
            r#"
[fields]
name = ["Название", "Name"]
photo = ["Фото"]

[bot]
reply_to_any_text = true
delivery = "inline"
"#,
        )
        .unwrap();
        assert_eq!(config.fields.name, vec!["Название", "Name"]);
        assert_eq!(config.fields.photo, vec!["Фото"]);
        assert!(config.bot.reply_to_any_text);
        assert_eq!(config.bot.delivery, DeliveryMode::Inline);
        assert_eq!(config.bot.max_photos, 10);
    }

    #[test]
    fn test_webhook_url() {
        let mut config = configured();
        assert_eq!(config.webhook_url(), None);

        config.telegram.public_hostname = Some("https://bot.example.com/".to_string());
        assert_eq!(
            config.webhook_url().as_deref(),
            Some("https://bot.example.com/123:abc")
        );
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let parsed = Config::parse("").unwrap();
        assert_eq!(parsed.server.port, 10000);
        assert!(parsed.telegram.register_webhook);
    }
}
