use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::config::{AirtableConfig, FieldsConfig};

/// One photo ready to be sent: a caption and an absolute image URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoRecord {
    pub name: String,
    pub photo_url: String,
}

impl PhotoRecord {
    pub fn new(name: impl Into<String>, photo_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            photo_url: photo_url.into(),
        }
    }
}

/// Anything that can produce the photo list for a reply.
///
/// Implementations never fail: a broken source yields an empty list, so callers
/// cannot tell "no records" from "fetch failed".
#[async_trait]
pub trait PhotoSource: Send + Sync {
    async fn fetch_photos(&self) -> Vec<PhotoRecord>;
}

#[derive(Debug, Deserialize)]
struct ListRecordsResponse {
    #[serde(default)]
    records: Vec<RawRecord>,
    /// Present when more pages exist. Only the first page is ever read.
    #[serde(default)]
    offset: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    fields: Map<String, Value>,
}

/// Airtable "list records" client for a single table.
pub struct AirtableClient {
    client: reqwest::Client,
    config: AirtableConfig,
    fields: FieldsConfig,
}

impl AirtableClient {
    pub fn new(config: AirtableConfig, fields: FieldsConfig, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build Airtable HTTP client")?;
        Ok(Self {
            client,
            config,
            fields,
        })
    }

    fn table_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.config.api_url)
            .with_context(|| format!("Invalid Airtable API URL: {}", self.config.api_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Airtable API URL cannot be a base"))?
            .pop_if_empty()
            .push(&self.config.base_id)
            .push(&self.config.table_name);
        Ok(url)
    }

    async fn list_records(&self) -> Result<ListRecordsResponse> {
        let url = self.table_url()?;

        debug!("Fetching Airtable records from {}", url);

        let response = self
            .client
            .get(url)
            .header("Authorization", format!("Bearer {}", self.config.token))
            .header("Content-Type", "application/json")
            .send()
            .await
            .context("Failed to send request to Airtable")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("Airtable API error ({}): {}", status, error_body);
        }

        response
            .json()
            .await
            .context("Failed to parse Airtable response")
    }
}

#[async_trait]
impl PhotoSource for AirtableClient {
    async fn fetch_photos(&self) -> Vec<PhotoRecord> {
        let page = match self.list_records().await {
            Ok(page) => page,
            Err(e) => {
                error!("Airtable request failed: {:#}", e);
                return Vec::new();
            }
        };

        if page.offset.is_some() {
            warn!(
                "Airtable table '{}' has more than one page; only the first {} records are used",
                self.config.table_name,
                page.records.len()
            );
        }

        let total = page.records.len();
        let photos = parse_records(&page.records, &self.fields);
        debug!("Resolved {} photo(s) from {} record(s)", photos.len(), total);
        photos
    }
}

fn parse_records(records: &[RawRecord], keys: &FieldsConfig) -> Vec<PhotoRecord> {
    records
        .iter()
        .filter_map(|record| {
            let name = resolve_name(&record.fields, &keys.name);
            let photo_url = resolve_photo(&record.fields, &keys.photo);
            match (name, photo_url) {
                (Some(name), Some(photo_url)) => Some(PhotoRecord::new(name, photo_url)),
                _ => {
                    debug!(
                        "Skipping record {} without name or photo",
                        record.id.as_deref().unwrap_or("<no id>")
                    );
                    None
                }
            }
        })
        .collect()
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

fn resolve_name(fields: &Map<String, Value>, keys: &[String]) -> Option<String> {
    keys.iter()
        .filter_map(|key| fields.get(key))
        .find_map(|value| value.as_str().and_then(non_empty))
}

/// A photo field is either a bare URL or an attachment list, in which case
/// the first attachment's `url` is used.
fn resolve_photo(fields: &Map<String, Value>, keys: &[String]) -> Option<String> {
    keys.iter()
        .filter_map(|key| fields.get(key))
        .find_map(|value| match value {
            Value::String(url) => non_empty(url),
            Value::Array(attachments) => attachments
                .first()
                .and_then(|first| first.get("url"))
                .and_then(Value::as_str)
                .and_then(non_empty),
            _ => None,
        })
}
