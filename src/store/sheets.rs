//! Message window kept in a Google Sheets range, one row per message:
//! `order | sender_id | message_id | text`.
//!
//! A full range is cleared before the next append instead of evicting a
//! single row.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use super::{next_order, MessageWindow, StoredMessage};
use crate::google::TokenSource;

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

fn cell_text(row: &[Value], index: usize) -> String {
    match row.get(index) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn cell_order(row: &[Value], index: usize) -> i64 {
    match row.get(index) {
        Some(Value::Number(n)) => n.as_i64().unwrap_or_default(),
        Some(Value::String(s)) => s.trim().parse().unwrap_or_default(),
        _ => 0,
    }
}

fn row_to_message(row: &[Value]) -> StoredMessage {
    StoredMessage {
        order: cell_order(row, 0),
        sender_id: cell_text(row, 1),
        message_id: cell_text(row, 2),
        text: cell_text(row, 3),
    }
}

pub struct SheetsWindow {
    client: reqwest::Client,
    api_base_url: String,
    spreadsheet_id: String,
    range: String,
    capacity: usize,
    auth: Arc<dyn TokenSource>,
}

impl SheetsWindow {
    pub fn new(
        client: reqwest::Client,
        api_base_url: &str,
        spreadsheet_id: &str,
        range: &str,
        capacity: usize,
        auth: Arc<dyn TokenSource>,
    ) -> Self {
        Self {
            client,
            api_base_url: api_base_url.to_string(),
            spreadsheet_id: spreadsheet_id.to_string(),
            range: range.to_string(),
            capacity,
            auth,
        }
    }

    /// `{base}/v4/spreadsheets/{id}/values/{range}{suffix}` with the range escaped.
    fn url(&self, suffix: &str) -> Result<Url> {
        let mut url = Url::parse(&self.api_base_url)
            .with_context(|| format!("Invalid Sheets API URL: {}", self.api_base_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("Sheets API URL cannot be a base: {}", self.api_base_url))?
            .pop_if_empty()
            .extend([
                "v4",
                "spreadsheets",
                self.spreadsheet_id.as_str(),
                "values",
                format!("{}{}", self.range, suffix).as_str(),
            ]);
        Ok(url)
    }

    async fn send(&self, request: reqwest::RequestBuilder, what: &str) -> Result<reqwest::Response> {
        let token = self.auth.access_token().await?;
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .with_context(|| format!("Failed to {} in Google Sheets", what))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "Google Sheets error while trying to {} ({}): {}",
                what,
                status,
                error_body
            );
        }
        Ok(response)
    }

    async fn read_rows(&self) -> Result<Vec<Vec<Value>>> {
        let response = self
            .send(self.client.get(self.url("")?), "read rows")
            .await?;
        let range: ValueRange = response
            .json()
            .await
            .context("Failed to parse Sheets value range")?;
        Ok(range.values)
    }

    async fn read_messages(&self) -> Result<Vec<StoredMessage>> {
        Ok(self
            .read_rows()
            .await?
            .iter()
            .filter(|row| !row.is_empty())
            .map(|row| row_to_message(row))
            .collect())
    }

    async fn clear(&self) -> Result<()> {
        self.send(
            self.client
                .post(self.url(":clear")?)
                .json(&serde_json::json!({})),
            "clear range",
        )
        .await?;
        Ok(())
    }

    async fn append(&self, message: &StoredMessage) -> Result<()> {
        let body = serde_json::json!({
            "values": [[
                message.order,
                message.sender_id,
                message.message_id,
                message.text,
            ]]
        });
        let request = self
            .client
            .post(self.url(":append")?)
            .query(&[("valueInputOption", "RAW"), ("insertDataOption", "INSERT_ROWS")])
            .json(&body);
        self.send(request, "append row").await?;
        Ok(())
    }
}

#[async_trait]
impl MessageWindow for SheetsWindow {
    fn capacity(&self) -> usize {
        self.capacity
    }

    async fn record(&self, sender_id: &str, message_id: &str, text: &str) -> Result<()> {
        let mut current = self.read_messages().await?;

        if current.len() >= self.capacity {
            self.clear().await?;
            info!(
                "Cleared {} after reaching {} rows",
                self.range,
                current.len()
            );
            current.clear();
        }

        let message = StoredMessage {
            order: next_order(&current),
            sender_id: sender_id.to_string(),
            message_id: message_id.to_string(),
            text: text.to_string(),
        };
        self.append(&message).await?;
        debug!("Appended message {} to {}", message_id, self.range);
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<StoredMessage>> {
        self.read_messages().await
    }
}
