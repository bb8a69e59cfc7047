pub mod firebase;
pub mod sheets;
pub mod sqlite;

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{Config, StoreBackend};
use crate::google::{ServiceAccountAuth, FIREBASE_SCOPES, SHEETS_SCOPES};

use self::firebase::FirebaseWindow;
use self::sheets::SheetsWindow;
use self::sqlite::SqliteWindow;

/// A recent text message kept around for unsend lookups.
///
/// Field names on the wire match the documents already sitting in existing
/// Firebase trees. Older documents may lack `user_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub order: i64,
    #[serde(rename = "user_id", default)]
    pub sender_id: String,
    pub message_id: String,
    #[serde(rename = "message_text")]
    pub text: String,
}

/// Order value for the next entry: one past the newest, or 0 when empty.
pub fn next_order<'a>(entries: impl IntoIterator<Item = &'a StoredMessage>) -> i64 {
    entries
        .into_iter()
        .map(|m| m.order)
        .max()
        .map_or(0, |max| max + 1)
}

/// Fixed-capacity window of the most recent messages.
#[async_trait]
pub trait MessageWindow: Send + Sync {
    /// Maximum number of entries kept.
    fn capacity(&self) -> usize;

    /// Append a message, evicting the oldest once the window is full.
    async fn record(&self, sender_id: &str, message_id: &str, text: &str) -> Result<()>;

    /// Current entries, oldest first.
    async fn entries(&self) -> Result<Vec<StoredMessage>>;

    async fn find_by_message_id(&self, message_id: &str) -> Result<Option<StoredMessage>> {
        Ok(self
            .entries()
            .await?
            .into_iter()
            .find(|m| m.message_id == message_id))
    }
}

/// Build the configured window backend.
pub fn open_window(config: &Config, client: reqwest::Client) -> Result<Arc<dyn MessageWindow>> {
    let capacity = config.window.capacity;
    let window: Arc<dyn MessageWindow> = match config.store.backend {
        StoreBackend::Sqlite => Arc::new(SqliteWindow::open(&config.store.sqlite_path, capacity)?),
        StoreBackend::Firebase => {
            let fb = config
                .store
                .firebase
                .as_ref()
                .context("Missing [store.firebase] section")?;
            let auth =
                ServiceAccountAuth::from_file(&fb.credentials_path, FIREBASE_SCOPES, client.clone())?;
            Arc::new(FirebaseWindow::new(
                client,
                &fb.database_url,
                &fb.path,
                capacity,
                Arc::new(auth),
            ))
        }
        StoreBackend::Sheets => {
            let sh = config
                .store
                .sheets
                .as_ref()
                .context("Missing [store.sheets] section")?;
            let auth =
                ServiceAccountAuth::from_file(&sh.credentials_path, SHEETS_SCOPES, client.clone())?;
            Arc::new(SheetsWindow::new(
                client,
                &sh.api_base_url,
                &sh.spreadsheet_id,
                &sh.range,
                capacity,
                Arc::new(auth),
            ))
        }
    };

    info!(
        "Message window: {} backend, capacity {}",
        config.store.backend,
        window.capacity()
    );
    Ok(window)
}
