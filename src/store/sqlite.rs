use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{MessageWindow, StoredMessage};

/// Local SQLite window. Count, insert and evict share one transaction.
#[derive(Clone)]
pub struct SqliteWindow {
    conn: Arc<Mutex<Connection>>,
    capacity: usize,
}

impl SqliteWindow {
    /// Open or create the SQLite database at the given path.
    pub fn open(path: &Path, capacity: usize) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        // journal_mode PRAGMA always returns the resulting mode, so use query_row
        let _: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;

        Self::run_migrations(&conn)?;

        info!("Message window store initialized at: {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            capacity,
        })
    }

    /// Open an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory(capacity: usize) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            capacity,
        })
    }

    fn run_migrations(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS message_window (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                ord INTEGER NOT NULL,
                sender_id TEXT NOT NULL,
                message_id TEXT NOT NULL,
                text TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_message_window_message_id
                ON message_window(message_id);
            ",
        )
        .context("Failed to run migrations")?;
        Ok(())
    }
}

#[async_trait]
impl MessageWindow for SqliteWindow {
    fn capacity(&self) -> usize {
        self.capacity
    }

    async fn record(&self, sender_id: &str, message_id: &str, text: &str) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let count: i64 = tx.query_row("SELECT count(*) FROM message_window", [], |row| {
            row.get(0)
        })?;
        let order: i64 = tx.query_row(
            "SELECT coalesce(max(ord) + 1, 0) FROM message_window",
            [],
            |row| row.get(0),
        )?;

        tx.execute(
            "INSERT INTO message_window (ord, sender_id, message_id, text)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![order, sender_id, message_id, text],
        )
        .context("Failed to record message")?;

        // Normally exactly one row; more if capacity was lowered since the last run.
        let overflow = count + 1 - self.capacity as i64;
        if overflow > 0 {
            let evicted = tx.execute(
                "DELETE FROM message_window WHERE seq IN (
                    SELECT seq FROM message_window ORDER BY seq ASC LIMIT ?1
                )",
                rusqlite::params![overflow],
            )?;
            debug!("Evicted {} message(s) from the window", evicted);
        }

        tx.commit().context("Failed to commit message window")?;
        Ok(())
    }

    async fn entries(&self) -> Result<Vec<StoredMessage>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT ord, sender_id, message_id, text
             FROM message_window
             ORDER BY seq ASC",
        )?;

        let messages = stmt
            .query_map([], |row| {
                Ok(StoredMessage {
                    order: row.get(0)?,
                    sender_id: row.get(1)?,
                    message_id: row.get(2)?,
                    text: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to load message window")?;

        Ok(messages)
    }
}
