use anyhow::Result;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use super::types::{is_lock_message, DatabaseError};
use crate::config::Config;
use crate::events::TimelineEvent;

// ============================================================================
// Database
// ============================================================================

/// Owner of the connection pool shared by every timeline.
///
/// Cloning is cheap: clones share the pool, the configuration and the event
/// sender.
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
    pub(crate) config: Arc<Config>,
    pub(crate) events: Option<mpsc::Sender<TimelineEvent>>,
}

impl Database {
    /// Open a database at `path` with default configuration and run migrations
    ///
    /// `":memory:"` opens a private in-memory database shared by the pool's
    /// connections.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::InstanceLocked` if another process holds the
    /// database (SQLITE_BUSY, SQLITE_LOCKED, SQLITE_CANTOPEN).
    /// Returns `DatabaseError::Other` for other database errors.
    pub async fn open(path: &str) -> Result<Self, DatabaseError> {
        let config = Config {
            database_path: path.to_string(),
            ..Config::default()
        };
        Self::connect(config).await
    }

    /// Open the database named by `config.database_path`, sized and tuned by
    /// the pool settings in `config`.
    pub async fn connect(config: Config) -> Result<Self, DatabaseError> {
        let url = format!("sqlite:{}?mode=rwc", config.database_path);

        // busy_timeout: SQLite waits this long for a competing writer before
        // returning SQLITE_BUSY. Set as a pragma so every pooled connection
        // inherits it.
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(DatabaseError::from_sqlx)?
            .pragma("busy_timeout", config.busy_timeout_ms.to_string());
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect_with(options)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        tracing::debug!(
            path = %config.database_path,
            max_connections = config.max_connections,
            "Opened timeline database"
        );

        Self::from_pool(pool, config).await
    }

    /// Wrap an existing pool and run migrations on it.
    ///
    /// The pool stays owned by the caller's handle as well; this is the seam
    /// for embedding processes that already manage a `SqlitePool`.
    pub async fn from_pool(pool: SqlitePool, config: Config) -> Result<Self, DatabaseError> {
        let db = Self {
            pool,
            config: Arc::new(config),
            events: None,
        };
        db.migrate().await.map_err(|e| {
            // Migration errors could also be lock-related
            if is_lock_message(&e.to_string()) {
                DatabaseError::InstanceLocked
            } else {
                DatabaseError::Migration(e.to_string())
            }
        })?;
        Ok(db)
    }

    /// Publish `TimelineEvent`s on `tx` after successful writes.
    pub fn with_events(mut self, tx: mpsc::Sender<TimelineEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Close every pooled connection. Outstanding timelines fail afterwards.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Run database migrations atomically within a transaction.
    ///
    /// All statements use `IF NOT EXISTS`, so re-running on an existing
    /// database is a no-op.
    async fn migrate(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // Record store, keyed by item reference (`item:<id>`)
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS items (
                key TEXT PRIMARY KEY,
                id TEXT NOT NULL,
                published TEXT NOT NULL,
                read INTEGER NOT NULL DEFAULT 0,
                data TEXT NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // Per-channel ordered index. `seq` only grows and is kept when an
        // entry is re-scored, so it orders entries sharing a score by first
        // insertion.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS timeline_entries (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                channel TEXT NOT NULL,
                item_key TEXT NOT NULL,
                score INTEGER NOT NULL,
                UNIQUE(channel, item_key)
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // Range scans for pagination: WHERE channel = ? AND score BETWEEN .. ORDER BY score, seq
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_timeline_entries_channel_score ON timeline_entries(channel, score, seq)",
        )
        .execute(&mut *tx)
        .await?;

        // Lookups by reference alone (consistency checks)
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_timeline_entries_item ON timeline_entries(item_key)",
        )
        .execute(&mut *tx)
        .await?;

        // Per-channel read-set
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS channel_read (
                channel TEXT NOT NULL,
                item_key TEXT NOT NULL,
                PRIMARY KEY (channel, item_key)
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_channel_read_item ON channel_read(item_key)")
            .execute(&mut *tx)
            .await?;

        // Committed backend choice per channel
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS channels (
                name TEXT PRIMARY KEY,
                timeline TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_in_memory() {
        let db = Database::open(":memory:").await.unwrap();
        assert_eq!(db.config().database_path, ":memory:");
        assert!(db.events.is_none());
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let db = Database::open(":memory:").await.unwrap();
        db.migrate().await.unwrap();
        db.migrate().await.unwrap();

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name IN ('items', 'timeline_entries', 'channel_read', 'channels') ORDER BY name",
        )
        .fetch_all(&db.pool)
        .await
        .unwrap();
        let names: Vec<&str> = tables.iter().map(|(n,)| n.as_str()).collect();
        assert_eq!(names, ["channel_read", "channels", "items", "timeline_entries"]);
    }

    #[tokio::test]
    async fn test_from_pool_shares_pool() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let db = Database::from_pool(pool.clone(), Config::default())
            .await
            .unwrap();

        sqlx::query("INSERT INTO channels (name, timeline) VALUES ('home', 'stream')")
            .execute(&pool)
            .await
            .unwrap();
        let row: (String,) = sqlx::query_as("SELECT timeline FROM channels WHERE name = 'home'")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(row.0, "stream");
    }

    #[tokio::test]
    async fn test_open_file_database() {
        let dir =
            std::env::temp_dir().join(format!("feedline_schema_file_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("timeline.db");
        let _ = std::fs::remove_file(&path);

        let db = Database::open(path.to_str().unwrap()).await.unwrap();
        db.close().await;
        assert!(path.exists());

        std::fs::remove_dir_all(&dir).ok();
    }
}
