use futures::TryStreamExt;
use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{item_key, ChannelExport, IndexEntry, Item, StoredRecord, TimelineError};

/// Rows per multi-row INSERT. 4 columns * 50 stays well under SQLite's
/// 999 parameter limit.
const BATCH_SIZE: usize = 50;

impl Database {
    // ========================================================================
    // Channel Export / Import
    // ========================================================================

    /// Snapshot a channel: its index in timeline order, the records it
    /// references (indexed or read), and its read-set.
    ///
    /// Every record must decode as an item; a corrupt record fails the export
    /// with `TimelineError::Decode` rather than producing a lossy snapshot.
    pub async fn export_channel(&self, channel: &str) -> Result<ChannelExport, TimelineError> {
        let mut conn = self.pool.acquire().await?;

        let entries: Vec<IndexEntry> = sqlx::query_as(
            "SELECT item_key, score FROM timeline_entries WHERE channel = ? ORDER BY score ASC, seq ASC",
        )
        .bind(channel)
        .fetch_all(&mut *conn)
        .await?;

        let read: Vec<(String,)> =
            sqlx::query_as("SELECT item_key FROM channel_read WHERE channel = ? ORDER BY item_key")
                .bind(channel)
                .fetch_all(&mut *conn)
                .await?;

        let mut records = Vec::new();
        let mut rows = sqlx::query_as::<_, StoredRecord>(
            r#"
            SELECT id, published, read, data FROM items
            WHERE key IN (
                SELECT item_key FROM timeline_entries WHERE channel = ?
                UNION
                SELECT item_key FROM channel_read WHERE channel = ?
            )
            ORDER BY key
        "#,
        )
        .bind(channel)
        .bind(channel)
        .fetch(&mut *conn);

        while let Some(record) = rows.try_next().await? {
            if let Err(source) = serde_json::from_str::<Item>(&record.data) {
                return Err(TimelineError::Decode {
                    key: item_key(&record.id),
                    source,
                });
            }
            records.push(record);
        }

        tracing::debug!(
            channel = %channel,
            entries = entries.len(),
            records = records.len(),
            read = read.len(),
            "Exported channel"
        );

        Ok(ChannelExport {
            channel: channel.to_string(),
            entries,
            records,
            read: read.into_iter().map(|(key,)| key).collect(),
        })
    }

    /// Load a snapshot produced by [`Database::export_channel`] in one
    /// transaction.
    ///
    /// Records and entries are upserted, so importing twice is harmless.
    /// Entries are inserted in snapshot order, which preserves the order of
    /// equal scores.
    pub async fn import_channel(&self, export: &ChannelExport) -> Result<(), TimelineError> {
        let mut tx = self.pool.begin().await?;

        for chunk in export.records.chunks(BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> =
                QueryBuilder::new("INSERT INTO items (key, id, published, read, data) ");
            builder.push_values(chunk, |mut b, record| {
                b.push_bind(item_key(&record.id))
                    .push_bind(&record.id)
                    .push_bind(&record.published)
                    .push_bind(record.read)
                    .push_bind(&record.data);
            });
            builder.push(
                " ON CONFLICT(key) DO UPDATE SET \
                 id = excluded.id, published = excluded.published, \
                 read = excluded.read, data = excluded.data",
            );
            builder.build().execute(&mut *tx).await?;
        }

        for chunk in export.entries.chunks(BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> =
                QueryBuilder::new("INSERT INTO timeline_entries (channel, item_key, score) ");
            builder.push_values(chunk, |mut b, entry| {
                b.push_bind(&export.channel)
                    .push_bind(&entry.item_key)
                    .push_bind(entry.score);
            });
            builder.push(" ON CONFLICT(channel, item_key) DO UPDATE SET score = excluded.score");
            builder.build().execute(&mut *tx).await?;
        }

        for chunk in export.read.chunks(BATCH_SIZE) {
            let mut builder: QueryBuilder<sqlx::Sqlite> =
                QueryBuilder::new("INSERT OR IGNORE INTO channel_read (channel, item_key) ");
            builder.push_values(chunk, |mut b, key| {
                b.push_bind(&export.channel).push_bind(key);
            });
            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;

        tracing::info!(
            channel = %export.channel,
            entries = export.entries.len(),
            records = export.records.len(),
            read = export.read.len(),
            "Imported channel"
        );
        Ok(())
    }
}
