use sqlx::{QueryBuilder, SqlitePool};
use tokio::sync::mpsc;

use super::cursor::{next_paging, now_published, parse_bound, score_for, Bound, PAGE_SIZE};
use super::TimelineBackend;
use crate::events::TimelineEvent;
use crate::storage::{item_key, Item, TimelineError, TimelinePage};

/// Row of a page query: reference, score, insertion sequence, and the
/// backing record if any
type PageRow = (String, i64, i64, Option<String>, Option<bool>);

/// Timeline backed by a score-ordered index per channel.
///
/// The index (`timeline_entries`) is authoritative for ordering, the record
/// store (`items`) for content. Every operation holds one pooled connection or
/// transaction for its duration; it is returned to the pool on drop, and an
/// uncommitted transaction rolls back.
#[derive(Debug, Clone)]
pub struct SortedSetTimeline {
    pool: SqlitePool,
    channel: String,
    force_unread: bool,
    events: Option<mpsc::Sender<TimelineEvent>>,
}

impl SortedSetTimeline {
    pub(crate) fn new(
        pool: SqlitePool,
        channel: &str,
        force_unread: bool,
        events: Option<mpsc::Sender<TimelineEvent>>,
    ) -> Self {
        Self {
            pool,
            channel: channel.to_string(),
            force_unread,
            events,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    fn notify(&self, event: TimelineEvent) {
        let Some(tx) = &self.events else {
            return;
        };
        if let Err(e) = tx.try_send(event) {
            tracing::warn!(channel = %self.channel, error = %e, "Dropped timeline event");
        }
    }
}

/// Append `AND e.score <op> bound`, narrowed to the sequence within the
/// bound's score group when it has one.
fn push_bound(builder: &mut QueryBuilder<'_, sqlx::Sqlite>, bound: Bound, op: &str) {
    builder.push(format!(" AND (e.score {op} "));
    builder.push_bind(bound.score);
    if let Some(seq) = bound.seq {
        builder.push(" OR (e.score = ");
        builder.push_bind(bound.score);
        builder.push(format!(" AND e.seq {op} "));
        builder.push_bind(seq);
        builder.push(")");
    }
    builder.push(")");
}

impl TimelineBackend for SortedSetTimeline {
    /// List up to [`PAGE_SIZE`] entries with `after < score < before`,
    /// ascending by score then insertion order.
    ///
    /// Entries whose record is missing or fails to decode are skipped with a
    /// warning; the page still succeeds. The cursor pair is computed from the
    /// index entries, skipped ones included. One extra entry is read past the
    /// page to tell whether `after` must resume inside a score group.
    async fn items(&self, before: &str, after: &str) -> Result<TimelinePage, TimelineError> {
        let before_bound = parse_bound(before)?;
        let after_bound = parse_bound(after)?;

        let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
            r#"SELECT e.item_key, e.score, e.seq, i.data, i.read
               FROM timeline_entries e
               LEFT JOIN items i ON i.key = e.item_key
               WHERE e.channel = "#,
        );
        builder.push_bind(&self.channel);
        if let Some(after) = after_bound {
            push_bound(&mut builder, after, ">");
        }
        if let Some(before) = before_bound {
            push_bound(&mut builder, before, "<");
        }
        builder.push(" ORDER BY e.score ASC, e.seq ASC LIMIT ");
        builder.push_bind(PAGE_SIZE + 1);

        let mut conn = self.pool.acquire().await?;
        let mut rows: Vec<PageRow> = builder.build_query_as().fetch_all(&mut *conn).await?;
        drop(conn);

        let next_score = if rows.len() > PAGE_SIZE as usize {
            rows.pop().map(|(_, score, _, _, _)| score)
        } else {
            None
        };
        let entries: Vec<(i64, i64)> = rows
            .iter()
            .map(|(_, score, seq, _, _)| (*score, *seq))
            .collect();
        let paging = next_paging(&entries, next_score);

        let mut items = Vec::with_capacity(rows.len());
        for (key, score, _, data, read) in rows {
            let Some(data) = data else {
                tracing::warn!(channel = %self.channel, key = %key, score, "Index entry has no stored record, skipping");
                continue;
            };
            let mut item: Item = match serde_json::from_str(&data) {
                Ok(item) => item,
                Err(source) => {
                    let e = TimelineError::Decode { key, source };
                    tracing::warn!(channel = %self.channel, error = %e, "Skipping undecodable record");
                    continue;
                }
            };
            item.read = if self.force_unread {
                false
            } else {
                read.unwrap_or(false)
            };
            items.push(item);
        }

        tracing::debug!(
            channel = %self.channel,
            before = %before,
            after = %after,
            entries = entries.len(),
            items = items.len(),
            "Listed timeline page"
        );

        Ok(TimelinePage { items, paging })
    }

    /// Store `item` and index it in this channel unless the channel has
    /// already marked it read.
    ///
    /// Record and index writes share one transaction. The one exception is an
    /// unparseable publication time: the record is committed without an
    /// index entry and `TimelineError::TimeFormat` is returned.
    async fn add_item(&self, mut item: Item) -> Result<(), TimelineError> {
        let published = item.published.get_or_insert_with(now_published).clone();
        let key = item_key(&item.id);
        let data = serde_json::to_string(&item).map_err(|source| TimelineError::Encode {
            id: item.id.clone(),
            source,
        })?;

        // The first statement must write: a deferred transaction that reads
        // first gets SQLITE_BUSY, not busy_timeout, when it upgrades to a
        // write lock. Content is last-write-wins; a read-set member stays
        // read.
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO items (key, id, published, read, data)
            VALUES (?, ?, ?, ? OR EXISTS (
                SELECT 1 FROM channel_read WHERE channel = ? AND item_key = ?
            ), ?)
            ON CONFLICT(key) DO UPDATE SET
                id = excluded.id,
                published = excluded.published,
                read = excluded.read,
                data = excluded.data
        "#,
        )
        .bind(&key)
        .bind(&item.id)
        .bind(&published)
        .bind(item.read)
        .bind(&self.channel)
        .bind(&key)
        .bind(&data)
        .execute(&mut *tx)
        .await?;

        let in_read_set: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM channel_read WHERE channel = ? AND item_key = ?")
                .bind(&self.channel)
                .bind(&key)
                .fetch_optional(&mut *tx)
                .await?;
        let is_read = in_read_set.is_some();

        if is_read {
            tx.commit().await?;
            tracing::debug!(channel = %self.channel, key = %key, "Item already read, not indexing");
            return Ok(());
        }

        let score = match score_for(&published) {
            Ok(score) => score,
            Err(e) => {
                tx.commit().await?;
                tracing::warn!(channel = %self.channel, key = %key, error = %e, "Stored item without index entry");
                return Err(e);
            }
        };

        sqlx::query(
            r#"
            INSERT INTO timeline_entries (channel, item_key, score)
            VALUES (?, ?, ?)
            ON CONFLICT(channel, item_key) DO UPDATE SET score = excluded.score
        "#,
        )
        .bind(&self.channel)
        .bind(&key)
        .bind(score)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!(channel = %self.channel, key = %key, score, "Indexed item");
        self.notify(TimelineEvent::ItemAdded {
            channel: self.channel.clone(),
            uid: item.id,
        });

        Ok(())
    }

    async fn count(&self) -> Result<usize, TimelineError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM timeline_entries WHERE channel = ?")
            .bind(&self.channel)
            .fetch_one(&self.pool)
            .await
            .map_err(|source| TimelineError::Count {
                channel: self.channel.clone(),
                source,
            })?;
        Ok(count.0 as usize)
    }

    /// Set the read flag, drop the entry from the index, and remember the
    /// reference in the read-set so re-ingestion does not resurrect it.
    /// Idempotent.
    async fn mark_read(&self, uid: &str) -> Result<(), TimelineError> {
        let key = item_key(uid);
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query("UPDATE items SET read = 1 WHERE key = ?")
            .bind(&key)
            .execute(&mut *tx)
            .await?;
        if updated.rows_affected() == 0 {
            return Err(TimelineError::ItemNotFound(uid.to_string()));
        }

        sqlx::query("DELETE FROM timeline_entries WHERE channel = ? AND item_key = ?")
            .bind(&self.channel)
            .bind(&key)
            .execute(&mut *tx)
            .await?;

        sqlx::query("INSERT OR IGNORE INTO channel_read (channel, item_key) VALUES (?, ?)")
            .bind(&self.channel)
            .bind(&key)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::debug!(channel = %self.channel, key = %key, "Marked item read");
        Ok(())
    }

    /// Clear the read flag, leave the read-set, and put the entry back at the
    /// score of its stored publication time. Idempotent.
    async fn mark_unread(&self, uid: &str) -> Result<(), TimelineError> {
        let key = item_key(uid);
        let mut tx = self.pool.begin().await?;

        // Write first; see `add_item`
        let row: Option<(String,)> =
            sqlx::query_as("UPDATE items SET read = 0 WHERE key = ? RETURNING published")
                .bind(&key)
                .fetch_optional(&mut *tx)
                .await?;
        let Some((published,)) = row else {
            return Err(TimelineError::ItemNotFound(uid.to_string()));
        };
        let score = score_for(&published)?;

        sqlx::query("DELETE FROM channel_read WHERE channel = ? AND item_key = ?")
            .bind(&self.channel)
            .bind(&key)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO timeline_entries (channel, item_key, score)
            VALUES (?, ?, ?)
            ON CONFLICT(channel, item_key) DO UPDATE SET score = excluded.score
        "#,
        )
        .bind(&self.channel)
        .bind(&key)
        .bind(score)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::debug!(channel = %self.channel, key = %key, score, "Marked item unread");
        Ok(())
    }
}
