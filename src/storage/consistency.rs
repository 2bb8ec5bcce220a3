use super::schema::Database;
use super::types::{ConsistencyReport, TimelineError};

impl Database {
    // ========================================================================
    // Record / Index Consistency
    // ========================================================================

    /// Compare the record store against every channel index and read-set.
    ///
    /// Writes through a timeline keep the two in step. Inconsistencies come
    /// from rejected publication times (orphaned records), from imports, and
    /// from databases written by older non-transactional code (dangling
    /// entries).
    pub async fn check_consistency(&self) -> Result<ConsistencyReport, TimelineError> {
        let mut conn = self.pool.acquire().await?;

        let records_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM items")
            .fetch_one(&mut *conn)
            .await?;

        let entries_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM timeline_entries")
            .fetch_one(&mut *conn)
            .await?;

        // Dangling: indexed but no record
        let dangling: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM timeline_entries e LEFT JOIN items i ON i.key = e.item_key WHERE i.key IS NULL",
        )
        .fetch_one(&mut *conn)
        .await?;

        // Orphaned: a record no channel indexes or has read
        let orphaned: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM items i
            WHERE NOT EXISTS (SELECT 1 FROM timeline_entries e WHERE e.item_key = i.key)
              AND NOT EXISTS (SELECT 1 FROM channel_read r WHERE r.item_key = i.key)
        "#,
        )
        .fetch_one(&mut *conn)
        .await?;

        let is_consistent = dangling.0 == 0 && orphaned.0 == 0;

        tracing::debug!(
            records = records_count.0,
            entries = entries_count.0,
            dangling = dangling.0,
            orphaned = orphaned.0,
            is_consistent = is_consistent,
            "Timeline consistency check"
        );

        Ok(ConsistencyReport {
            records_count: records_count.0,
            entries_count: entries_count.0,
            dangling_entries: dangling.0,
            orphaned_records: orphaned.0,
            is_consistent,
        })
    }

    /// Identifiers of orphaned records, oldest key first, at most `limit`.
    pub async fn orphaned_record_ids(&self, limit: i64) -> Result<Vec<String>, TimelineError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT i.id FROM items i
            WHERE NOT EXISTS (SELECT 1 FROM timeline_entries e WHERE e.item_key = i.key)
              AND NOT EXISTS (SELECT 1 FROM channel_read r WHERE r.item_key = i.key)
            ORDER BY i.key
            LIMIT ?
        "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    /// Delete index entries that have no backing record, returning how many
    /// were removed.
    ///
    /// Orphaned records are left alone: nothing records which channel they
    /// were meant for.
    pub async fn repair_dangling_entries(&self) -> Result<u64, TimelineError> {
        let result = sqlx::query(
            "DELETE FROM timeline_entries WHERE NOT EXISTS (SELECT 1 FROM items i WHERE i.key = timeline_entries.item_key)",
        )
        .execute(&self.pool)
        .await?;

        let removed = result.rows_affected();
        if removed > 0 {
            tracing::info!(removed = removed, "Removed dangling timeline entries");
        }
        Ok(removed)
    }
}
