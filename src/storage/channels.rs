use super::schema::Database;
use super::types::{TimelineError, TimelineKind};
use crate::timeline::{SortedSetTimeline, StreamTimeline, Timeline};

impl Database {
    // ========================================================================
    // Channel Backend Selection
    // ========================================================================

    /// The backend kind committed for `channel`, if any.
    ///
    /// A stored kind this build does not know is an error, not a fallback.
    pub async fn channel_timeline_kind(
        &self,
        channel: &str,
    ) -> Result<Option<TimelineKind>, TimelineError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT timeline FROM channels WHERE name = ?")
            .bind(channel)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|(kind,)| kind.parse()).transpose()
    }

    /// Commit the backend kind for `channel` (UPSERT).
    pub async fn set_channel_timeline(
        &self,
        channel: &str,
        kind: TimelineKind,
    ) -> Result<(), TimelineError> {
        sqlx::query(
            r#"
            INSERT INTO channels (name, timeline, updated_at)
            VALUES (?, ?, datetime('now'))
            ON CONFLICT(name) DO UPDATE SET timeline = excluded.timeline, updated_at = excluded.updated_at
        "#,
        )
        .bind(channel)
        .bind(kind.as_str())
        .execute(&self.pool)
        .await?;

        tracing::info!(channel = %channel, timeline = %kind, "Committed channel timeline kind");
        Ok(())
    }

    /// Resolve the backend kind for `channel`: committed row, then the
    /// configured per-channel override, then the configured default.
    pub async fn resolve_timeline_kind(&self, channel: &str) -> Result<TimelineKind, TimelineError> {
        if let Some(kind) = self.channel_timeline_kind(channel).await? {
            return Ok(kind);
        }
        if let Some(kind) = self.config.channels.get(channel) {
            return Ok(*kind);
        }
        Ok(self.config.default_timeline)
    }

    /// The timeline for `channel`, backed by its resolved kind.
    ///
    /// Channels need no creation step; the first write creates one.
    pub async fn timeline(&self, channel: &str) -> Result<Timeline, TimelineError> {
        let kind = self.resolve_timeline_kind(channel).await?;
        tracing::debug!(channel = %channel, timeline = %kind, "Resolved channel timeline");

        Ok(match kind {
            TimelineKind::SortedSet => Timeline::SortedSet(SortedSetTimeline::new(
                self.pool.clone(),
                channel,
                self.config.force_unread_listing,
                self.events.clone(),
            )),
            TimelineKind::Stream => Timeline::Stream(StreamTimeline::new(channel)),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::storage::{Database, TimelineError, TimelineKind};
    use crate::timeline::TimelineBackend;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    async fn test_db_with(config: Config) -> Database {
        Database::connect(Config {
            database_path: ":memory:".to_string(),
            ..config
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_default_is_sorted_set() {
        let db = test_db().await;
        assert_eq!(db.channel_timeline_kind("home").await.unwrap(), None);

        let timeline = db.timeline("home").await.unwrap();
        assert_eq!(timeline.kind(), TimelineKind::SortedSet);
        assert_eq!(timeline.channel(), "home");
    }

    #[tokio::test]
    async fn test_committed_kind_is_used() {
        let db = test_db().await;
        db.set_channel_timeline("firehose", TimelineKind::Stream)
            .await
            .unwrap();

        assert_eq!(
            db.channel_timeline_kind("firehose").await.unwrap(),
            Some(TimelineKind::Stream)
        );
        let timeline = db.timeline("firehose").await.unwrap();
        assert_eq!(timeline.kind(), TimelineKind::Stream);
        assert_eq!(timeline.count().await.unwrap(), 0);

        // Other channels are unaffected
        assert_eq!(
            db.timeline("home").await.unwrap().kind(),
            TimelineKind::SortedSet
        );
    }

    #[tokio::test]
    async fn test_set_channel_timeline_overwrites() {
        let db = test_db().await;
        db.set_channel_timeline("home", TimelineKind::Stream)
            .await
            .unwrap();
        db.set_channel_timeline("home", TimelineKind::SortedSet)
            .await
            .unwrap();

        assert_eq!(
            db.resolve_timeline_kind("home").await.unwrap(),
            TimelineKind::SortedSet
        );
    }

    #[tokio::test]
    async fn test_config_override_and_default() {
        let mut config = Config {
            default_timeline: TimelineKind::Stream,
            ..Config::default()
        };
        config
            .channels
            .insert("home".to_string(), TimelineKind::SortedSet);
        let db = test_db_with(config).await;

        assert_eq!(
            db.resolve_timeline_kind("home").await.unwrap(),
            TimelineKind::SortedSet
        );
        assert_eq!(
            db.resolve_timeline_kind("other").await.unwrap(),
            TimelineKind::Stream
        );

        // A committed kind beats the configured override
        db.set_channel_timeline("home", TimelineKind::Stream)
            .await
            .unwrap();
        assert_eq!(
            db.resolve_timeline_kind("home").await.unwrap(),
            TimelineKind::Stream
        );
    }

    #[tokio::test]
    async fn test_unknown_stored_kind_is_an_error() {
        let db = test_db().await;
        sqlx::query("INSERT INTO channels (name, timeline) VALUES ('legacy', 'hash')")
            .execute(&db.pool)
            .await
            .unwrap();

        let err = db.timeline("legacy").await.unwrap_err();
        assert!(matches!(err, TimelineError::UnknownTimelineKind(ref kind) if kind == "hash"));
    }
}
