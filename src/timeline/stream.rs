use super::TimelineBackend;
use crate::storage::{Item, TimelineError, TimelineKind, TimelinePage};

/// Placeholder for an append-only log timeline.
///
/// `count` always reports zero; every other operation returns
/// [`TimelineError::Unsupported`].
#[derive(Debug, Clone)]
pub struct StreamTimeline {
    channel: String,
}

impl StreamTimeline {
    pub(crate) fn new(channel: &str) -> Self {
        Self {
            channel: channel.to_string(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    fn unsupported(&self, operation: &'static str) -> TimelineError {
        tracing::debug!(channel = %self.channel, operation, "Stream timeline operation not supported");
        TimelineError::Unsupported {
            backend: TimelineKind::Stream,
            operation,
        }
    }
}

impl TimelineBackend for StreamTimeline {
    async fn items(&self, _before: &str, _after: &str) -> Result<TimelinePage, TimelineError> {
        Err(self.unsupported("items"))
    }

    async fn add_item(&self, _item: Item) -> Result<(), TimelineError> {
        Err(self.unsupported("add_item"))
    }

    async fn count(&self) -> Result<usize, TimelineError> {
        Ok(0)
    }

    async fn mark_read(&self, _uid: &str) -> Result<(), TimelineError> {
        Err(self.unsupported("mark_read"))
    }

    async fn mark_unread(&self, _uid: &str) -> Result<(), TimelineError> {
        Err(self.unsupported("mark_unread"))
    }
}
