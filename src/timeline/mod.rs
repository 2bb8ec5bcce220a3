//! Timeline backends and the interface they share.
//!
//! A channel's timeline is one of the [`Timeline`] variants, chosen from the
//! channel's committed [`TimelineKind`] by
//! [`Database::timeline`](crate::storage::Database::timeline). Callers drive
//! it only through [`TimelineBackend`]:
//!
//! ```ignore
//! use feedline::{Database, Item, TimelineBackend};
//!
//! let db = Database::open(":memory:").await?;
//! let home = db.timeline("home").await?;
//! home.add_item(Item::new("1").published("2024-01-01T00:00:00Z")).await?;
//!
//! let page = home.items("", "").await?;
//! let next = home.items("", &page.paging.after).await?;
//! ```

mod cursor;
mod sorted;
mod stream;

pub use cursor::PAGE_SIZE;
pub use sorted::SortedSetTimeline;
pub use stream::StreamTimeline;

use crate::storage::{Item, TimelineError, TimelineKind, TimelinePage};

/// Capabilities every timeline backend provides.
#[allow(async_fn_in_trait)]
pub trait TimelineBackend {
    /// Up to [`PAGE_SIZE`] items strictly between the `after` and `before`
    /// scores, with the cursor pair for the next call. Empty strings are
    /// unbounded.
    async fn items(&self, before: &str, after: &str) -> Result<TimelinePage, TimelineError>;

    /// Insert or update an item. Repeated calls with the same identifier leave
    /// one index entry.
    async fn add_item(&self, item: Item) -> Result<(), TimelineError>;

    /// Number of unread entries in the channel.
    async fn count(&self) -> Result<usize, TimelineError>;

    async fn mark_read(&self, uid: &str) -> Result<(), TimelineError>;

    async fn mark_unread(&self, uid: &str) -> Result<(), TimelineError>;
}

/// A channel's timeline, tagged by backend.
#[derive(Debug, Clone)]
pub enum Timeline {
    SortedSet(SortedSetTimeline),
    Stream(StreamTimeline),
}

impl Timeline {
    pub fn kind(&self) -> TimelineKind {
        match self {
            Timeline::SortedSet(_) => TimelineKind::SortedSet,
            Timeline::Stream(_) => TimelineKind::Stream,
        }
    }

    pub fn channel(&self) -> &str {
        match self {
            Timeline::SortedSet(t) => t.channel(),
            Timeline::Stream(t) => t.channel(),
        }
    }
}

impl TimelineBackend for Timeline {
    async fn items(&self, before: &str, after: &str) -> Result<TimelinePage, TimelineError> {
        match self {
            Timeline::SortedSet(t) => t.items(before, after).await,
            Timeline::Stream(t) => t.items(before, after).await,
        }
    }

    async fn add_item(&self, item: Item) -> Result<(), TimelineError> {
        match self {
            Timeline::SortedSet(t) => t.add_item(item).await,
            Timeline::Stream(t) => t.add_item(item).await,
        }
    }

    async fn count(&self) -> Result<usize, TimelineError> {
        match self {
            Timeline::SortedSet(t) => t.count().await,
            Timeline::Stream(t) => t.count().await,
        }
    }

    async fn mark_read(&self, uid: &str) -> Result<(), TimelineError> {
        match self {
            Timeline::SortedSet(t) => t.mark_read(uid).await,
            Timeline::Stream(t) => t.mark_read(uid).await,
        }
    }

    async fn mark_unread(&self, uid: &str) -> Result<(), TimelineError> {
        match self {
            Timeline::SortedSet(t) => t.mark_unread(uid).await,
            Timeline::Stream(t) => t.mark_unread(uid).await,
        }
    }
}
