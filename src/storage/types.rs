use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds a lock on the database file
    #[error("Another process appears to be using the timeline database. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_message(&err.to_string()) {
            return DatabaseError::InstanceLocked;
        }

        DatabaseError::Other(err)
    }
}

/// SQLITE_BUSY (5), SQLITE_LOCKED (6) and SQLITE_CANTOPEN (14) all surface as
/// one of these messages.
pub(crate) fn is_lock_message(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("sqlite_busy")
        || message.contains("sqlite_locked")
        || message.contains("unable to open database file")
}

/// Errors raised by timeline operations.
///
/// Nothing in this crate retries on any of these; retry policy belongs to the
/// caller.
#[derive(Debug, Error)]
pub enum TimelineError {
    /// The store is unreachable or returned a protocol-level error
    #[error("Timeline storage error: {0}")]
    Backend(#[from] sqlx::Error),

    /// A stored record could not be deserialized
    #[error("Failed to decode stored record {key}: {source}")]
    Decode {
        key: String,
        source: serde_json::Error,
    },

    /// An item could not be serialized for storage
    #[error("Failed to encode item {id}: {source}")]
    Encode {
        id: String,
        source: serde_json::Error,
    },

    /// The publication time is not an RFC 3339 timestamp
    #[error("Can't parse {published:?} as time: {source}")]
    TimeFormat {
        published: String,
        source: chrono::ParseError,
    },

    /// A pagination cursor is not a score value
    #[error("Invalid cursor {value:?}: {source}")]
    Cursor {
        value: String,
        source: std::num::ParseIntError,
    },

    /// Counting failed; carries the channel for diagnosis
    #[error("While counting unread items for channel {channel}: {source}")]
    Count {
        channel: String,
        source: sqlx::Error,
    },

    #[error("Item not found: {0}")]
    ItemNotFound(String),

    /// The backend variant does not implement this operation
    #[error("The {backend} timeline does not support {operation}")]
    Unsupported {
        backend: TimelineKind,
        operation: &'static str,
    },

    #[error("Unknown timeline kind: {0:?}")]
    UnknownTimelineKind(String),
}

// ============================================================================
// Timeline Kind
// ============================================================================

/// Backend variant backing a channel's timeline.
///
/// Stored in the `channels` table and in configuration as `sorted-set` or
/// `stream`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimelineKind {
    #[default]
    SortedSet,
    Stream,
}

impl TimelineKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TimelineKind::SortedSet => "sorted-set",
            TimelineKind::Stream => "stream",
        }
    }
}

impl fmt::Display for TimelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimelineKind {
    type Err = TimelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sorted-set" => Ok(TimelineKind::SortedSet),
            "stream" => Ok(TimelineKind::Stream),
            other => Err(TimelineError::UnknownTimelineKind(other.to_string())),
        }
    }
}

// ============================================================================
// Consistency Report
// ============================================================================

/// Detailed record/index consistency report
///
/// A dangling entry is an index entry with no backing record. An orphaned
/// record is one that is neither indexed in any channel nor part of any
/// channel's read-set, which is what a rejected publication time leaves
/// behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencyReport {
    /// Number of rows in the items table
    pub records_count: i64,
    /// Number of rows in the timeline_entries table, across all channels
    pub entries_count: i64,
    pub dangling_entries: i64,
    pub orphaned_records: i64,
    /// True if there are no dangling entries and no orphaned records
    pub is_consistent: bool,
}

// ============================================================================
// Data Structures
// ============================================================================

/// Key of an item in the record store, and the reference kept in indexes
/// and read-sets.
pub fn item_key(id: &str) -> String {
    format!("item:{id}")
}

/// A feed item.
///
/// Only the identifier, publication time and read flag are interpreted by the
/// store. Every other field (name, content, url, author, ...) is carried
/// opaquely in `fields` and round-trips through the stored JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Item {
    #[serde(rename = "_id", default)]
    pub id: String,
    /// RFC 3339 publication time. Filled with the current time on ingestion
    /// when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<String>,
    #[serde(rename = "_is_read", default)]
    pub read: bool,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl Item {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn published(mut self, published: impl Into<String>) -> Self {
        self.published = Some(published.into());
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// Cursor pair for continuing a listing. Empty means unbounded.
///
/// Each side is a score, or `score:seq` when a page ends inside a run of
/// equal scores.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub before: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub after: String,
}

impl Pagination {
    pub fn is_exhausted(&self) -> bool {
        self.before.is_empty() && self.after.is_empty()
    }
}

/// One page of a channel's timeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimelinePage {
    pub items: Vec<Item>,
    pub paging: Pagination,
}

/// Persisted form of an item: `{id, published, read, data}` where `data` is
/// the JSON of the full item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct StoredRecord {
    pub id: String,
    pub published: String,
    pub read: bool,
    pub data: String,
}

/// A (reference, score) pair of a channel index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct IndexEntry {
    pub item_key: String,
    pub score: i64,
}

/// Portable snapshot of one channel: its index in timeline order, the records
/// it references, and its read-set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelExport {
    pub channel: String,
    pub entries: Vec<IndexEntry>,
    pub records: Vec<StoredRecord>,
    pub read: Vec<String>,
}
