//! Score-ordered, cursor-paginated timeline storage for a personal feed
//! reader.
//!
//! Items are persisted per channel in SQLite and served back a page at a time,
//! ordered by publication time, with read/unread bookkeeping:
//!
//! - [`storage`] - the [`Database`] handle, data model, errors, and
//!   maintenance (consistency checks, export/import)
//! - [`timeline`] - the [`TimelineBackend`] interface and its backends
//! - [`config`] - optional TOML configuration
//! - [`events`] - notifications emitted after writes

pub mod config;
pub mod events;
pub mod storage;
pub mod timeline;

pub use config::{Config, ConfigError};
pub use events::TimelineEvent;
pub use storage::{
    ChannelExport, ConsistencyReport, Database, DatabaseError, Item, Pagination, TimelineError,
    TimelineKind, TimelinePage,
};
pub use timeline::{Timeline, TimelineBackend, PAGE_SIZE};

/// Install a `tracing` subscriber filtered by `RUST_LOG`.
///
/// For processes embedding the store that have no subscriber of their own.
/// Fails if a global subscriber is already installed.
pub fn init_tracing() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .map_err(anyhow::Error::msg)
}
