mod channels;
mod consistency;
mod export;
mod schema;
mod types;

pub use schema::Database;
pub use types::{
    item_key, ChannelExport, ConsistencyReport, DatabaseError, IndexEntry, Item, Pagination,
    StoredRecord, TimelineError, TimelineKind, TimelinePage,
};
