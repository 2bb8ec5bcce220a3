/// Notifications published by timelines after a write commits.
///
/// Delivery is best effort: events are offered with `try_send`, and a full or
/// closed channel never fails the write that produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimelineEvent {
    /// An item became queryable in a channel's timeline.
    ItemAdded { channel: String, uid: String },
}
