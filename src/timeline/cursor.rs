//! Score and cursor arithmetic shared by the timeline backends.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::storage::{Pagination, TimelineError};

/// Maximum number of entries returned by one `items` call.
pub const PAGE_SIZE: i64 = 20;

/// Current time in the format written into items that arrive without one.
pub(crate) fn now_published() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Unix seconds of an RFC 3339 publication time.
pub(crate) fn score_for(published: &str) -> Result<i64, TimelineError> {
    DateTime::parse_from_rfc3339(published)
        .map(|t| t.timestamp())
        .map_err(|source| TimelineError::TimeFormat {
            published: published.to_string(),
            source,
        })
}

/// One side of a cursor pair.
///
/// A bare score bounds the whole score group. `score:seq` bounds inside it,
/// at an insertion sequence, so a page that ends partway through a run of
/// equal scores can be resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Bound {
    pub score: i64,
    pub seq: Option<i64>,
}

/// Parse one side of a cursor pair. Empty is unbounded.
pub(crate) fn parse_bound(value: &str) -> Result<Option<Bound>, TimelineError> {
    if value.is_empty() {
        return Ok(None);
    }
    let invalid = |source: std::num::ParseIntError| TimelineError::Cursor {
        value: value.to_string(),
        source,
    };

    let (score, seq) = match value.split_once(':') {
        Some((score, seq)) => (score, Some(seq.parse::<i64>().map_err(invalid)?)),
        None => (value, None),
    };
    let score = score.parse::<i64>().map_err(invalid)?;
    Ok(Some(Bound { score, seq }))
}

/// Cursor pair following a page of `(score, seq)` entries in ascending order.
///
/// With two or more entries, `before` is the score of the second entry and
/// `after` the score of the last one. Anything shorter exhausts the listing.
/// When `next_score`, the score of the first entry past the page, equals the
/// last score, `after` also carries the last entry's sequence.
pub(crate) fn next_paging(entries: &[(i64, i64)], next_score: Option<i64>) -> Pagination {
    let (Some(&(second, _)), Some(&(last, last_seq))) = (entries.get(1), entries.last()) else {
        return Pagination::default();
    };
    let after = if next_score == Some(last) {
        format!("{last}:{last_seq}")
    } else {
        last.to_string()
    };
    Pagination {
        before: second.to_string(),
        after,
    }
}
