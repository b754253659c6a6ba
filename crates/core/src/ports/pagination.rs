//! Cursor pagination over TOID-ordered history.
//!
//! A request names a starting cursor, a direction and a page size. The
//! cursor is opaque to clients but has three concrete forms:
//!
//! - `now` - the end of the latest ingested ledger (starting cursor only)
//! - `<int>` - a record id (TOID)
//! - `<int>-<int>` - an `(account id, record id)` pair from a fan-out scan
//!
//! [`PageQuery::parse`] turns the raw request strings into a typed query,
//! resolving `now` against the snapshot the request is served from.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Bound, Range};

use serde::Deserialize;

use crate::error::{DomainError, DomainResult};
use crate::ledger_state::HistorySnapshot;
use crate::toid::Toid;

/// The live-edge sentinel.
pub const NOW: &str = "now";

/// Separator of compound fan-out cursors.
pub const PAIR_SEPARATOR: char = '-';

// =============================================================================
// Configuration
// =============================================================================

/// Page size policy.
///
/// Limits above `max_limit` (or zero) are rejected, never clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagingConfig {
    pub default_limit: u64,
    pub max_limit: u64,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 200,
        }
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Raw paging parameters as they arrive on a request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageParams {
    pub cursor: Option<String>,
    pub order: Option<String>,
    /// Kept as text so that any malformed value is an `InvalidLimit`.
    pub limit: Option<String>,
}

impl PageParams {
    pub fn new(cursor: Option<&str>, order: Option<&str>, limit: Option<u64>) -> Self {
        Self {
            cursor: cursor.map(str::to_string),
            order: order.map(str::to_string),
            limit: limit.map(|n| n.to_string()),
        }
    }
}

/// Ordering direction for sorted queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderDirection {
    /// Ascending order (smallest first).
    #[default]
    Asc,
    /// Descending order (largest first).
    Desc,
}

impl OrderDirection {
    /// Parse an order token; absent means ascending.
    pub fn parse(token: Option<&str>) -> DomainResult<Self> {
        match token {
            None | Some("asc") => Ok(OrderDirection::Asc),
            Some("desc") => Ok(OrderDirection::Desc),
            Some(other) => Err(DomainError::InvalidOrder(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderDirection::Asc => "asc",
            OrderDirection::Desc => "desc",
        }
    }
}

/// Which cursor shapes an endpoint accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorFormat {
    /// `now` or a single id.
    Toid,
    /// Additionally accepts `account-record` pairs (fan-out scans).
    Pair,
}

// =============================================================================
// Cursor
// =============================================================================

/// A resolved position in an ordered record stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    /// Position keyed by a record id.
    Toid(Toid),
    /// Position in a fan-out table keyed by `(account id, record id)`.
    Pair { account_id: i64, record_id: Toid },
}

impl Cursor {
    /// Parse a non-sentinel cursor string.
    pub fn parse(raw: &str, format: CursorFormat) -> DomainResult<Self> {
        match raw.split_once(PAIR_SEPARATOR) {
            None => Ok(Cursor::Toid(parse_id(raw)?)),
            Some(_) if format == CursorFormat::Toid => Err(DomainError::MalformedCursor(format!(
                "{raw:?}: compound cursors are not accepted here"
            ))),
            Some((account, record)) => {
                let account_id = parse_id(account)
                    .map_err(|_| malformed(raw, "account part is not a non-negative integer"))?;
                let record_id = parse_id(record)
                    .map_err(|_| malformed(raw, "record part is not a non-negative integer"))?;
                Ok(Cursor::Pair {
                    account_id: account_id.as_i64(),
                    record_id,
                })
            }
        }
    }

    /// The record id this position refers to.
    pub fn record_id(&self) -> Toid {
        match *self {
            Cursor::Toid(id) => id,
            Cursor::Pair { record_id, .. } => record_id,
        }
    }

    /// Natural ordering of positions. Different shapes are incomparable.
    pub fn compare(&self, other: &Cursor) -> Option<Ordering> {
        match (self, other) {
            (Cursor::Toid(a), Cursor::Toid(b)) => Some(a.cmp(b)),
            (
                Cursor::Pair { account_id: a1, record_id: r1 },
                Cursor::Pair { account_id: a2, record_id: r2 },
            ) => Some((a1, r1).cmp(&(a2, r2))),
            _ => None,
        }
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cursor::Toid(id) => write!(f, "{id}"),
            Cursor::Pair { account_id, record_id } => {
                write!(f, "{account_id}{PAIR_SEPARATOR}{record_id}")
            }
        }
    }
}

fn parse_id(raw: &str) -> DomainResult<Toid> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed(raw, "expected \"now\", an integer, or an integer pair"));
    }
    let value: i64 = raw
        .parse()
        .map_err(|_| malformed(raw, "integer out of range"))?;
    Toid::from_i64(value).map_err(|e| malformed(raw, &e.to_string()))
}

fn malformed(raw: &str, why: &str) -> DomainError {
    DomainError::MalformedCursor(format!("{raw:?}: {why}"))
}

// =============================================================================
// Page Query
// =============================================================================

/// A validated paging request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageQuery {
    pub cursor: Cursor,
    pub order: OrderDirection,
    pub limit: u64,
    /// The cursor was the `now` sentinel.
    pub live: bool,
}

impl PageQuery {
    /// Parse raw request parameters.
    ///
    /// `now` resolves to the end of `snapshot.latest`. In descending order the
    /// first page therefore starts at the newest record; in ascending order
    /// it starts after everything currently ingested; the empty first page
    /// hands back that position so the caller can tail new ledgers from it.
    ///
    /// `limit` must be a decimal integer between 1 and `config.max_limit`.
    pub fn parse(
        cursor: Option<&str>,
        order: Option<&str>,
        limit: Option<&str>,
        format: CursorFormat,
        snapshot: HistorySnapshot,
        config: &PagingConfig,
    ) -> DomainResult<Self> {
        let order = OrderDirection::parse(order)?;
        let limit = check_limit(limit, config)?;

        let (cursor, live) = match cursor {
            None => (default_cursor(order), false),
            Some(NOW) => (Cursor::Toid(live_edge(snapshot)?), true),
            Some(raw) => (Cursor::parse(raw, format)?, false),
        };

        Ok(Self {
            cursor,
            order,
            limit,
            live,
        })
    }

    /// Parse from a [`PageParams`] bundle.
    pub fn from_params(
        params: &PageParams,
        format: CursorFormat,
        snapshot: HistorySnapshot,
        config: &PagingConfig,
    ) -> DomainResult<Self> {
        Self::parse(
            params.cursor.as_deref(),
            params.order.as_deref(),
            params.limit.as_deref(),
            format,
            snapshot,
            config,
        )
    }

    /// Compare this query's cursor with `other` in traversal order.
    ///
    /// `Less` means this cursor is reached before `other` when walking in
    /// `self.order`.
    pub fn compare_to(&self, other: &Cursor) -> Option<Ordering> {
        let natural = self.cursor.compare(other)?;
        Some(match self.order {
            OrderDirection::Asc => natural,
            OrderDirection::Desc => natural.reverse(),
        })
    }

    /// Lower bound on record ids this page may return.
    pub fn as_lower_bound(&self) -> Bound<i64> {
        match self.order {
            OrderDirection::Asc => Bound::Excluded(self.cursor.record_id().as_i64()),
            OrderDirection::Desc => Bound::Unbounded,
        }
    }

    /// Upper bound on record ids this page may return.
    pub fn as_upper_bound(&self) -> Bound<i64> {
        match self.order {
            OrderDirection::Asc => Bound::Unbounded,
            OrderDirection::Desc => Bound::Excluded(self.cursor.record_id().as_i64()),
        }
    }

    /// Rows to ask storage for: one extra row signals a further page.
    pub fn fetch_limit(&self) -> u64 {
        self.limit + 1
    }
}

fn check_limit(limit: Option<&str>, config: &PagingConfig) -> DomainResult<u64> {
    let Some(raw) = limit else {
        return Ok(config.default_limit);
    };
    match raw.parse::<u64>() {
        Ok(n) if n > 0 && n <= config.max_limit => Ok(n),
        _ => Err(DomainError::InvalidLimit {
            limit: raw.to_string(),
            max: config.max_limit,
        }),
    }
}

fn default_cursor(order: OrderDirection) -> Cursor {
    match order {
        OrderDirection::Asc => Cursor::Toid(Toid::ZERO),
        OrderDirection::Desc => Cursor::Toid(Toid::MAX),
    }
}

fn live_edge(snapshot: HistorySnapshot) -> DomainResult<Toid> {
    if snapshot.is_empty() {
        return Ok(Toid::ZERO);
    }
    Ok(Toid::end_of_ledger(snapshot.latest)?)
}

// =============================================================================
// Id Ranges
// =============================================================================

/// Half-open range `[start, end)` of record ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdRange {
    pub start: i64,
    pub end: i64,
}

impl IdRange {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn contains(&self, id: i64) -> bool {
        id >= self.start && id < self.end
    }

    /// Narrow to the overlap with `other`.
    pub fn intersect(&self, other: IdRange) -> IdRange {
        IdRange {
            start: self.start.max(other.start),
            end: self.end.min(other.end),
        }
    }

    /// Narrow by a pair of std bounds.
    pub fn clamp(&self, lower: Bound<i64>, upper: Bound<i64>) -> IdRange {
        let start = match lower {
            Bound::Included(v) => v,
            Bound::Excluded(v) => v.saturating_add(1),
            Bound::Unbounded => i64::MIN,
        };
        let end = match upper {
            Bound::Included(v) => v.saturating_add(1),
            Bound::Excluded(v) => v,
            Bound::Unbounded => i64::MAX,
        };
        self.intersect(IdRange { start, end })
    }
}

impl From<Range<i64>> for IdRange {
    fn from(range: Range<i64>) -> Self {
        Self::new(range.start, range.end)
    }
}

// =============================================================================
// Results
// =============================================================================

/// Paginated result set with edges and page info.
#[derive(Debug, Clone)]
pub struct Connection<T> {
    /// Records in traversal order, each with its own cursor.
    pub edges: Vec<Edge<T>>,
    /// Information about the current page.
    pub page_info: PageInfo,
}

impl<T> Connection<T> {
    pub fn empty(has_previous_page: bool) -> Self {
        Self {
            edges: Vec::new(),
            page_info: PageInfo {
                has_next_page: false,
                has_previous_page,
                start_cursor: None,
                end_cursor: None,
            },
        }
    }

    /// Cursor to request the following page, if there is one.
    pub fn next_cursor(&self) -> Option<&str> {
        if self.page_info.has_next_page {
            self.page_info.end_cursor.as_deref()
        } else {
            None
        }
    }

    pub fn nodes(&self) -> impl Iterator<Item = &T> {
        self.edges.iter().map(|e| &e.node)
    }
}

/// A single item in a paginated result.
#[derive(Debug, Clone)]
pub struct Edge<T> {
    /// The actual item.
    pub node: T,
    /// Cursor for this item (the row's own ordering key).
    pub cursor: String,
}

/// Information about the current page in a paginated result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageInfo {
    /// Whether there are more items after this page.
    pub has_next_page: bool,
    /// Whether the request continued from an explicit cursor.
    pub has_previous_page: bool,
    /// Cursor of the first item in this page.
    pub start_cursor: Option<String>,
    /// Cursor of the last item in this page.
    pub end_cursor: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toid::{OPERATION_MASK, TRANSACTION_MASK};

    fn snapshot() -> HistorySnapshot {
        HistorySnapshot::new(100, 200).unwrap()
    }

    fn parse(cursor: Option<&str>, order: Option<&str>) -> DomainResult<PageQuery> {
        PageQuery::parse(
            cursor,
            order,
            None,
            CursorFormat::Pair,
            snapshot(),
            &PagingConfig::default(),
        )
    }

    #[test]
    fn malformed_cursors_are_rejected() {
        for raw in ["abc", "1-", "", "-1", "1-2-3", "+5", " 5", "99999999999999999999"] {
            let err = parse(Some(raw), None).unwrap_err();
            assert!(
                matches!(err, DomainError::MalformedCursor(_)),
                "{raw:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn now_resolves_to_end_of_latest_ledger() {
        let q = parse(Some("now"), Some("desc")).unwrap();
        assert!(q.live);
        assert_eq!(
            q.cursor,
            Cursor::Toid(Toid::encode(200, TRANSACTION_MASK, OPERATION_MASK).unwrap())
        );

        let asc = parse(Some("now"), Some("asc")).unwrap();
        assert_eq!(asc.cursor, q.cursor);
    }

    #[test]
    fn now_on_empty_history_is_the_origin() {
        let q = PageQuery::parse(
            Some("now"),
            Some("desc"),
            None,
            CursorFormat::Toid,
            HistorySnapshot::default(),
            &PagingConfig::default(),
        )
        .unwrap();
        assert_eq!(q.cursor, Cursor::Toid(Toid::ZERO));
    }

    #[test]
    fn pair_cursor_only_where_allowed() {
        let q = parse(Some("7-4294967296"), None).unwrap();
        assert_eq!(
            q.cursor,
            Cursor::Pair {
                account_id: 7,
                record_id: Toid::ledger(1).unwrap()
            }
        );
        assert_eq!(q.cursor.to_string(), "7-4294967296");

        let err = PageQuery::parse(
            Some("7-8"),
            None,
            None,
            CursorFormat::Toid,
            snapshot(),
            &PagingConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::MalformedCursor(_)));
    }

    #[test]
    fn order_and_limit_validation() {
        assert!(matches!(
            parse(None, Some("sideways")),
            Err(DomainError::InvalidOrder(_))
        ));

        let config = PagingConfig::default();
        let with_limit = |limit| {
            PageQuery::parse(None, None, Some(limit), CursorFormat::Toid, snapshot(), &config)
        };
        for bad in ["0", "201", "-1", "ten", "", "1.5", "99999999999999999999"] {
            assert!(
                matches!(with_limit(bad), Err(DomainError::InvalidLimit { max: 200, .. })),
                "{bad:?}"
            );
        }
        assert_eq!(with_limit("200").unwrap().limit, 200);
        assert_eq!(parse(None, None).unwrap().limit, config.default_limit);
    }

    #[test]
    fn absent_cursor_starts_at_the_traversal_origin() {
        let asc = parse(None, None).unwrap();
        assert_eq!(asc.order, OrderDirection::Asc);
        assert_eq!(asc.cursor.record_id(), Toid::ZERO);

        let desc = parse(None, Some("desc")).unwrap();
        assert_eq!(desc.cursor.record_id().as_i64(), i64::MAX);
    }

    #[test]
    fn bounds_follow_direction() {
        let asc = parse(Some("50"), Some("asc")).unwrap();
        assert_eq!(asc.as_lower_bound(), Bound::Excluded(50));
        assert_eq!(asc.as_upper_bound(), Bound::Unbounded);

        let desc = parse(Some("50"), Some("desc")).unwrap();
        assert_eq!(desc.as_lower_bound(), Bound::Unbounded);
        assert_eq!(desc.as_upper_bound(), Bound::Excluded(50));

        let range = IdRange::new(0, 100).clamp(asc.as_lower_bound(), asc.as_upper_bound());
        assert_eq!(range, IdRange::new(51, 100));
    }

    #[test]
    fn compare_to_uses_traversal_order() {
        let asc = parse(Some("10"), Some("asc")).unwrap();
        let desc = parse(Some("10"), Some("desc")).unwrap();
        let later = Cursor::Toid(Toid::from_i64(20).unwrap());

        assert_eq!(asc.compare_to(&later), Some(Ordering::Less));
        assert_eq!(desc.compare_to(&later), Some(Ordering::Greater));

        let pair = Cursor::Pair {
            account_id: 1,
            record_id: Toid::ZERO,
        };
        assert_eq!(asc.compare_to(&pair), None);
    }

    #[test]
    fn next_cursor_only_when_more_rows_exist() {
        let mut conn: Connection<u8> = Connection::empty(false);
        conn.page_info.end_cursor = Some("9".into());
        assert_eq!(conn.next_cursor(), None);

        conn.page_info.has_next_page = true;
        assert_eq!(conn.next_cursor(), Some("9"));
    }
}
