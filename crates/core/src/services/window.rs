//! Retention window checks for paging requests.

use crate::error::DomainResult;
use crate::ledger_state::HistorySnapshot;
use crate::ports::{IdRange, OrderDirection, PageQuery};
use crate::toid::{Toid, after_ledger};

/// Outcome of checking a page request against the retained window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowDecision {
    /// Scan exactly this id range.
    Admit(IdRange),
    /// Nothing to return, but the request is valid and may fill later.
    Empty,
    /// A descending walk from before the window; it can never make progress.
    Gone { cursor: i64, elder: u32 },
}

/// Decides whether a page is servable under a history snapshot.
///
/// The admitted range never extends past the end of `latest`, so rows of a
/// ledger that is still being written are not visible until it is published.
#[derive(Debug, Clone, Copy, Default)]
pub struct HistoryWindowValidator;

impl HistoryWindowValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(
        &self,
        query: &PageQuery,
        snapshot: HistorySnapshot,
    ) -> DomainResult<WindowDecision> {
        if snapshot.is_empty() {
            return Ok(WindowDecision::Empty);
        }

        let window_start = Toid::ledger(snapshot.elder)?.as_i64();
        let position = query.cursor.record_id().as_i64();

        if query.order == OrderDirection::Desc && position <= window_start {
            return Ok(WindowDecision::Gone {
                cursor: position,
                elder: snapshot.elder,
            });
        }

        let window = IdRange::new(window_start, after_ledger(snapshot.latest)?);
        let range = window.clamp(query.as_lower_bound(), query.as_upper_bound());

        if range.is_empty() {
            Ok(WindowDecision::Empty)
        } else {
            Ok(WindowDecision::Admit(range))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{CursorFormat, PagingConfig};

    fn snapshot() -> HistorySnapshot {
        HistorySnapshot::new(100, 200).unwrap()
    }

    fn query(cursor: &str, order: &str) -> PageQuery {
        PageQuery::parse(
            Some(cursor),
            Some(order),
            None,
            CursorFormat::Pair,
            snapshot(),
            &PagingConfig::default(),
        )
        .unwrap()
    }

    fn id(l: u32, t: u32, o: u32) -> String {
        Toid::encode(l, t, o).unwrap().to_string()
    }

    fn decide(cursor: &str, order: &str) -> WindowDecision {
        HistoryWindowValidator::new()
            .validate(&query(cursor, order), snapshot())
            .unwrap()
    }

    #[test]
    fn descending_before_elder_is_gone() {
        let decision = decide(&id(50, 0, 0), "desc");
        assert_eq!(
            decision,
            WindowDecision::Gone {
                cursor: Toid::ledger(50).unwrap().as_i64(),
                elder: 100,
            }
        );
    }

    #[test]
    fn descending_at_window_start_is_gone() {
        assert!(matches!(
            decide(&id(100, 0, 0), "desc"),
            WindowDecision::Gone { elder: 100, .. }
        ));
    }

    #[test]
    fn descending_inside_window_is_admitted() {
        let decision = decide(&id(150, 0, 0), "desc");
        assert_eq!(
            decision,
            WindowDecision::Admit(IdRange::new(
                Toid::ledger(100).unwrap().as_i64(),
                Toid::ledger(150).unwrap().as_i64(),
            ))
        );
    }

    #[test]
    fn ascending_before_elder_is_clamped_forward() {
        let WindowDecision::Admit(range) = decide(&id(50, 0, 0), "asc") else {
            panic!("ascending walks are never gone");
        };
        assert_eq!(range.start, Toid::ledger(100).unwrap().as_i64());
        assert_eq!(range.end, after_ledger(200).unwrap());
    }

    #[test]
    fn ascending_beyond_latest_is_empty() {
        assert_eq!(decide(&id(250, 0, 0), "asc"), WindowDecision::Empty);
        assert_eq!(decide("now", "asc"), WindowDecision::Empty);
    }

    #[test]
    fn descending_now_covers_whole_window() {
        let WindowDecision::Admit(range) = decide("now", "desc") else {
            panic!("expected admit");
        };
        assert_eq!(range.start, Toid::ledger(100).unwrap().as_i64());
        assert_eq!(range.end, Toid::end_of_ledger(200).unwrap().as_i64());
    }

    #[test]
    fn pair_cursor_uses_record_part() {
        let cursor = format!("7-{}", id(50, 1, 0));
        assert!(matches!(decide(&cursor, "desc"), WindowDecision::Gone { .. }));
        assert!(matches!(decide(&cursor, "asc"), WindowDecision::Admit(_)));
    }

    #[test]
    fn empty_history_is_empty_not_gone() {
        let validator = HistoryWindowValidator::new();
        let empty = HistorySnapshot::default();
        let q = PageQuery::parse(
            Some("5"),
            Some("desc"),
            None,
            CursorFormat::Toid,
            empty,
            &PagingConfig::default(),
        )
        .unwrap();
        assert_eq!(validator.validate(&q, empty).unwrap(), WindowDecision::Empty);
    }
}
