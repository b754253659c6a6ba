//! Snapshot of the retained history range.
//!
//! The sync task publishes `{elder, latest}` after every refresh; request
//! tasks read it. Both sequences fit in 32 bits, so the pair is packed into
//! one `AtomicU64` and replaced as a whole. Readers never observe a half
//! written pair and never wait on the writer.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::toid::LEDGER_MASK;

/// Immutable view of the retained window.
///
/// `{0, 0}` is the empty state (nothing ingested yet). Otherwise
/// `1 <= elder <= latest`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HistorySnapshot {
    /// Oldest ledger still retained.
    pub elder: u32,
    /// Newest ledger fully ingested and visible to queries.
    pub latest: u32,
}

impl HistorySnapshot {
    /// Build a snapshot, rejecting inverted or unrepresentable ranges.
    pub fn new(elder: u32, latest: u32) -> Option<Self> {
        let empty = elder == 0 && latest == 0;
        let valid = elder >= 1 && elder <= latest && latest <= LEDGER_MASK;
        (empty || valid).then_some(Self { elder, latest })
    }

    /// No ledger has been ingested.
    pub fn is_empty(&self) -> bool {
        self.latest == 0
    }

    /// Whether `sequence` is inside the retained window.
    pub fn contains(&self, sequence: u32) -> bool {
        !self.is_empty() && sequence >= self.elder && sequence <= self.latest
    }

    fn pack(self) -> u64 {
        (u64::from(self.elder) << 32) | u64::from(self.latest)
    }

    fn unpack(word: u64) -> Self {
        Self {
            elder: (word >> 32) as u32,
            latest: word as u32,
        }
    }
}

/// Rejected publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid history range: elder {elder}, latest {latest}")]
pub struct InvalidRange {
    pub elder: u32,
    pub latest: u32,
}

/// Shared, lock-free holder of the current [`HistorySnapshot`].
///
/// Construct one per process and hand out `Arc<LedgerState>`; there is no
/// global instance.
#[derive(Debug, Default)]
pub struct LedgerState {
    word: AtomicU64,
}

impl LedgerState {
    /// Start in the empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a known snapshot (handy in tests).
    pub fn with_snapshot(snapshot: HistorySnapshot) -> Self {
        Self {
            word: AtomicU64::new(snapshot.pack()),
        }
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> HistorySnapshot {
        HistorySnapshot::unpack(self.word.load(Ordering::Acquire))
    }

    /// Replace the snapshot. Returns the previous value.
    pub fn publish(&self, elder: u32, latest: u32) -> Result<HistorySnapshot, InvalidRange> {
        let next = HistorySnapshot::new(elder, latest).ok_or(InvalidRange { elder, latest })?;
        let prev = self.word.swap(next.pack(), Ordering::AcqRel);
        Ok(HistorySnapshot::unpack(prev))
    }

    /// Back to the empty state (all history pruned or store wiped).
    pub fn clear(&self) -> HistorySnapshot {
        HistorySnapshot::unpack(self.word.swap(0, Ordering::AcqRel))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn publish_replaces_and_returns_previous() {
        let state = LedgerState::new();
        assert!(state.snapshot().is_empty());

        let prev = state.publish(100, 200).unwrap();
        assert_eq!(prev, HistorySnapshot::default());
        assert_eq!(state.snapshot(), HistorySnapshot { elder: 100, latest: 200 });

        let prev = state.publish(101, 205).unwrap();
        assert_eq!(prev.latest, 200);
    }

    #[test]
    fn inverted_range_is_rejected_and_state_kept() {
        let state = LedgerState::with_snapshot(HistorySnapshot::new(5, 9).unwrap());

        assert_eq!(
            state.publish(10, 3),
            Err(InvalidRange { elder: 10, latest: 3 })
        );
        assert!(state.publish(0, 3).is_err());
        assert_eq!(state.snapshot().latest, 9);
    }

    #[test]
    fn contains_respects_window_edges() {
        let snap = HistorySnapshot::new(100, 200).unwrap();
        assert!(snap.contains(100));
        assert!(snap.contains(200));
        assert!(!snap.contains(99));
        assert!(!snap.contains(201));
        assert!(!HistorySnapshot::default().contains(0));
    }

    #[test]
    fn readers_never_see_a_torn_pair() {
        let state = Arc::new(LedgerState::new());

        let writer = {
            let state = state.clone();
            thread::spawn(move || {
                for n in 1..20_000u32 {
                    // elder always trails latest by exactly ten
                    state.publish(n, n + 10).unwrap();
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let state = state.clone();
                thread::spawn(move || {
                    for _ in 0..20_000 {
                        let snap = state.snapshot();
                        assert!(snap.is_empty() || snap.latest == snap.elder + 10);
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
    }
}
