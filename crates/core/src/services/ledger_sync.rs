//! Keeps the shared [`LedgerState`] in step with what ingestion has written.
//!
//! Ingestion lives in another process, so the range is polled from storage
//! and republished. A ledger header row is written last when a ledger closes,
//! which makes `MAX(sequence)` the newest fully ingested ledger.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::error::StorageResult;
use crate::ledger_state::{HistorySnapshot, LedgerState};
use crate::metrics::record_history_range;
use crate::ports::Repositories;

const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Periodic publisher of the retained ledger range.
pub struct LedgerStateSync {
    repositories: Arc<dyn Repositories>,
    state: Arc<LedgerState>,
    interval: Duration,
}

impl LedgerStateSync {
    pub fn new(
        repositories: Arc<dyn Repositories>,
        state: Arc<LedgerState>,
        interval: Duration,
    ) -> Self {
        Self {
            repositories,
            state,
            interval,
        }
    }

    /// Read the range once and publish it.
    ///
    /// An inconsistent range is logged and skipped; readers keep the
    /// previous snapshot.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> StorageResult<HistorySnapshot> {
        match self.repositories.ledgers().ledger_range().await? {
            Some((elder, latest)) => match self.state.publish(elder, latest) {
                Ok(previous) => {
                    if previous.latest != latest || previous.elder != elder {
                        debug!(elder, latest, "History range advanced");
                    }
                    record_history_range(elder, latest);
                }
                Err(e) => {
                    warn!(error = %e, "⚠️  Ignoring inconsistent ledger range");
                }
            },
            None => {
                if !self.state.clear().is_empty() {
                    info!("🗑️  History is empty");
                }
                record_history_range(0, 0);
            }
        }
        Ok(self.state.snapshot())
    }

    /// Refresh until shutdown is signalled.
    ///
    /// Failed refreshes back off exponentially up to 30 seconds; a success
    /// returns to the configured interval.
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(interval_ms = self.interval.as_millis(), "📖 Following ledger range");
        let mut delay = self.interval;

        loop {
            if *shutdown_rx.borrow() {
                debug!("Shutdown requested");
                return;
            }

            match self.refresh().await {
                Ok(_) => delay = self.interval,
                Err(e) => {
                    delay = (delay * 2).min(MAX_RETRY_DELAY).max(self.interval);
                    warn!(
                        error = ?e,
                        retry_in_ms = delay.as_millis(),
                        "⚠️  Ledger range refresh failed, retrying..."
                    );
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        debug!("Shutdown requested");
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryRepositories;

    fn sync(repos: Arc<MemoryRepositories>) -> (LedgerStateSync, Arc<LedgerState>) {
        let state = Arc::new(LedgerState::new());
        let sync = LedgerStateSync::new(repos, state.clone(), Duration::from_millis(100));
        (sync, state)
    }

    #[tokio::test]
    async fn refresh_publishes_repository_range() {
        let repos = Arc::new(MemoryRepositories::populated(3..=9, 1, 1));
        let (sync, state) = sync(repos.clone());

        let snapshot = sync.refresh().await.unwrap();
        assert_eq!(snapshot, HistorySnapshot::new(3, 9).unwrap());
        assert_eq!(state.snapshot(), snapshot);

        repos.prune_before(5);
        sync.refresh().await.unwrap();
        assert_eq!(state.snapshot(), HistorySnapshot::new(5, 9).unwrap());

        repos.prune_before(100);
        sync.refresh().await.unwrap();
        assert!(state.snapshot().is_empty());
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_snapshot() {
        let repos = Arc::new(MemoryRepositories::populated(1..=4, 1, 1));
        let (sync, state) = sync(repos.clone());
        sync.refresh().await.unwrap();

        repos.set_unavailable(true);
        assert!(sync.refresh().await.is_err());
        assert_eq!(state.snapshot(), HistorySnapshot::new(1, 4).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_shutdown() {
        let repos = Arc::new(MemoryRepositories::populated(1..=2, 1, 1));
        let (sync, state) = sync(repos);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move { sync.run(shutdown_rx).await });
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(state.snapshot(), HistorySnapshot::new(1, 2).unwrap());

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
