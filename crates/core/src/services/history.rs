//! History query service - paged reads over ledgers, transactions and
//! operations.
//!
//! Every list request follows the same steps:
//!
//! 1. Read the ledger state snapshot once
//! 2. Parse the cursor, order and limit into a [`PageQuery`]
//! 3. Check it against the retained window
//! 4. Run one bounded range scan, asking for one row more than the limit
//! 5. Trim the extra row and hand back a [`Connection`]
//!
//! The snapshot read in step 1 is used for every decision of the request,
//! so an update published halfway through cannot mix two windows.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument};

use crate::error::{DomainError, DomainResult, StorageError, StorageResult};
use crate::ledger_state::{HistorySnapshot, LedgerState};
use crate::metrics::{QueryTimer, record_gone, record_page_served, record_rejected};
use crate::models::{Ledger, Operation, Transaction, TransactionHash};
use crate::ports::{
    Connection, Cursor, CursorFormat, Edge, IdRange, OrderDirection, PageInfo, PageParams,
    PageQuery, PagingConfig, RangeScan, Repositories,
};
use crate::toid::{LEDGER_MASK, Toid, ledger_range, operations_of};

use super::window::{HistoryWindowValidator, WindowDecision};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the history service.
#[derive(Debug, Clone, Copy)]
pub struct HistoryConfig {
    /// Page size policy.
    pub paging: PagingConfig,
    /// Budget for a single storage call.
    pub query_timeout: Duration,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            paging: PagingConfig::default(),
            query_timeout: Duration::from_secs(5),
        }
    }
}

// =============================================================================
// Page Plan
// =============================================================================

/// A request that passed parsing and window checks.
struct PagePlan {
    resource: &'static str,
    query: PageQuery,
    snapshot: HistorySnapshot,
    /// `None` when the window leaves nothing to scan.
    range: Option<IdRange>,
    /// The client resumed from a cursor of a previous page.
    continued: bool,
}

impl PagePlan {
    /// Restrict the scan to a parent record's id range.
    fn narrow(mut self, scope: IdRange) -> Self {
        self.range = self
            .range
            .map(|range| range.intersect(scope))
            .filter(|range| !range.is_empty());
        self
    }

    fn scan(&self) -> Option<RangeScan> {
        self.range.map(|range| RangeScan {
            range,
            order: self.query.order,
            limit: self.query.fetch_limit(),
        })
    }

    /// Pair cursors are only valid for the account they were issued for.
    fn check_account(&self, account_id: i64) -> DomainResult<()> {
        if let Cursor::Pair { account_id: issued, .. } = self.query.cursor
            && issued != account_id
        {
            return Err(DomainError::MalformedCursor(format!(
                "{}: issued for a different account",
                self.query.cursor
            )));
        }
        Ok(())
    }

    fn empty<T>(self) -> Connection<T> {
        record_page_served(self.resource, 0);
        let mut conn = Connection::empty(self.continued);
        // An ascending `now` page resumes from the resolved live edge, so the
        // next poll sees whatever was ingested in between.
        if self.query.live && self.query.order == OrderDirection::Asc {
            let edge = self.query.cursor.record_id().to_string();
            conn.page_info.has_next_page = true;
            conn.page_info.start_cursor = Some(edge.clone());
            conn.page_info.end_cursor = Some(edge);
        }
        conn
    }

    fn into_connection<T>(self, mut rows: Vec<T>, cursor_of: impl Fn(&T) -> String) -> Connection<T> {
        let limit = usize::try_from(self.query.limit).unwrap_or(usize::MAX);
        let has_next_page = rows.len() > limit;
        rows.truncate(limit);

        let edges: Vec<Edge<T>> = rows
            .into_iter()
            .map(|node| Edge {
                cursor: cursor_of(&node),
                node,
            })
            .collect();

        record_page_served(self.resource, edges.len());

        let page_info = PageInfo {
            has_next_page,
            has_previous_page: self.continued,
            start_cursor: edges.first().map(|e| e.cursor.clone()),
            end_cursor: edges.last().map(|e| e.cursor.clone()),
        };

        Connection { edges, page_info }
    }
}

fn pair_cursor(account_id: i64, record_id: Toid) -> String {
    Cursor::Pair {
        account_id,
        record_id,
    }
    .to_string()
}

// =============================================================================
// HistoryService
// =============================================================================

/// Read side of the history store.
///
/// Holds its collaborators explicitly: the repositories, the shared ledger
/// state, the window validator and the paging policy. Cheap to share behind
/// an `Arc`; no per-request state lives here.
pub struct HistoryService {
    repositories: Arc<dyn Repositories>,
    ledger_state: Arc<LedgerState>,
    validator: HistoryWindowValidator,
    config: HistoryConfig,
}

impl HistoryService {
    pub fn new(
        repositories: Arc<dyn Repositories>,
        ledger_state: Arc<LedgerState>,
        config: HistoryConfig,
    ) -> Self {
        Self {
            repositories,
            ledger_state,
            validator: HistoryWindowValidator::new(),
            config,
        }
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    /// Current retained window.
    pub fn history_status(&self) -> HistorySnapshot {
        self.ledger_state.snapshot()
    }

    /// Whether the store answers within the query budget.
    pub async fn is_healthy(&self) -> bool {
        self.bounded("ping", self.repositories.ping()).await.is_ok()
    }

    // -------------------------------------------------------------------------
    // Ledgers
    // -------------------------------------------------------------------------

    #[instrument(skip_all, fields(cursor = ?params.cursor, order = ?params.order))]
    pub async fn list_ledgers(&self, params: &PageParams) -> DomainResult<Connection<Ledger>> {
        let plan = self.plan("ledgers", params, CursorFormat::Toid)?;
        let Some(scan) = plan.scan() else {
            return Ok(plan.empty());
        };
        let rows = self
            .bounded(plan.resource, self.repositories.ledgers().scan_ledgers(&scan))
            .await?;
        Ok(plan.into_connection(rows, |ledger| ledger.id.to_string()))
    }

    #[instrument(skip(self))]
    pub async fn get_ledger(&self, sequence: u32) -> DomainResult<Ledger> {
        let snapshot = self.ledger_state.snapshot();
        self.check_ledger("ledger", sequence, snapshot)?;
        if !snapshot.contains(sequence) {
            return Err(DomainError::NotFound(format!("ledger {sequence}")));
        }
        self.bounded("ledger", self.repositories.ledgers().get_ledger(sequence))
            .await?
            .ok_or_else(|| DomainError::NotFound(format!("ledger {sequence}")))
    }

    // -------------------------------------------------------------------------
    // Transactions
    // -------------------------------------------------------------------------

    #[instrument(skip_all, fields(cursor = ?params.cursor, order = ?params.order))]
    pub async fn list_transactions(
        &self,
        params: &PageParams,
    ) -> DomainResult<Connection<Transaction>> {
        let plan = self.plan("transactions", params, CursorFormat::Toid)?;
        self.scan_transactions(plan).await
    }

    #[instrument(skip(self, params), fields(cursor = ?params.cursor))]
    pub async fn list_transactions_for_ledger(
        &self,
        sequence: u32,
        params: &PageParams,
    ) -> DomainResult<Connection<Transaction>> {
        let plan = self.plan("ledger_transactions", params, CursorFormat::Toid)?;
        let scope = self.check_ledger(plan.resource, sequence, plan.snapshot)?;
        self.scan_transactions(plan.narrow(scope)).await
    }

    #[instrument(skip(self, params), fields(cursor = ?params.cursor))]
    pub async fn list_transactions_for_account(
        &self,
        address: &str,
        params: &PageParams,
    ) -> DomainResult<Connection<Transaction>> {
        let plan = self.plan("account_transactions", params, CursorFormat::Pair)?;
        let account = self
            .bounded(
                plan.resource,
                self.repositories.accounts().get_account_by_address(address),
            )
            .await?;
        let Some(account) = account else {
            debug!("Unknown account");
            return Ok(plan.empty());
        };
        plan.check_account(account.id)?;

        let Some(scan) = plan.scan() else {
            return Ok(plan.empty());
        };
        let rows = self
            .bounded(
                plan.resource,
                self.repositories
                    .transactions()
                    .scan_transactions_for_account(account.id, &scan),
            )
            .await?;
        Ok(plan.into_connection(rows, |tx| pair_cursor(account.id, tx.id)))
    }

    #[instrument(skip(self))]
    pub async fn get_transaction(&self, hash: &str) -> DomainResult<Transaction> {
        let snapshot = self.ledger_state.snapshot();
        let parsed = parse_hash(hash)?;
        let tx = self
            .bounded(
                "transaction",
                self.repositories.transactions().get_transaction(&parsed),
            )
            .await?
            .filter(|tx| snapshot.contains(tx.ledger_sequence));
        tx.ok_or_else(|| DomainError::NotFound(format!("transaction {hash}")))
    }

    async fn scan_transactions(&self, plan: PagePlan) -> DomainResult<Connection<Transaction>> {
        let Some(scan) = plan.scan() else {
            return Ok(plan.empty());
        };
        let rows = self
            .bounded(
                plan.resource,
                self.repositories.transactions().scan_transactions(&scan),
            )
            .await?;
        Ok(plan.into_connection(rows, |tx| tx.id.to_string()))
    }

    // -------------------------------------------------------------------------
    // Operations
    // -------------------------------------------------------------------------

    #[instrument(skip_all, fields(cursor = ?params.cursor, order = ?params.order))]
    pub async fn list_operations(
        &self,
        params: &PageParams,
    ) -> DomainResult<Connection<Operation>> {
        let plan = self.plan("operations", params, CursorFormat::Toid)?;
        self.scan_operations(plan).await
    }

    #[instrument(skip(self, params), fields(cursor = ?params.cursor))]
    pub async fn list_operations_for_ledger(
        &self,
        sequence: u32,
        params: &PageParams,
    ) -> DomainResult<Connection<Operation>> {
        let plan = self.plan("ledger_operations", params, CursorFormat::Toid)?;
        let scope = self.check_ledger(plan.resource, sequence, plan.snapshot)?;
        self.scan_operations(plan.narrow(scope)).await
    }

    #[instrument(skip(self, params), fields(cursor = ?params.cursor))]
    pub async fn list_operations_for_transaction(
        &self,
        hash: &str,
        params: &PageParams,
    ) -> DomainResult<Connection<Operation>> {
        let plan = self.plan("transaction_operations", params, CursorFormat::Toid)?;
        let parsed = parse_hash(hash)?;
        let tx = self
            .bounded(
                plan.resource,
                self.repositories.transactions().get_transaction(&parsed),
            )
            .await?
            .filter(|tx| plan.snapshot.contains(tx.ledger_sequence))
            .ok_or_else(|| DomainError::NotFound(format!("transaction {hash}")))?;

        let scope = IdRange::from(operations_of(tx.id));
        self.scan_operations(plan.narrow(scope)).await
    }

    #[instrument(skip(self, params), fields(cursor = ?params.cursor))]
    pub async fn list_operations_for_account(
        &self,
        address: &str,
        params: &PageParams,
    ) -> DomainResult<Connection<Operation>> {
        let plan = self.plan("account_operations", params, CursorFormat::Pair)?;
        let account = self
            .bounded(
                plan.resource,
                self.repositories.accounts().get_account_by_address(address),
            )
            .await?;
        let Some(account) = account else {
            debug!("Unknown account");
            return Ok(plan.empty());
        };
        plan.check_account(account.id)?;

        let Some(scan) = plan.scan() else {
            return Ok(plan.empty());
        };
        let rows = self
            .bounded(
                plan.resource,
                self.repositories
                    .operations()
                    .scan_operations_for_account(account.id, &scan),
            )
            .await?;
        Ok(plan.into_connection(rows, |op| pair_cursor(account.id, op.id)))
    }

    /// Look up one operation by its decimal id.
    #[instrument(skip(self))]
    pub async fn get_operation(&self, id: &str) -> DomainResult<Operation> {
        let not_found = || DomainError::NotFound(format!("operation {id}"));
        let snapshot = self.ledger_state.snapshot();
        let toid: Toid = id.parse().map_err(|_| not_found())?;

        if !snapshot.is_empty() && toid < Toid::ledger(snapshot.elder)? {
            record_gone("operation");
            return Err(DomainError::Gone {
                cursor: toid.as_i64(),
                elder: snapshot.elder,
            });
        }
        if !snapshot.contains(toid.ledger_sequence()) {
            return Err(not_found());
        }

        self.bounded("operation", self.repositories.operations().get_operation(toid))
            .await?
            .ok_or_else(not_found)
    }

    async fn scan_operations(&self, plan: PagePlan) -> DomainResult<Connection<Operation>> {
        let Some(scan) = plan.scan() else {
            return Ok(plan.empty());
        };
        let rows = self
            .bounded(
                plan.resource,
                self.repositories.operations().scan_operations(&scan),
            )
            .await?;
        Ok(plan.into_connection(rows, |op| op.id.to_string()))
    }

    // -------------------------------------------------------------------------
    // Shared steps
    // -------------------------------------------------------------------------

    /// Parse and window-check a page request against one snapshot.
    fn plan(
        &self,
        resource: &'static str,
        params: &PageParams,
        format: CursorFormat,
    ) -> DomainResult<PagePlan> {
        let snapshot = self.ledger_state.snapshot();
        let query = PageQuery::from_params(params, format, snapshot, &self.config.paging)
            .inspect_err(|e| record_rejected(resource, e.code()))?;

        let range = match self.validator.validate(&query, snapshot)? {
            WindowDecision::Admit(range) => Some(range),
            WindowDecision::Empty => None,
            WindowDecision::Gone { cursor, elder } => {
                debug!(cursor, elder, "Cursor predates retained history");
                record_gone(resource);
                return Err(DomainError::Gone { cursor, elder });
            }
        };

        Ok(PagePlan {
            resource,
            query,
            snapshot,
            range,
            continued: params.cursor.is_some() && !query.live,
        })
    }

    /// Id range of a ledger that may be listed under `snapshot`.
    fn check_ledger(
        &self,
        resource: &'static str,
        sequence: u32,
        snapshot: HistorySnapshot,
    ) -> DomainResult<IdRange> {
        if sequence == 0 || sequence > LEDGER_MASK {
            return Err(DomainError::NotFound(format!("ledger {sequence}")));
        }
        if !snapshot.is_empty() && sequence < snapshot.elder {
            record_gone(resource);
            return Err(DomainError::Gone {
                cursor: Toid::ledger(sequence)?.as_i64(),
                elder: snapshot.elder,
            });
        }
        Ok(ledger_range(sequence)?.into())
    }

    /// Run a storage call under the query timeout.
    async fn bounded<T>(
        &self,
        resource: &'static str,
        query: impl Future<Output = StorageResult<T>>,
    ) -> DomainResult<T> {
        let _timer = QueryTimer::new(resource);
        match tokio::time::timeout(self.config.query_timeout, query).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                let millis = u64::try_from(self.config.query_timeout.as_millis()).unwrap_or(u64::MAX);
                debug!(resource, timeout_ms = millis, "Storage call timed out");
                Err(StorageError::Timeout(millis).into())
            }
        }
    }
}

fn parse_hash(hash: &str) -> DomainResult<TransactionHash> {
    TransactionHash::from_hex(hash).map_err(|_| DomainError::NotFound(format!("transaction {hash}")))
}
