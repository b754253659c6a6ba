//! Port traits for history repositories.
//!
//! These traits define the read interface used by the domain layer.
//! Implementations live in the infrastructure layer (e.g., `annals-storage`).
//! Nothing here writes: ingestion owns the tables.

use async_trait::async_trait;

use crate::error::StorageResult;
use crate::models::{Account, Ledger, Operation, Transaction, TransactionHash};
use crate::toid::Toid;

use super::pagination::{IdRange, OrderDirection};

// =============================================================================
// Scan Request
// =============================================================================

/// One bounded, ordered range scan.
///
/// Implementations return rows with `range.start <= id < range.end`, in
/// `order`, at most `limit` of them. They must not read outside the range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeScan {
    pub range: IdRange,
    pub order: OrderDirection,
    pub limit: u64,
}

// =============================================================================
// Repository Traits
// =============================================================================

/// Repository for ledger headers.
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    /// Get ledger by sequence.
    async fn get_ledger(&self, sequence: u32) -> StorageResult<Option<Ledger>>;

    /// Ledgers whose id falls inside the scan.
    async fn scan_ledgers(&self, scan: &RangeScan) -> StorageResult<Vec<Ledger>>;

    /// `(oldest, newest)` retained ledger sequence, `None` when empty.
    async fn ledger_range(&self) -> StorageResult<Option<(u32, u32)>>;
}

/// Repository for transactions.
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Get transaction by hash.
    async fn get_transaction(&self, hash: &TransactionHash) -> StorageResult<Option<Transaction>>;

    /// Transactions whose id falls inside the scan.
    async fn scan_transactions(&self, scan: &RangeScan) -> StorageResult<Vec<Transaction>>;

    /// Transactions an account participated in, via the fan-out table.
    async fn scan_transactions_for_account(
        &self,
        account_id: i64,
        scan: &RangeScan,
    ) -> StorageResult<Vec<Transaction>>;
}

/// Repository for operations.
#[async_trait]
pub trait OperationRepository: Send + Sync {
    /// Get operation by id.
    async fn get_operation(&self, id: Toid) -> StorageResult<Option<Operation>>;

    /// Operations whose id falls inside the scan.
    async fn scan_operations(&self, scan: &RangeScan) -> StorageResult<Vec<Operation>>;

    /// Operations an account participated in, via the fan-out table.
    async fn scan_operations_for_account(
        &self,
        account_id: i64,
        scan: &RangeScan,
    ) -> StorageResult<Vec<Operation>>;
}

/// Repository for the address → surrogate id mapping.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn get_account_by_address(&self, address: &str) -> StorageResult<Option<Account>>;
}

// =============================================================================
// Composite Repository
// =============================================================================

/// Combined repository access for the history service.
#[async_trait]
pub trait Repositories: Send + Sync {
    /// Access the ledger repository.
    fn ledgers(&self) -> &dyn LedgerRepository;

    /// Access the transaction repository.
    fn transactions(&self) -> &dyn TransactionRepository;

    /// Access the operation repository.
    fn operations(&self) -> &dyn OperationRepository;

    /// Access the account repository.
    fn accounts(&self) -> &dyn AccountRepository;

    /// Cheap liveness probe of the backing store.
    async fn ping(&self) -> StorageResult<()>;
}
