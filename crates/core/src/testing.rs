//! In-memory repositories and fixtures for tests.
//!
//! Compiled for this crate's own tests and, through the `test-utils`
//! feature, for downstream crates exercising the service without Postgres.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{StorageError, StorageResult};
use crate::models::{
    Account, Ledger, LedgerHash, Operation, OperationType, Transaction, TransactionHash,
    TransactionResult,
};
use crate::ports::{
    AccountRepository, LedgerRepository, OperationRepository, OrderDirection, RangeScan,
    Repositories, TransactionRepository,
};
use crate::toid::Toid;

#[derive(Debug, Default)]
struct Tables {
    ledgers: BTreeMap<i64, Ledger>,
    transactions: BTreeMap<i64, Transaction>,
    operations: BTreeMap<i64, Operation>,
    accounts: BTreeMap<String, Account>,
    /// `(account id, operation id)`
    operation_participants: BTreeSet<(i64, i64)>,
    /// `(account id, transaction id)`
    transaction_participants: BTreeSet<(i64, i64)>,
}

impl Tables {
    fn account_id(&mut self, address: &str) -> i64 {
        let next = self.accounts.len() as i64 + 1;
        self.accounts
            .entry(address.to_string())
            .or_insert_with(|| Account {
                id: next,
                address: address.to_string(),
            })
            .id
    }
}

/// Repositories backed by ordered maps.
///
/// Scans honour [`RangeScan`] the way the SQL adapter does, so paging
/// behaviour observed here carries over.
#[derive(Debug, Default)]
pub struct MemoryRepositories {
    tables: RwLock<Tables>,
    unavailable: AtomicBool,
    latency: Mutex<Option<Duration>>,
}

impl MemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledgers `sequences`, each with `transactions` transactions of
    /// `operations` operations. Every transaction's source account is
    /// recorded as a participant of it and of its operations.
    pub fn populated(sequences: RangeInclusive<u32>, transactions: u32, operations: u32) -> Self {
        let repos = Self::new();
        for sequence in sequences {
            let mut header = ledger(sequence);
            header.transaction_count = transactions;
            header.operation_count = transactions * operations;
            repos.insert_ledger(header);

            for t in 1..=transactions {
                let mut tx = transaction(sequence, t);
                tx.operation_count = operations;
                repos.add_transaction_participant(&tx.source_account, tx.id);
                for o in 1..=operations {
                    let op = operation(sequence, t, o);
                    repos.add_operation_participant(&op.source_account, op.id);
                    repos.insert_operation(op);
                }
                repos.insert_transaction(tx);
            }
        }
        repos
    }

    pub fn insert_ledger(&self, ledger: Ledger) {
        self.write().ledgers.insert(ledger.id.as_i64(), ledger);
    }

    pub fn insert_transaction(&self, tx: Transaction) {
        self.write().transactions.insert(tx.id.as_i64(), tx);
    }

    pub fn insert_operation(&self, op: Operation) {
        self.write().operations.insert(op.id.as_i64(), op);
    }

    /// Link `address` to an operation, creating the account on first use.
    pub fn add_operation_participant(&self, address: &str, operation_id: Toid) -> i64 {
        let mut tables = self.write();
        let account_id = tables.account_id(address);
        tables
            .operation_participants
            .insert((account_id, operation_id.as_i64()));
        account_id
    }

    /// Link `address` to a transaction, creating the account on first use.
    pub fn add_transaction_participant(&self, address: &str, transaction_id: Toid) -> i64 {
        let mut tables = self.write();
        let account_id = tables.account_id(address);
        tables
            .transaction_participants
            .insert((account_id, transaction_id.as_i64()));
        account_id
    }

    /// Drop every ledger below `sequence` with everything it owns.
    pub fn prune_before(&self, sequence: u32) {
        let cutoff = Toid::ledger(sequence).map(Toid::as_i64).unwrap_or(0);
        let mut tables = self.write();
        tables.ledgers.retain(|id, _| *id >= cutoff);
        tables.transactions.retain(|id, _| *id >= cutoff);
        tables.operations.retain(|id, _| *id >= cutoff);
        tables.operation_participants.retain(|(_, id)| *id >= cutoff);
        tables.transaction_participants.retain(|(_, id)| *id >= cutoff);
    }

    /// Make every call fail as if the database were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock().unwrap_or_else(PoisonError::into_inner) = latency;
    }

    async fn gate(&self) -> StorageResult<()> {
        let latency = *self.latency.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::ConnectionError("connection refused".into()));
        }
        Ok(())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn scan_map<T: Clone>(rows: &BTreeMap<i64, T>, scan: &RangeScan) -> Vec<T> {
    if scan.range.is_empty() {
        return Vec::new();
    }
    let hits = rows.range(scan.range.start..scan.range.end).map(|(_, row)| row.clone());
    take_ordered(hits, scan)
}

fn scan_participants<T: Clone>(
    links: &BTreeSet<(i64, i64)>,
    rows: &BTreeMap<i64, T>,
    account_id: i64,
    scan: &RangeScan,
) -> Vec<T> {
    if scan.range.is_empty() {
        return Vec::new();
    }
    let hits = links
        .range((account_id, scan.range.start)..(account_id, scan.range.end))
        .filter_map(|(_, id)| rows.get(id).cloned());
    take_ordered(hits, scan)
}

fn take_ordered<T>(hits: impl DoubleEndedIterator<Item = T>, scan: &RangeScan) -> Vec<T> {
    let limit = usize::try_from(scan.limit).unwrap_or(usize::MAX);
    match scan.order {
        OrderDirection::Asc => hits.take(limit).collect(),
        OrderDirection::Desc => hits.rev().take(limit).collect(),
    }
}

#[async_trait]
impl LedgerRepository for MemoryRepositories {
    async fn get_ledger(&self, sequence: u32) -> StorageResult<Option<Ledger>> {
        self.gate().await?;
        let id = Toid::ledger(sequence).map_err(|e| StorageError::QueryError(e.to_string()))?;
        Ok(self.read().ledgers.get(&id.as_i64()).cloned())
    }

    async fn scan_ledgers(&self, scan: &RangeScan) -> StorageResult<Vec<Ledger>> {
        self.gate().await?;
        Ok(scan_map(&self.read().ledgers, scan))
    }

    async fn ledger_range(&self) -> StorageResult<Option<(u32, u32)>> {
        self.gate().await?;
        let tables = self.read();
        let first = tables.ledgers.values().next().map(|l| l.sequence);
        let last = tables.ledgers.values().next_back().map(|l| l.sequence);
        Ok(first.zip(last))
    }
}

#[async_trait]
impl TransactionRepository for MemoryRepositories {
    async fn get_transaction(&self, hash: &TransactionHash) -> StorageResult<Option<Transaction>> {
        self.gate().await?;
        Ok(self
            .read()
            .transactions
            .values()
            .find(|tx| &tx.hash == hash)
            .cloned())
    }

    async fn scan_transactions(&self, scan: &RangeScan) -> StorageResult<Vec<Transaction>> {
        self.gate().await?;
        Ok(scan_map(&self.read().transactions, scan))
    }

    async fn scan_transactions_for_account(
        &self,
        account_id: i64,
        scan: &RangeScan,
    ) -> StorageResult<Vec<Transaction>> {
        self.gate().await?;
        let tables = self.read();
        Ok(scan_participants(
            &tables.transaction_participants,
            &tables.transactions,
            account_id,
            scan,
        ))
    }
}

#[async_trait]
impl OperationRepository for MemoryRepositories {
    async fn get_operation(&self, id: Toid) -> StorageResult<Option<Operation>> {
        self.gate().await?;
        Ok(self.read().operations.get(&id.as_i64()).cloned())
    }

    async fn scan_operations(&self, scan: &RangeScan) -> StorageResult<Vec<Operation>> {
        self.gate().await?;
        Ok(scan_map(&self.read().operations, scan))
    }

    async fn scan_operations_for_account(
        &self,
        account_id: i64,
        scan: &RangeScan,
    ) -> StorageResult<Vec<Operation>> {
        self.gate().await?;
        let tables = self.read();
        Ok(scan_participants(
            &tables.operation_participants,
            &tables.operations,
            account_id,
            scan,
        ))
    }
}

#[async_trait]
impl AccountRepository for MemoryRepositories {
    async fn get_account_by_address(&self, address: &str) -> StorageResult<Option<Account>> {
        self.gate().await?;
        Ok(self.read().accounts.get(address).cloned())
    }
}

#[async_trait]
impl Repositories for MemoryRepositories {
    fn ledgers(&self) -> &dyn LedgerRepository {
        self
    }

    fn transactions(&self) -> &dyn TransactionRepository {
        self
    }

    fn operations(&self) -> &dyn OperationRepository {
        self
    }

    fn accounts(&self) -> &dyn AccountRepository {
        self
    }

    async fn ping(&self) -> StorageResult<()> {
        self.gate().await
    }
}

// =============================================================================
// Fixtures
// =============================================================================

fn fixture_hash(tag: u8, id: i64) -> [u8; 32] {
    let mut bytes = [0u8; 32];
    bytes[0] = tag;
    bytes[24..].copy_from_slice(&id.to_be_bytes());
    bytes
}

fn closed_at(sequence: u32) -> DateTime<Utc> {
    DateTime::from_timestamp(1_500_000_000 + i64::from(sequence) * 5, 0).unwrap_or_default()
}

/// Address used as the source account of `(ledger, transaction order)`.
pub fn source_address(ledger: u32, transaction_order: u32) -> String {
    format!("G{:055}", u64::from(ledger) * 1_000 + u64::from(transaction_order))
}

/// A ledger header with empty counters.
pub fn ledger(sequence: u32) -> Ledger {
    let id = Toid::ledger(sequence).expect("fixture ledger sequence in range");
    let previous_hash = (sequence > 1).then(|| {
        let prev = Toid::ledger(sequence - 1).expect("fixture ledger sequence in range");
        LedgerHash(fixture_hash(b'L', prev.as_i64()))
    });
    Ledger {
        id,
        sequence,
        hash: LedgerHash(fixture_hash(b'L', id.as_i64())),
        previous_hash,
        transaction_count: 0,
        operation_count: 0,
        closed_at: closed_at(sequence),
    }
}

/// A successful transaction at `(ledger, order)`.
pub fn transaction(ledger: u32, order: u32) -> Transaction {
    let id = Toid::encode(ledger, order, 0).expect("fixture transaction in range");
    Transaction {
        id,
        hash: TransactionHash(fixture_hash(b'T', id.as_i64())),
        ledger_sequence: ledger,
        application_order: order,
        source_account: source_address(ledger, order),
        source_account_sequence: i64::from(order),
        fee_bid: 200,
        fee_charged: 100,
        operation_count: 0,
        result: TransactionResult::Success,
    }
}

/// A payment operation at `(ledger, transaction order, operation order)`.
pub fn operation(ledger: u32, transaction_order: u32, order: u32) -> Operation {
    let id = Toid::encode(ledger, transaction_order, order).expect("fixture operation in range");
    Operation {
        id,
        transaction_id: id.transaction_id(),
        application_order: order,
        source_account: source_address(ledger, transaction_order),
        kind: OperationType::Payment,
        details: BTreeMap::from([("amount".to_string(), format!("{order}.0"))]),
    }
}

/// Hash the fixture transaction at `(ledger, order)` carries.
pub fn transaction_hash(ledger: u32, order: u32) -> TransactionHash {
    transaction(ledger, order).hash
}
