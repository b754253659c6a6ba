//! PostgreSQL storage adapter.
//!
//! This module implements the repository traits defined in `annals-core`
//! using PostgreSQL as the backing store. Every query is read-only; the
//! tables are written by ingestion.
//!
//! # Architecture
//!
//! - [`Database`] - Connection pool and migrations
//! - [`PgRepositories`] - Composite repository implementing `Repositories` trait
//! - Individual repos: `PgLedgerRepository`, `PgTransactionRepository`, etc.
//!
//! # Usage
//!
//! ```ignore
//! let config = DatabaseConfig::for_api(&database_url);
//! let db = Database::connect(&config).await?;
//! db.migrate().await?;
//!
//! let repositories = PgRepositories::new(Arc::new(db));
//! ```

mod account_repo;
mod database;
mod helpers;
mod ledger_repo;
mod operation_repo;
mod transaction_repo;

pub use account_repo::PgAccountRepository;
pub use database::{Database, DatabaseConfig};
pub use ledger_repo::PgLedgerRepository;
pub use operation_repo::PgOperationRepository;
pub use transaction_repo::PgTransactionRepository;

use std::sync::Arc;

use async_trait::async_trait;

use annals_core::error::StorageResult;
use annals_core::ports::{
    AccountRepository, LedgerRepository, OperationRepository, Repositories,
    TransactionRepository,
};

// =============================================================================
// Composite Repository
// =============================================================================

/// Aggregated PostgreSQL repositories implementing the `Repositories` trait.
///
/// This provides a single entry point for all history reads over one pool.
pub struct PgRepositories {
    db: Arc<Database>,
    ledgers: PgLedgerRepository,
    transactions: PgTransactionRepository,
    operations: PgOperationRepository,
    accounts: PgAccountRepository,
}

impl PgRepositories {
    /// Create a new repository aggregate from a database connection.
    pub fn new(db: Arc<Database>) -> Self {
        let pool = db.pool().clone();
        Self {
            ledgers: PgLedgerRepository::new(&db),
            transactions: PgTransactionRepository::new(pool.clone()),
            operations: PgOperationRepository::new(pool.clone()),
            accounts: PgAccountRepository::new(pool),
            db,
        }
    }
}

#[async_trait]
impl Repositories for PgRepositories {
    fn ledgers(&self) -> &dyn LedgerRepository {
        &self.ledgers
    }

    fn transactions(&self) -> &dyn TransactionRepository {
        &self.transactions
    }

    fn operations(&self) -> &dyn OperationRepository {
        &self.operations
    }

    fn accounts(&self) -> &dyn AccountRepository {
        &self.accounts
    }

    async fn ping(&self) -> StorageResult<()> {
        self.db.ping().await
    }
}
