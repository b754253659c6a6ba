//! Storage layer for the Annals history service.
//!
//! This crate provides PostgreSQL implementations of the repository traits
//! defined in `annals-core`. It handles connection pooling, migrations and
//! the range scans that back every history page.
//!
//! # Architecture
//!
//! The storage layer follows the repository pattern:
//!
//! - [`postgres::Database`] - Connection pool management
//! - [`postgres::PgRepositories`] - Composite repository for all entity types
//! - Individual repositories for ledgers, transactions, operations and accounts
//!
//! Every history table is keyed by its TOID (or `(account, TOID)` for the
//! participant tables), so each page is a single primary key range scan.
//!
//! # Usage
//!
//! ```ignore
//! use annals_storage::{Database, DatabaseConfig, PgRepositories};
//!
//! // Connect to the database
//! let config = DatabaseConfig::for_api(&database_url);
//! let db = Database::connect(&config).await?;
//!
//! // Run migrations
//! db.migrate().await?;
//!
//! // Create repositories
//! let repositories = Arc::new(PgRepositories::new(Arc::new(db)));
//! ```

pub mod postgres;

pub use postgres::{Database, DatabaseConfig, PgRepositories};
