//! Core domain layer for the Annals history service.
//!
//! This crate contains the TOID codec, the domain models, port traits
//! (interfaces), and the paging services that serve ordered history. It
//! follows hexagonal architecture principles - this is the innermost layer
//! with no dependencies on infrastructure.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      annals (binary)                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │        annals-api (HTTP)       │   annals-storage (Postgres)│
//! ├────────────────────────────────┴────────────────────────────┤
//! │                     annals-core  ← YOU ARE HERE             │
//! │       (toid, ledger state, models, ports, services)         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`toid`] - Total order identifiers
//! - [`ledger_state`] - Lock-free snapshot of the retained window
//! - [`models`] - Domain models (Ledger, Transaction, Operation, ...)
//! - [`ports`] - Paging types and repository traits
//! - [`services`] - Window validation, history queries, range sync
//! - [`error`] - Domain error types
//! - [`metrics`] - Prometheus metrics definitions
//!
//! # Key Concepts
//!
//! ## Ordering
//!
//! Every ledger, transaction and operation has a [`toid::Toid`]. Comparing
//! two ids numerically compares `(ledger, transaction, operation)`, so one
//! integer orders all three collections and doubles as a page cursor.
//!
//! ## Retention
//!
//! History is pruned from the old end a whole ledger at a time. The
//! [`ledger_state::LedgerState`] tracks `{elder, latest}`; a descending walk
//! that starts before `elder` is answered with
//! [`error::DomainError::Gone`] rather than an empty page.
//!
//! ## Request Lifecycle
//!
//! 1. Read the ledger state snapshot
//! 2. Parse cursor, order and limit into a [`ports::PageQuery`]
//! 3. Validate against the window ([`services::HistoryWindowValidator`])
//! 4. Run one bounded range scan through [`ports::Repositories`]
//! 5. Return a [`ports::Connection`] with the next cursor

pub mod error;
pub mod ledger_state;
pub mod metrics;
pub mod models;
pub mod ports;
pub mod services;
pub mod toid;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
