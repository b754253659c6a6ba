//! HTTP API for the Annals history service.
//!
//! Paged, read-only access to ledgers, transactions and operations:
//!
//! ```text
//! GET /ledgers?cursor=now&order=desc&limit=20
//! GET /accounts/{address}/operations?cursor=12884905984-8589938688
//! ```
//!
//! Pages carry a `next_cursor`; failures are JSON problem documents
//! whose `type` tells a malformed request (400) from pruned history (410).

mod problem;
mod resources;
mod routes;
mod server;

pub use problem::{ApiError, INVALID_REQUEST, Problem, status_of};
pub use resources::{
    LedgerResource, OperationResource, Page, PageInfo, Record, StatusResource,
    TransactionResource,
};
pub use routes::router;
pub use server::{ServerConfig, serve_with_shutdown};
