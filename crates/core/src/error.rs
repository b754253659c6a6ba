//! Error types for the history domain layer.
//!
//! This module defines a hierarchy of error types:
//!
//! - [`ToidError`] - TOID encoding and parsing failures
//! - [`StorageError`] - Database/repository errors
//! - [`DomainError`] - Everything a history request can fail with
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

// =============================================================================
// TOID Errors
// =============================================================================

/// Failures of the TOID codec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToidError {
    /// A component does not fit in its bit field.
    #[error("{field} {value} exceeds the maximum of {max}")]
    EncodingOverflow {
        field: &'static str,
        value: u32,
        max: u32,
    },

    /// A raw id was negative.
    #[error("id must be non-negative, got {0}")]
    Negative(i64),

    /// A string could not be read as an id.
    #[error("not a decimal id: {0:?}")]
    Unparseable(String),
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Database and repository errors.
///
/// These errors originate from storage operations like queries,
/// connections, and row decoding.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Failed to establish database connection.
    #[error("Database connection error: {0}")]
    ConnectionError(String),

    /// SQL query execution failed.
    #[error("Query execution error: {0}")]
    QueryError(String),

    /// Query did not finish within the configured budget.
    #[error("Query timed out after {0} ms")]
    Timeout(u64),

    /// Database migration failed.
    #[error("Migration error: {0}")]
    MigrationError(String),

    /// A stored row could not be turned into a domain model.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

// =============================================================================
// Domain Errors
// =============================================================================

/// Errors surfaced by history queries.
///
/// Each variant maps to a stable identifier (see [`DomainError::code`]) so
/// API clients can branch on it.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Cursor string is not `now`, an integer, or an integer pair.
    #[error("Malformed cursor: {0}")]
    MalformedCursor(String),

    /// Order token is neither `asc` nor `desc`.
    #[error("Invalid order: {0:?} (expected \"asc\" or \"desc\")")]
    InvalidOrder(String),

    /// Limit is not an integer between 1 and the configured maximum.
    #[error("Invalid limit {limit:?}: must be an integer between 1 and {max}")]
    InvalidLimit { limit: String, max: u64 },

    /// The requested position predates the retained history window.
    #[error("Cursor {cursor} is before the oldest retained ledger {elder}")]
    Gone { cursor: i64, elder: u32 },

    /// A single record lookup found nothing.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A TOID component exceeded its field width.
    #[error("TOID encoding overflow: {0}")]
    EncodingOverflow(#[from] ToidError),

    /// The storage collaborator failed.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[from] StorageError),
}

impl DomainError {
    /// Stable, machine-readable identifier of the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::MalformedCursor(_) => "malformed_cursor",
            DomainError::InvalidOrder(_) => "invalid_order",
            DomainError::InvalidLimit { .. } => "invalid_limit",
            DomainError::Gone { .. } => "before_history",
            DomainError::NotFound(_) => "not_found",
            DomainError::EncodingOverflow(_) => "encoding_overflow",
            DomainError::StorageUnavailable(_) => "storage_unavailable",
        }
    }

    /// Whether a caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DomainError::StorageUnavailable(_))
    }

    /// Whether the request itself was at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            DomainError::MalformedCursor(_)
                | DomainError::InvalidOrder(_)
                | DomainError::InvalidLimit { .. }
                | DomainError::Gone { .. }
                | DomainError::NotFound(_)
        )
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_error_surfaces_as_retryable_domain_error() {
        let domain_err: DomainError = StorageError::Timeout(250).into();

        assert!(domain_err.is_retryable());
        assert!(!domain_err.is_client_error());
        assert_eq!(domain_err.code(), "storage_unavailable");
        assert!(domain_err.to_string().contains("250 ms"));
    }

    #[test]
    fn gone_and_malformed_have_distinct_codes() {
        let gone = DomainError::Gone {
            cursor: 42,
            elder: 100,
        };
        let malformed = DomainError::MalformedCursor("abc".into());

        assert_ne!(gone.code(), malformed.code());
        assert!(!gone.is_retryable());
        assert!(gone.to_string().contains("100"));
    }

    #[test]
    fn overflow_names_the_component() {
        let err: DomainError = ToidError::EncodingOverflow {
            field: "operation_order",
            value: 5000,
            max: 4095,
        }
        .into();

        assert_eq!(err.code(), "encoding_overflow");
        assert!(err.to_string().contains("operation_order"));
    }
}
