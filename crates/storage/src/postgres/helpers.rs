//! Shared helper functions for PostgreSQL row conversion.

use annals_core::error::{StorageError, StorageResult};
use annals_core::ports::OrderDirection;
use annals_core::toid::Toid;

/// Convert a `Vec<u8>` to a fixed-size 32-byte array.
///
/// Returns an error if the length doesn't match.
pub fn bytes_to_hash32(bytes: Vec<u8>, field_name: &str) -> StorageResult<[u8; 32]> {
    bytes.try_into().map_err(|v: Vec<u8>| {
        StorageError::SerializationError(format!(
            "{} has invalid length: expected 32, got {}",
            field_name,
            v.len()
        ))
    })
}

/// Convert a `Vec<u8>` to a 32-byte array, rejecting all-zero values as corrupt.
///
/// This is stricter than `bytes_to_hash32` and should be used for ledger
/// and transaction hashes where all-zeros indicates data corruption.
pub fn bytes_to_hash32_strict(bytes: Vec<u8>, field_name: &str) -> StorageResult<[u8; 32]> {
    let arr = bytes_to_hash32(bytes, field_name)?;

    if arr == [0u8; 32] {
        return Err(StorageError::SerializationError(format!(
            "{} is all zeros, which indicates data corruption",
            field_name
        )));
    }

    Ok(arr)
}

/// Convert an optional `Vec<u8>` to an optional 32-byte array.
pub fn bytes_to_optional_hash32(
    bytes: Option<Vec<u8>>,
    field_name: &str,
) -> StorageResult<Option<[u8; 32]>> {
    match bytes {
        Some(b) => Ok(Some(bytes_to_hash32(b, field_name)?)),
        None => Ok(None),
    }
}

/// Read a stored id column as a [`Toid`].
pub fn column_to_toid(value: i64, field_name: &str) -> StorageResult<Toid> {
    Toid::from_i64(value)
        .map_err(|e| StorageError::SerializationError(format!("{field_name}: {e}")))
}

/// Read a non-negative integer column as `u32`.
pub fn column_to_u32(value: i32, field_name: &str) -> StorageResult<u32> {
    u32::try_from(value).map_err(|_| {
        StorageError::SerializationError(format!("{field_name} is negative: {value}"))
    })
}

/// `ORDER BY` keyword for a scan direction.
pub fn order_sql(order: OrderDirection) -> &'static str {
    match order {
        OrderDirection::Asc => "ASC",
        OrderDirection::Desc => "DESC",
    }
}

/// Row count for a `LIMIT` bind parameter.
pub fn limit_param(limit: u64) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

pub fn query_error(e: sqlx::Error) -> StorageError {
    StorageError::QueryError(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_rejects_zero_hash() {
        let zeros = vec![0u8; 32];
        let result = bytes_to_hash32_strict(zeros, "ledger.hash");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("corruption"));
    }

    #[test]
    fn error_includes_field_name() {
        let bad_bytes = vec![1u8; 16];
        let result = bytes_to_hash32(bad_bytes, "ledger.previous_hash");
        let err = result.unwrap_err().to_string();
        assert!(err.contains("ledger.previous_hash"));
        assert!(err.contains("expected 32"));
    }

    #[test]
    fn negative_columns_are_corrupt() {
        assert!(column_to_toid(-1, "operation.id").is_err());
        assert!(column_to_u32(-3, "ledger.sequence").is_err());
        assert_eq!(column_to_u32(7, "ledger.sequence").unwrap(), 7);
    }

    #[test]
    fn limit_saturates() {
        assert_eq!(limit_param(11), 11);
        assert_eq!(limit_param(u64::MAX), i64::MAX);
    }
}
