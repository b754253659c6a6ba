//! Ledger repository implementation for PostgreSQL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use annals_core::error::{StorageError, StorageResult};
use annals_core::models::{Ledger, LedgerHash};
use annals_core::ports::{LedgerRepository, RangeScan};
use annals_core::toid::Toid;

use super::database::Database;
use super::helpers::{
    bytes_to_hash32_strict, bytes_to_optional_hash32, column_to_toid, column_to_u32,
    limit_param, order_sql, query_error,
};

const LEDGER_COLUMNS: &str = "id, sequence, hash, previous_hash, transaction_count, \
                              operation_count, closed_at";

/// PostgreSQL implementation of LedgerRepository.
pub struct PgLedgerRepository {
    pool: PgPool,
}

impl PgLedgerRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }
}

#[async_trait]
impl LedgerRepository for PgLedgerRepository {
    async fn get_ledger(&self, sequence: u32) -> StorageResult<Option<Ledger>> {
        let id = Toid::ledger(sequence).map_err(|e| StorageError::QueryError(e.to_string()))?;
        let query = format!("SELECT {LEDGER_COLUMNS} FROM history_ledgers WHERE id = $1");

        let row = sqlx::query_as::<_, LedgerRow>(&query)
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;

        row.map(LedgerRow::into_ledger).transpose()
    }

    async fn scan_ledgers(&self, scan: &RangeScan) -> StorageResult<Vec<Ledger>> {
        // Only the direction keyword is interpolated; it comes from an enum.
        let query = format!(
            r#"
            SELECT {LEDGER_COLUMNS}
            FROM history_ledgers
            WHERE id >= $1 AND id < $2
            ORDER BY id {}
            LIMIT $3
            "#,
            order_sql(scan.order)
        );

        let rows: Vec<LedgerRow> = sqlx::query_as(&query)
            .bind(scan.range.start)
            .bind(scan.range.end)
            .bind(limit_param(scan.limit))
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;

        rows.into_iter().map(LedgerRow::into_ledger).collect()
    }

    async fn ledger_range(&self) -> StorageResult<Option<(u32, u32)>> {
        // MIN/MAX return NULL when the table is empty
        let row: (Option<i32>, Option<i32>) =
            sqlx::query_as("SELECT MIN(sequence), MAX(sequence) FROM history_ledgers")
                .fetch_one(&self.pool)
                .await
                .map_err(query_error)?;

        match row {
            (Some(elder), Some(latest)) => Ok(Some((
                column_to_u32(elder, "ledger.sequence")?,
                column_to_u32(latest, "ledger.sequence")?,
            ))),
            _ => Ok(None),
        }
    }
}

/// Database row representation for Ledger.
#[derive(sqlx::FromRow)]
struct LedgerRow {
    id: i64,
    sequence: i32,
    hash: Vec<u8>,
    previous_hash: Option<Vec<u8>>,
    transaction_count: i32,
    operation_count: i32,
    closed_at: DateTime<Utc>,
}

impl LedgerRow {
    fn into_ledger(self) -> StorageResult<Ledger> {
        Ok(Ledger {
            id: column_to_toid(self.id, "ledger.id")?,
            sequence: column_to_u32(self.sequence, "ledger.sequence")?,
            hash: LedgerHash(bytes_to_hash32_strict(self.hash, "ledger.hash")?),
            previous_hash: bytes_to_optional_hash32(self.previous_hash, "ledger.previous_hash")?
                .map(LedgerHash),
            transaction_count: column_to_u32(self.transaction_count, "ledger.transaction_count")?,
            operation_count: column_to_u32(self.operation_count, "ledger.operation_count")?,
            closed_at: self.closed_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> LedgerRow {
        LedgerRow {
            id: Toid::ledger(12).unwrap().as_i64(),
            sequence: 12,
            hash: vec![7u8; 32],
            previous_hash: Some(vec![6u8; 32]),
            transaction_count: 3,
            operation_count: 9,
            closed_at: DateTime::from_timestamp(1_600_000_000, 0).unwrap(),
        }
    }

    #[test]
    fn row_converts_to_ledger() {
        let ledger = row().into_ledger().unwrap();
        assert_eq!(ledger.sequence, 12);
        assert_eq!(ledger.id.ledger_sequence(), 12);
        assert_eq!(ledger.previous_hash, Some(LedgerHash([6u8; 32])));
        assert_eq!(ledger.operation_count, 9);
    }

    #[test]
    fn corrupt_rows_are_rejected() {
        let mut bad = row();
        bad.hash = vec![0u8; 32];
        assert!(bad.into_ledger().is_err());

        let mut bad = row();
        bad.transaction_count = -1;
        assert!(bad.into_ledger().is_err());
    }
}
