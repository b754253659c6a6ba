//! Transaction repository implementation for PostgreSQL.

use async_trait::async_trait;
use sqlx::PgPool;

use annals_core::error::{StorageError, StorageResult};
use annals_core::models::{Transaction, TransactionHash, TransactionResult};
use annals_core::ports::{RangeScan, TransactionRepository};

use super::helpers::{
    bytes_to_hash32_strict, column_to_toid, column_to_u32, limit_param, order_sql, query_error,
};

const TRANSACTION_COLUMNS: &str = "t.id, t.hash, t.ledger_sequence, t.application_order, \
                                   t.source_account, t.source_account_sequence, t.fee_bid, \
                                   t.fee_charged, t.operation_count, t.result";

/// PostgreSQL implementation of TransactionRepository.
pub struct PgTransactionRepository {
    pool: PgPool,
}

impl PgTransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionRepository for PgTransactionRepository {
    async fn get_transaction(&self, hash: &TransactionHash) -> StorageResult<Option<Transaction>> {
        let query = format!("SELECT {TRANSACTION_COLUMNS} FROM history_transactions t WHERE t.hash = $1");

        let row = sqlx::query_as::<_, TransactionRow>(&query)
            .bind(&hash.0[..])
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;

        row.map(TransactionRow::into_transaction).transpose()
    }

    async fn scan_transactions(&self, scan: &RangeScan) -> StorageResult<Vec<Transaction>> {
        let query = format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM history_transactions t
            WHERE t.id >= $1 AND t.id < $2
            ORDER BY t.id {}
            LIMIT $3
            "#,
            order_sql(scan.order)
        );

        let rows: Vec<TransactionRow> = sqlx::query_as(&query)
            .bind(scan.range.start)
            .bind(scan.range.end)
            .bind(limit_param(scan.limit))
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;

        rows.into_iter().map(TransactionRow::into_transaction).collect()
    }

    async fn scan_transactions_for_account(
        &self,
        account_id: i64,
        scan: &RangeScan,
    ) -> StorageResult<Vec<Transaction>> {
        // Range and order run on the participant primary key; the join only
        // fetches bodies for the rows that survive the LIMIT.
        let query = format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM history_transaction_participants p
            JOIN history_transactions t ON t.id = p.history_transaction_id
            WHERE p.history_account_id = $1
              AND p.history_transaction_id >= $2
              AND p.history_transaction_id < $3
            ORDER BY p.history_transaction_id {}
            LIMIT $4
            "#,
            order_sql(scan.order)
        );

        let rows: Vec<TransactionRow> = sqlx::query_as(&query)
            .bind(account_id)
            .bind(scan.range.start)
            .bind(scan.range.end)
            .bind(limit_param(scan.limit))
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;

        rows.into_iter().map(TransactionRow::into_transaction).collect()
    }
}

/// Database row representation for Transaction.
#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: i64,
    hash: Vec<u8>,
    ledger_sequence: i32,
    application_order: i32,
    source_account: String,
    source_account_sequence: i64,
    fee_bid: i64,
    fee_charged: i64,
    operation_count: i32,
    result: String,
}

impl TransactionRow {
    fn into_transaction(self) -> StorageResult<Transaction> {
        let result: TransactionResult = self
            .result
            .parse()
            .map_err(|e| StorageError::SerializationError(format!("transaction.result: {e}")))?;

        Ok(Transaction {
            id: column_to_toid(self.id, "transaction.id")?,
            hash: TransactionHash(bytes_to_hash32_strict(self.hash, "transaction.hash")?),
            ledger_sequence: column_to_u32(self.ledger_sequence, "transaction.ledger_sequence")?,
            application_order: column_to_u32(
                self.application_order,
                "transaction.application_order",
            )?,
            source_account: self.source_account,
            source_account_sequence: self.source_account_sequence,
            fee_bid: self.fee_bid,
            fee_charged: self.fee_charged,
            operation_count: column_to_u32(self.operation_count, "transaction.operation_count")?,
            result,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use annals_core::toid::Toid;

    fn row(result: &str) -> TransactionRow {
        TransactionRow {
            id: Toid::encode(40, 2, 0).unwrap().as_i64(),
            hash: vec![0xab; 32],
            ledger_sequence: 40,
            application_order: 2,
            source_account: "GSOURCE".into(),
            source_account_sequence: 88,
            fee_bid: 300,
            fee_charged: 100,
            operation_count: 1,
            result: result.into(),
        }
    }

    #[test]
    fn row_converts_to_transaction() {
        let tx = row("bad_seq").into_transaction().unwrap();
        assert_eq!(tx.result, TransactionResult::BadSeq);
        assert_eq!(tx.id.decode(), (40, 2, 0));
        assert_eq!(tx.hash.to_hex(), "ab".repeat(32));
    }

    #[test]
    fn unknown_result_tag_is_a_serialization_error() {
        let err = row("exploded").into_transaction().unwrap_err();
        assert!(matches!(err, StorageError::SerializationError(_)));
        assert!(err.to_string().contains("exploded"));
    }
}
