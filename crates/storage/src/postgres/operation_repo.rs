//! Operation repository implementation for PostgreSQL.

use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::PgPool;

use annals_core::error::{StorageError, StorageResult};
use annals_core::models::{Operation, OperationType};
use annals_core::ports::{OperationRepository, RangeScan};
use annals_core::toid::Toid;

use super::helpers::{column_to_toid, column_to_u32, limit_param, order_sql, query_error};

const OPERATION_COLUMNS: &str = "o.id, o.transaction_id, o.application_order, \
                                 o.source_account, o.type AS kind, o.details";

/// PostgreSQL implementation of OperationRepository.
pub struct PgOperationRepository {
    pool: PgPool,
}

impl PgOperationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OperationRepository for PgOperationRepository {
    async fn get_operation(&self, id: Toid) -> StorageResult<Option<Operation>> {
        let query = format!("SELECT {OPERATION_COLUMNS} FROM history_operations o WHERE o.id = $1");

        let row = sqlx::query_as::<_, OperationRow>(&query)
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error)?;

        row.map(OperationRow::into_operation).transpose()
    }

    async fn scan_operations(&self, scan: &RangeScan) -> StorageResult<Vec<Operation>> {
        let query = format!(
            r#"
            SELECT {OPERATION_COLUMNS}
            FROM history_operations o
            WHERE o.id >= $1 AND o.id < $2
            ORDER BY o.id {}
            LIMIT $3
            "#,
            order_sql(scan.order)
        );

        let rows: Vec<OperationRow> = sqlx::query_as(&query)
            .bind(scan.range.start)
            .bind(scan.range.end)
            .bind(limit_param(scan.limit))
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;

        rows.into_iter().map(OperationRow::into_operation).collect()
    }

    async fn scan_operations_for_account(
        &self,
        account_id: i64,
        scan: &RangeScan,
    ) -> StorageResult<Vec<Operation>> {
        let query = format!(
            r#"
            SELECT {OPERATION_COLUMNS}
            FROM history_operation_participants p
            JOIN history_operations o ON o.id = p.history_operation_id
            WHERE p.history_account_id = $1
              AND p.history_operation_id >= $2
              AND p.history_operation_id < $3
            ORDER BY p.history_operation_id {}
            LIMIT $4
            "#,
            order_sql(scan.order)
        );

        let rows: Vec<OperationRow> = sqlx::query_as(&query)
            .bind(account_id)
            .bind(scan.range.start)
            .bind(scan.range.end)
            .bind(limit_param(scan.limit))
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;

        rows.into_iter().map(OperationRow::into_operation).collect()
    }
}

/// Database row representation for Operation.
#[derive(sqlx::FromRow)]
struct OperationRow {
    id: i64,
    transaction_id: i64,
    application_order: i32,
    source_account: String,
    kind: i16,
    details: serde_json::Value,
}

impl OperationRow {
    fn into_operation(self) -> StorageResult<Operation> {
        let kind = OperationType::from_code(self.kind).ok_or_else(|| {
            StorageError::SerializationError(format!("operation.type: unknown code {}", self.kind))
        })?;
        let details: BTreeMap<String, String> = serde_json::from_value(self.details)
            .map_err(|e| StorageError::SerializationError(format!("operation.details: {e}")))?;

        Ok(Operation {
            id: column_to_toid(self.id, "operation.id")?,
            transaction_id: column_to_toid(self.transaction_id, "operation.transaction_id")?,
            application_order: column_to_u32(self.application_order, "operation.application_order")?,
            source_account: self.source_account,
            kind,
            details,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(kind: i16, details: serde_json::Value) -> OperationRow {
        OperationRow {
            id: Toid::encode(5, 1, 2).unwrap().as_i64(),
            transaction_id: Toid::encode(5, 1, 0).unwrap().as_i64(),
            application_order: 2,
            source_account: "GSOURCE".into(),
            kind,
            details,
        }
    }

    #[test]
    fn row_converts_to_operation() {
        let op = row(1, json!({"amount": "12.5", "asset": "native"}))
            .into_operation()
            .unwrap();
        assert_eq!(op.kind, OperationType::Payment);
        assert_eq!(op.details["asset"], "native");
        assert_eq!(op.id.transaction_id(), op.transaction_id);
    }

    #[test]
    fn unknown_type_and_bad_details_are_rejected() {
        assert!(row(42, json!({})).into_operation().is_err());
        assert!(row(1, json!({"amount": 12})).into_operation().is_err());
    }
}
