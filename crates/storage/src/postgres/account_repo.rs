//! Account repository implementation for PostgreSQL.

use async_trait::async_trait;
use sqlx::PgPool;

use annals_core::error::StorageResult;
use annals_core::models::Account;
use annals_core::ports::AccountRepository;

use super::helpers::query_error;

/// PostgreSQL implementation of AccountRepository.
pub struct PgAccountRepository {
    pool: PgPool,
}

impl PgAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountRepository for PgAccountRepository {
    async fn get_account_by_address(&self, address: &str) -> StorageResult<Option<Account>> {
        let row: Option<(i64, String)> =
            sqlx::query_as("SELECT id, address FROM history_accounts WHERE address = $1")
                .bind(address)
                .fetch_optional(&self.pool)
                .await
                .map_err(query_error)?;

        Ok(row.map(|(id, address)| Account { id, address }))
    }
}
