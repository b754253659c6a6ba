//! PostgreSQL database connection and configuration.

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{debug, instrument};

use annals_core::error::{StorageError, StorageResult};

/// Database configuration.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
    /// Minimum number of connections to maintain.
    pub min_connections: u32,
    /// Connection acquisition timeout.
    pub acquire_timeout: Duration,
    /// Idle connection timeout.
    pub idle_timeout: Duration,
    /// Maximum connection lifetime.
    pub max_lifetime: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/annals".to_string(),
            max_connections: 20,
            min_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
        }
    }
}

impl DatabaseConfig {
    /// Create a configuration for serving API reads.
    ///
    /// Acquisition fails fast so a saturated pool surfaces as
    /// `storage_unavailable` instead of queueing requests.
    pub fn for_api(url: &str) -> Self {
        Self {
            url: url.to_string(),
            max_connections: 15,
            min_connections: 2,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(300),
            max_lifetime: Duration::from_secs(900),
        }
    }

    /// Create a small configuration for a one-shot migration run.
    pub fn for_migrations(url: &str) -> Self {
        Self {
            url: url.to_string(),
            max_connections: 1,
            min_connections: 0,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(60),
            max_lifetime: Duration::from_secs(300),
        }
    }
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to the database with the given configuration.
    #[instrument(skip_all)]
    pub async fn connect(config: &DatabaseConfig) -> StorageResult<Self> {
        debug!(
            max_conn = config.max_connections,
            min_conn = config.min_connections,
            "Creating connection pool"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .max_lifetime(Some(config.max_lifetime))
            .connect(&config.url)
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        debug!("Connection pool created");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn migrate(&self) -> StorageResult<()> {
        debug!("Running migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::MigrationError(e.to_string()))?;

        debug!("Migrations completed");

        Ok(())
    }

    /// Round-trip a trivial query.
    pub async fn ping(&self) -> StorageResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;
        Ok(())
    }

    /// Close the connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_pool_fails_fast() {
        let config = DatabaseConfig::for_api("postgres://u:p@db/annals");
        assert_eq!(config.url, "postgres://u:p@db/annals");
        assert!(config.acquire_timeout < DatabaseConfig::default().acquire_timeout);
    }

    #[test]
    fn migration_pool_is_single_connection() {
        let config = DatabaseConfig::for_migrations("postgres://db/annals");
        assert_eq!(config.max_connections, 1);
        assert_eq!(config.min_connections, 0);
    }
}
