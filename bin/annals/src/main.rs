//! Annals - ledger history service.
//!
//! # Usage
//!
//! ```bash
//! # Start with default config
//! annals
//!
//! # Start with environment overrides
//! DATABASE_URL=postgres://localhost/annals HTTP_PORT=8080 annals
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::signal;
use tokio::sync::watch;
use tracing::{Instrument, debug, error, info, info_span, warn};
use tracing_subscriber::{EnvFilter, fmt};

use annals_api::{ServerConfig, serve_with_shutdown};
use annals_core::ledger_state::LedgerState;
use annals_core::metrics::init_metrics;
use annals_core::ports::{PagingConfig, Repositories};
use annals_core::services::{HistoryConfig, HistoryService, LedgerStateSync};
use annals_storage::{Database, DatabaseConfig, PgRepositories};

/// Annals CLI - ledger history service.
#[derive(Parser, Debug)]
#[command(name = "annals")]
#[command(about = "Annals - paged ledger history over a pruned store")]
#[command(version)]
struct Cli {
    /// PostgreSQL database URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost/annals"
    )]
    database_url: String,

    /// HTTP API port.
    #[arg(long, env = "HTTP_PORT", default_value = "8000")]
    http_port: u16,

    /// Prometheus metrics port.
    #[arg(long, env = "METRICS_PORT", default_value = "9090")]
    metrics_port: u16,

    /// Enable JSON log output.
    #[arg(long, env = "JSON_LOGS")]
    json_logs: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Page size when a request gives no limit.
    #[arg(long, env = "DEFAULT_PAGE_LIMIT", default_value = "10")]
    default_page_limit: u64,

    /// Largest accepted page size.
    #[arg(long, env = "MAX_PAGE_LIMIT", default_value = "200")]
    max_page_limit: u64,

    /// Budget for a single storage query, in milliseconds.
    #[arg(long, env = "QUERY_TIMEOUT_MS", default_value = "5000")]
    query_timeout_ms: u64,

    /// How often the retained ledger range is re-read, in milliseconds.
    #[arg(long, env = "LEDGER_STATE_REFRESH_MS", default_value = "1000")]
    ledger_state_refresh_ms: u64,

    /// Run database migrations and exit.
    #[arg(long)]
    migrate_only: bool,
}

impl Cli {
    fn history_config(&self) -> Result<HistoryConfig> {
        anyhow::ensure!(
            self.max_page_limit > 0,
            "MAX_PAGE_LIMIT must be positive"
        );
        anyhow::ensure!(
            (1..=self.max_page_limit).contains(&self.default_page_limit),
            "DEFAULT_PAGE_LIMIT must be between 1 and MAX_PAGE_LIMIT ({})",
            self.max_page_limit
        );
        Ok(HistoryConfig {
            paging: PagingConfig {
                default_limit: self.default_page_limit,
                max_limit: self.max_page_limit,
            },
            query_timeout: Duration::from_millis(self.query_timeout_ms),
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json_logs);
    let history_config = cli.history_config()?;

    // Prometheus metrics exporter (optional - failures don't crash the app)
    let metrics_enabled =
        match format!("0.0.0.0:{}", cli.metrics_port).parse::<std::net::SocketAddr>() {
            Ok(metrics_addr) => {
                match PrometheusBuilder::new()
                    .with_http_listener(metrics_addr)
                    .install()
                {
                    Ok(()) => {
                        init_metrics();
                        true
                    }
                    Err(e) => {
                        warn!(
                            "⚠️  Failed to start metrics exporter: {}. Continuing without metrics.",
                            e
                        );
                        false
                    }
                }
            }
            Err(e) => {
                warn!("⚠️  Invalid metrics address: {}. Continuing without metrics.", e);
                false
            }
        };

    // ─────────────────────────────────────────────────────────────────────────
    // 🚀 STARTUP
    // ─────────────────────────────────────────────────────────────────────────
    info!("🚀 Starting Annals");
    debug!(database_url = %mask_password(&cli.database_url), "Database endpoint");
    debug!(
        default_limit = history_config.paging.default_limit,
        max_limit = history_config.paging.max_limit,
        query_timeout_ms = cli.query_timeout_ms,
        "Paging policy"
    );

    // ─────────────────────────────────────────────────────────────────────────
    // 🗄️ DATABASE
    // ─────────────────────────────────────────────────────────────────────────
    let db_config = if cli.migrate_only {
        DatabaseConfig::for_migrations(&cli.database_url)
    } else {
        DatabaseConfig::for_api(&cli.database_url)
    };

    info!("🗄️  Connecting to database...");
    let db = Database::connect(&db_config)
        .await
        .context("Failed to connect to database")?;

    db.migrate().await.context("Failed to run migrations")?;
    info!("🗄️  Database ready (migrations applied)");

    if cli.migrate_only {
        info!("🛑 --migrate-only flag set, exiting");
        db.close().await;
        return Ok(());
    }

    let db = Arc::new(db);
    let repositories: Arc<dyn Repositories> = Arc::new(PgRepositories::new(db.clone()));

    // ─────────────────────────────────────────────────────────────────────────
    // 📚 HISTORY WINDOW
    // ─────────────────────────────────────────────────────────────────────────
    let ledger_state = Arc::new(LedgerState::new());
    let sync = LedgerStateSync::new(
        repositories.clone(),
        ledger_state.clone(),
        Duration::from_millis(cli.ledger_state_refresh_ms),
    );

    match sync.refresh().await {
        Ok(snapshot) if snapshot.is_empty() => info!("📚 History is empty"),
        Ok(snapshot) => info!(
            elder = snapshot.elder,
            latest = snapshot.latest,
            "📚 History window loaded"
        ),
        // The sync loop keeps retrying; requests see an empty history until then.
        Err(e) => warn!(error = %e, "⚠️  Initial history window unavailable"),
    }

    let service = Arc::new(HistoryService::new(
        repositories,
        ledger_state,
        history_config,
    ));

    // ─────────────────────────────────────────────────────────────────────────
    // ⚡ SERVICES START
    // ─────────────────────────────────────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut http_shutdown_rx = shutdown_tx.subscribe();

    let server_config = ServerConfig {
        host: "0.0.0.0".to_string(),
        port: cli.http_port,
    };

    let http_handle = tokio::spawn(
        async move {
            let shutdown_signal = async move {
                while !*http_shutdown_rx.borrow() {
                    if http_shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
            };

            if let Err(e) = serve_with_shutdown(service, server_config, shutdown_signal).await {
                error!(error = %e, "❌ Server error");
            }
            debug!("Server stopped");
        }
        .instrument(info_span!("http")),
    );

    let sync_handle = tokio::spawn(
        async move {
            sync.run(shutdown_rx).await;
        }
        .instrument(info_span!("ledger_state")),
    );

    // ─────────────────────────────────────────────────────────────────────────
    // ✅ READY
    // ─────────────────────────────────────────────────────────────────────────
    info!("✅ Annals ready");
    info!("   ⚡ HTTP:     http://localhost:{}/ledgers", cli.http_port);
    if metrics_enabled {
        info!(
            "   📊 Metrics:  http://localhost:{}/metrics",
            cli.metrics_port
        );
    } else {
        info!("   📊 Metrics:  disabled");
    }
    info!("   Press Ctrl+C to stop");

    shutdown_signal().await;

    // ─────────────────────────────────────────────────────────────────────────
    // 🛑 SHUTDOWN
    // ─────────────────────────────────────────────────────────────────────────
    info!("🛑 Shutting down...");
    let _ = shutdown_tx.send(true);

    match tokio::time::timeout(Duration::from_secs(10), http_handle).await {
        Ok(_) => debug!("HTTP server stopped"),
        Err(_) => warn!("⚠️  HTTP shutdown timed out"),
    }

    match tokio::time::timeout(Duration::from_secs(5), sync_handle).await {
        Ok(_) => debug!("Ledger state sync stopped"),
        Err(_) => warn!("⚠️  Ledger state sync shutdown timed out"),
    }

    db.close().await;

    info!("🛑 Shutdown complete");
    Ok(())
}

/// Initialize tracing subscriber.
fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        fmt().with_env_filter(filter).json().init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .init();
    }
}

/// Mask password in database URL for logging.
fn mask_password(url_str: &str) -> String {
    match url::Url::parse(url_str) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some("****"));
            }
            url.to_string()
        }
        Err(_) => url_str.to_string(),
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// A handler that cannot be installed never fires; the other one still does.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "❌ Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "❌ Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("annals").chain(args.iter().copied()))
    }

    #[test]
    fn mask_password_hides_credentials() {
        assert_eq!(
            mask_password("postgres://user:secret@db:5432/annals"),
            "postgres://user:****@db:5432/annals"
        );
        assert_eq!(mask_password("not a url"), "not a url");
    }

    #[test]
    fn paging_flags_build_history_config() {
        let config = cli(&[
            "--default-page-limit",
            "25",
            "--max-page-limit",
            "50",
            "--query-timeout-ms",
            "750",
        ])
        .history_config()
        .unwrap();
        assert_eq!(config.paging.default_limit, 25);
        assert_eq!(config.paging.max_limit, 50);
        assert_eq!(config.query_timeout, Duration::from_millis(750));
    }

    #[test]
    fn default_limit_above_max_is_rejected() {
        let result = cli(&["--default-page-limit", "300"]).history_config();
        assert!(result.is_err());
    }
}
