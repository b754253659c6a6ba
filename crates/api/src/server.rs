//! HTTP server.

use std::future::Future;
use std::sync::Arc;

use tracing::debug;

use annals_core::services::HistoryService;

use crate::routes::router;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Serve the history API until `shutdown_signal` resolves.
pub async fn serve_with_shutdown<F>(
    service: Arc<HistoryService>,
    config: ServerConfig,
    shutdown_signal: F,
) -> Result<(), std::io::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(service);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    debug!(addr = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_binds_all_interfaces() {
        assert_eq!(ServerConfig::default().addr(), "0.0.0.0:8000");
    }
}
