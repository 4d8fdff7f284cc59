//! HTTP transport for the demo server.
//!
//! Serves the application router with axum and shuts down gracefully on
//! SIGINT/SIGTERM, closing the connection pool once in-flight requests have
//! released their connections.

use crate::db::DbPool;
use crate::error::{DbError, DbResult};
use crate::scope::ConnectionLifecycle;
use crate::transport::routes;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

/// How long in-flight requests get to finish after a shutdown signal.
const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpTransport {
    lifecycle: Arc<ConnectionLifecycle<DbPool>>,
    /// Host to bind to
    host: String,
    /// Port to bind to
    port: u16,
}

impl HttpTransport {
    pub fn new(
        lifecycle: Arc<ConnectionLifecycle<DbPool>>,
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            lifecycle,
            host: host.into(),
            port,
        }
    }

    /// Get the bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The router served by [`HttpTransport::run`].
    pub fn router(&self) -> axum::Router {
        routes::router(self.lifecycle.clone())
    }

    /// Serve until a shutdown signal arrives, then close the pool.
    pub async fn run(&self) -> DbResult<()> {
        let bind_addr = self.bind_addr();
        info!(
            transaction = self.lifecycle.options().transaction,
            "Starting HTTP server on {}", bind_addr
        );

        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            DbError::connection(
                format!("Failed to bind to {}: {}", bind_addr, e),
                "Check that the port is available",
            )
        })?;

        let shutdown_notify = Arc::new(tokio::sync::Notify::new());
        let shutdown_notify_clone = shutdown_notify.clone();

        let shutdown_signal = async move {
            wait_for_signal().await;
            shutdown_notify_clone.notify_one();
        };

        let server = axum::serve(listener, self.router()).with_graceful_shutdown(shutdown_signal);

        // A slow handler can hold its connection indefinitely; force exit after
        // the timeout or on a second signal.
        tokio::select! {
            result = server => {
                match result {
                    Ok(()) => info!("HTTP server stopped"),
                    Err(e) => {
                        error!(error = %e, "HTTP server error");
                        return Err(DbError::internal(format!("HTTP server error: {}", e)));
                    }
                }
            }
            _ = async {
                shutdown_notify.notified().await;
                info!(
                    timeout_secs = GRACEFUL_TIMEOUT.as_secs(),
                    "Waiting for requests to finish (send signal again to force exit)..."
                );

                tokio::select! {
                    _ = tokio::time::sleep(GRACEFUL_TIMEOUT) => {
                        warn!("Graceful shutdown timeout, forcing exit");
                    }
                    _ = wait_for_signal() => {
                        warn!("Received second signal, forcing immediate exit");
                    }
                }
            } => {}
        }

        info!(open = self.lifecycle.pool().size(), "Closing connection pool");
        self.lifecycle.pool().close().await;

        Ok(())
    }
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_signal() {
    let ctrl_c = signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LifecycleOptions, PoolOptions};
    use crate::models::ConnectionConfig;

    async fn transport(host: &str, port: u16) -> HttpTransport {
        let config = ConnectionConfig::new("sqlite::memory:", PoolOptions::default()).unwrap();
        let lifecycle = ConnectionLifecycle::connect(&config, LifecycleOptions::new())
            .await
            .unwrap();
        HttpTransport::new(Arc::new(lifecycle), host, port)
    }

    #[tokio::test]
    async fn test_http_transport_bind_addr() {
        let transport = transport("0.0.0.0", 3000).await;
        assert_eq!(transport.bind_addr(), "0.0.0.0:3000");
    }

    #[tokio::test]
    async fn test_router_serves_health_without_connection() {
        use axum::body::Body;
        use axum::http::{Request, StatusCode};
        use tower::ServiceExt;

        let transport = transport("127.0.0.1", 8080).await;
        let response = transport
            .router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
