//! Read-only HTTP status server.
//!
//! Serves the aggregate pipeline status and each routed stage's latest
//! rendered report. Holds shared handles to the registry and status store
//! passed in at construction.

pub mod error;
pub mod handlers;
pub mod responses;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{info, warn};

use crate::core::{StageRegistry, StatusStore};

pub use error::{ApiError, ApiResult};
pub use handlers::{create_router, AppState};
pub use responses::StatusResponse;

/// HTTP server over the status store
pub struct StatusServer {
    host: String,
    port: u16,
    state: AppState,
}

impl StatusServer {
    /// Create a server for the given registry and store
    pub fn new(
        host: impl Into<String>,
        port: u16,
        registry: Arc<StageRegistry>,
        store: Arc<StatusStore>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            state: AppState::new(registry, store),
        }
    }

    /// Parsed bind address
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid listen address {}:{}", self.host, self.port))
    }

    /// Base URL for log output
    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Bind and serve until `shutdown` resolves
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.socket_addr()?;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind to {}", addr))?;

        info!("Status server listening on: {}", self.server_url());

        let app = create_router(self.state);
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .context("Status server error")
    }
}

/// Resolve on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix;
        match unix::signal(unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
                info!("Received TERM signal");
            }
            Err(e) => {
                warn!(error = %e, "Failed to install TERM handler");
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
