//! zrx API - HTTP front for the export stream
//!
//! One content-negotiated endpoint plus static documents:
//!
//! - `GET /v1/events/zabbix/` - `Accept: text/event-stream` opens the live
//!   SSE stream; `Accept: application/json` returns a recent-history
//!   snapshot from the replay ring; anything else gets the HTML demo page.
//! - `GET /v1/events/zabbix/openapi.json` - the OpenAPI document.
//! - `GET /` - redirects to the endpoint.
//! - anything else - `404 Not Found` (plain text).
//!
//! Snapshot query parameters (JSON mode): `family`, `limit` (1..=10000,
//! default 100), `sinceId` (default 0).

mod error;
pub mod routes;
pub mod state;

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use error::ApiError;
pub use state::AppState;

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Bind address
    pub address: String,
    /// Listen port
    pub port: u16,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".into(),
            port: 3000,
        }
    }
}

impl ApiServerConfig {
    /// Config with a custom port
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    /// The socket address to bind to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

/// The HTTP front, serving hub registrations and ring queries
pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
}

impl ApiServer {
    /// Create a server over the shared ring and hub.
    pub fn new(config: ApiServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Bind and serve until cancelled.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), ApiError> {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| ApiError::Bind {
                address: bind_addr.clone(),
                source: e,
            })?;

        let local_addr: Option<SocketAddr> = listener.local_addr().ok();
        info!(address = %bind_addr, local = ?local_addr, "http server listening");

        let app = routes::build_router(self.state);
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(cancel))
            .await
            .map_err(ApiError::Serve)?;

        info!("http server stopped");
        Ok(())
    }
}

/// Shutdown signal future
async fn shutdown_signal(cancel: CancellationToken) {
    cancel.cancelled().await;
}
