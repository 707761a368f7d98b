//! Hub HTTP Server
//!
//! Single listener serving the WebSocket endpoint alongside health checks
//! and Prometheus metrics.
//!
//! # Endpoints
//!
//! - `GET <ws_path>` - WebSocket upgrade (default `/ws`)
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Liveness probe (simple OK)
//! - `GET /metrics` - Prometheus metrics in text format

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;

use crate::infrastructure::config::ServerSettings;
use crate::infrastructure::hub::{HubStats, SharedConnectionHub};
use crate::infrastructure::metrics::get_metrics_handle;
use crate::infrastructure::websocket::ws_handler;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always "healthy" while the process serves requests.
    pub status: &'static str,
    /// Hub version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Hub counters.
    pub hub: HubStats,
}

// =============================================================================
// Server State
// =============================================================================

/// Shared state for HTTP handlers.
pub struct HubServerState {
    version: String,
    started_at: Instant,
    hub: SharedConnectionHub,
    identify_clients: bool,
}

impl HubServerState {
    /// Create new server state.
    #[must_use]
    pub fn new(version: String, hub: SharedConnectionHub, identify_clients: bool) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            hub,
            identify_clients,
        }
    }

    /// Hub handle.
    #[must_use]
    pub fn hub(&self) -> SharedConnectionHub {
        Arc::clone(&self.hub)
    }

    /// Whether new connections must send a client identifier first.
    #[must_use]
    pub const fn identify_clients(&self) -> bool {
        self.identify_clients
    }
}

// =============================================================================
// Router & Server
// =============================================================================

/// Build the router with all routes.
pub fn build_router(state: Arc<HubServerState>, ws_path: &str) -> Router {
    Router::new()
        .route(ws_path, get(ws_handler))
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Bound hub HTTP server.
pub struct HubServer {
    listener: TcpListener,
    router: Router,
}

impl HubServer {
    /// Bind the listener.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::BindFailed` if the port cannot be bound.
    pub async fn bind(
        settings: &ServerSettings,
        state: Arc<HubServerState>,
    ) -> Result<Self, ServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindFailed(settings.port, e.to_string()))?;

        Ok(Self {
            listener,
            router: build_router(state, &settings.ws_path),
        })
    }

    /// Address actually bound (useful with port 0).
    ///
    /// # Errors
    ///
    /// Returns an error if the socket address cannot be read.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        self.listener
            .local_addr()
            .map_err(|e| ServerError::ServerFailed(e.to_string()))
    }

    /// Serve until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::ServerFailed` if the HTTP server fails.
    pub async fn run<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Ok(addr) = self.listener.local_addr() {
            tracing::info!(addr = %addr, "Hub server listening");
        }

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Hub server stopped");
        Ok(())
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HubServerState>>) -> impl IntoResponse {
    (StatusCode::OK, Json(build_health_response(&state)))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            )
        },
    )
}

fn build_health_response(state: &HubServerState) -> HealthResponse {
    HealthResponse {
        status: "healthy",
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        hub: state.hub.stats(),
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Hub server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================
