//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the connection hub and the concrete adapters
//! around it: the WebSocket acceptor, HTTP server, configuration, and
//! observability.

/// Connection registry and snapshot fan-out.
pub mod hub;

/// WebSocket upgrade, client handshake and per-connection read loop.
pub mod websocket;

/// HTTP listener hosting the WebSocket path and health endpoints.
pub mod server;

/// Configuration loading.
pub mod config;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;
