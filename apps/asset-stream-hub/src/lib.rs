#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Asset Stream Hub - Account Snapshot Fan-out
//!
//! A WebSocket service that keeps a registry of connected clients and
//! pushes the same computed account snapshot to all of them once per tick.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Value types with no I/O
//!   - `snapshot`: Account snapshot and its arithmetic
//!   - `connection`: Connection identity and lifecycle
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Outbound sink and publisher interfaces
//!   - `services`: Periodic snapshot producer
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `hub`: Lock-guarded connection registry and fan-out
//!   - `websocket`: Upgrade handler and per-connection read loop
//!   - `server`: HTTP listener, health and metrics endpoints
//!   - `config`: Environment configuration
//!
//! # Data Flow
//!
//! ```text
//!                                 ┌──────────────┐
//!  SnapshotProducer ──snapshot──► │ ConnectionHub│──► Client 1
//!    (every tick)                 │  (registry)  │──► Client 2
//!                                 └──────▲───────┘──► Client N
//!                                        │ register / unregister
//!                                 ┌──────┴───────┐
//!  WebSocket clients ───upgrade──►│   Acceptor   │
//!                                 └──────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Snapshot and connection types with no I/O.
pub mod domain;

/// Application layer - Snapshot producer and port definitions.
pub mod application;

/// Infrastructure layer - Hub, transport adapters and observability.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::connection::{ClientIdentifier, ConnectionId, ConnectionState};
pub use domain::snapshot::{AccountParameters, Snapshot, SnapshotError};

// Ports and services
pub use application::ports::{BoxedSnapshotSink, SinkError, SnapshotPublisher, SnapshotSink};
pub use application::services::{
    FixedDelta, PriceDelta, ProducerSettings, SnapshotProducer, UniformDelta,
};

// Hub
pub use infrastructure::hub::{BroadcastReport, ConnectionHub, HubStats, SharedConnectionHub};

// Config
pub use infrastructure::config::{ConfigError, HubConfig, ProducerConfig, ServerSettings};

// Server
pub use infrastructure::server::{HubServer, HubServerState, ServerError, build_router};

// WebSocket acceptor
pub use infrastructure::websocket::{DisconnectCause, HandshakeError, WebSocketSink};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
