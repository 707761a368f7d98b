//! Connection Hub
//!
//! Single authority over which connections currently receive snapshots.
//!
//! # Locking
//!
//! The registry lives behind one async mutex. Registration,
//! unregistration and the whole broadcast pass hold it for their full
//! duration, so:
//! - no connection is added or removed while a pass iterates the registry
//! - two broadcast passes never overlap
//! - a sink is always removed from the registry before it is closed
//!
//! A consumer that stalls on write stalls the entire pass; there is no
//! per-write timeout. Closing a sink after a failed write also stops that
//! connection's read task, so the socket is released without waiting on
//! the peer. Read-only counters are mirrored in atomics so
//! health checks never wait behind a stalled pass.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::application::ports::{BoxedSnapshotSink, SnapshotPublisher};
use crate::domain::connection::{
    ClientIdentifier, ConnectionId, ConnectionIdAllocator, ConnectionState,
};
use crate::domain::snapshot::Snapshot;
use crate::infrastructure::metrics::{self, RemovalReason};

// =============================================================================
// Registry Entry
// =============================================================================

/// One registered connection.
struct Connection {
    sink: BoxedSnapshotSink,
    client_id: Option<ClientIdentifier>,
    registered_at: DateTime<Utc>,
}

impl Connection {
    fn client_label(&self) -> &str {
        self.client_id.as_deref().unwrap_or("-")
    }
}

// =============================================================================
// Reports & Stats
// =============================================================================

/// Outcome of one broadcast pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Connections a delivery was attempted to.
    pub attempted: usize,
    /// Connections that accepted the frame.
    pub delivered: usize,
    /// Connections removed because delivery failed.
    pub removed: Vec<ConnectionId>,
}

/// Hub counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    /// Currently registered connections.
    pub connections: usize,
    /// Connections registered since start.
    pub total_registered: u64,
    /// Connections removed after a read error or peer close.
    pub removed_on_disconnect: u64,
    /// Connections removed after a failed write.
    pub removed_on_write_failure: u64,
    /// Completed broadcast passes.
    pub broadcasts: u64,
}

// =============================================================================
// Hub
// =============================================================================

/// Registry of live connections and fan-out point for snapshots.
///
/// # Example
///
/// ```rust
/// use asset_stream_hub::ConnectionHub;
///
/// let hub = ConnectionHub::new();
/// assert_eq!(hub.connection_count(), 0);
/// ```
pub struct ConnectionHub {
    registry: Mutex<HashMap<ConnectionId, Connection>>,
    ids: ConnectionIdAllocator,
    connection_count: AtomicUsize,
    total_registered: AtomicU64,
    removed_on_disconnect: AtomicU64,
    removed_on_write_failure: AtomicU64,
    broadcasts: AtomicU64,
}

impl Default for ConnectionHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionHub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(HashMap::new()),
            ids: ConnectionIdAllocator::new(),
            connection_count: AtomicUsize::new(0),
            total_registered: AtomicU64::new(0),
            removed_on_disconnect: AtomicU64::new(0),
            removed_on_write_failure: AtomicU64::new(0),
            broadcasts: AtomicU64::new(0),
        }
    }

    /// Add a connection to the registry.
    ///
    /// Each call allocates a fresh id, so the same connection can never
    /// appear twice.
    pub async fn register(
        &self,
        sink: BoxedSnapshotSink,
        client_id: Option<ClientIdentifier>,
    ) -> ConnectionId {
        let id = self.ids.allocate();
        let mut registry = self.registry.lock().await;

        tracing::info!(
            connection_id = %id,
            client_id = client_id.as_deref().unwrap_or("-"),
            state = ?ConnectionState::Registered,
            total = registry.len() + 1,
            "Client registered"
        );

        registry.insert(
            id,
            Connection {
                sink,
                client_id,
                registered_at: Utc::now(),
            },
        );
        self.connection_count.store(registry.len(), Ordering::Relaxed);
        self.total_registered.fetch_add(1, Ordering::Relaxed);
        metrics::record_registered();
        metrics::set_connections(registry.len());

        id
    }

    /// Remove a connection and close its channel.
    ///
    /// Returns `false` if the id was not registered; calling this for an
    /// already removed connection does nothing.
    pub async fn unregister(&self, id: ConnectionId) -> bool {
        let mut registry = self.registry.lock().await;

        let Some(mut connection) = registry.remove(&id) else {
            tracing::debug!(connection_id = %id, "Unregister of unknown connection ignored");
            return false;
        };

        connection.sink.close().await;

        self.connection_count.store(registry.len(), Ordering::Relaxed);
        self.removed_on_disconnect.fetch_add(1, Ordering::Relaxed);
        metrics::record_removed(RemovalReason::Disconnected);
        metrics::set_connections(registry.len());

        tracing::info!(
            connection_id = %id,
            client_id = connection.client_label(),
            connected_secs = (Utc::now() - connection.registered_at).num_seconds(),
            state = ?ConnectionState::Unregistered,
            total = registry.len(),
            "Client disconnected"
        );

        true
    }

    /// Deliver a snapshot to every registered connection.
    ///
    /// Connections whose write fails are removed and closed in the same
    /// pass without retry; delivery to the rest continues.
    pub async fn broadcast(&self, snapshot: &Snapshot) -> BroadcastReport {
        let payload = match snapshot.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode snapshot");
                return BroadcastReport::default();
            }
        };

        let mut registry = self.registry.lock().await;
        let started = Instant::now();

        let mut report = BroadcastReport {
            attempted: registry.len(),
            ..BroadcastReport::default()
        };

        for (id, connection) in registry.iter_mut() {
            match connection.sink.send_text(&payload).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        connection_id = %id,
                        client_id = connection.client_label(),
                        error = %e,
                        "Write to client failed"
                    );
                    report.removed.push(*id);
                }
            }
        }

        for id in &report.removed {
            if let Some(mut connection) = registry.remove(id) {
                connection.sink.close().await;
                metrics::record_removed(RemovalReason::WriteFailed);
                tracing::debug!(
                    connection_id = %id,
                    client_id = connection.client_label(),
                    state = ?ConnectionState::Closed,
                    "Client connection closed"
                );
            }
        }

        let removed = report.removed.len() as u64;
        self.connection_count.store(registry.len(), Ordering::Relaxed);
        self.removed_on_write_failure
            .fetch_add(removed, Ordering::Relaxed);
        self.broadcasts.fetch_add(1, Ordering::Relaxed);

        metrics::record_broadcast(started.elapsed());
        metrics::record_deliveries(report.delivered as u64, removed);
        metrics::set_connections(registry.len());

        if removed > 0 {
            tracing::info!(
                removed,
                total = registry.len(),
                "Removed clients after failed delivery"
            );
        }

        report
    }

    /// Number of registered connections.
    ///
    /// Does not take the registry lock.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connection_count.load(Ordering::Relaxed)
    }

    /// Whether `id` is currently registered.
    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.registry.lock().await.contains_key(&id)
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> HubStats {
        HubStats {
            connections: self.connection_count(),
            total_registered: self.total_registered.load(Ordering::Relaxed),
            removed_on_disconnect: self.removed_on_disconnect.load(Ordering::Relaxed),
            removed_on_write_failure: self.removed_on_write_failure.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl SnapshotPublisher for ConnectionHub {
    async fn publish(&self, snapshot: &Snapshot) {
        let _ = self.broadcast(snapshot).await;
    }
}

/// Shared hub reference.
pub type SharedConnectionHub = Arc<ConnectionHub>;

// =============================================================================
// Tests
// =============================================================================
