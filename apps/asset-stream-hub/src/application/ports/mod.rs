//! Port Interfaces
//!
//! ## Driven Ports (Outbound)
//!
//! - `SnapshotSink`: the write half of one client connection. The hub
//!   owns one boxed sink per registered connection and is the only
//!   writer to it.
//! - `SnapshotPublisher`: where the producer sends each snapshot.

use async_trait::async_trait;

use crate::domain::snapshot::Snapshot;

/// Error writing to or closing a connection.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The peer is gone or the transport rejected the write.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// The connection was already closed.
    #[error("connection closed")]
    Closed,
}

/// Outbound half of a client connection.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SnapshotSink: Send {
    /// Deliver one text frame.
    ///
    /// # Errors
    ///
    /// Returns `SinkError` if the frame could not be written; the hub
    /// treats any error as a dead connection.
    async fn send_text(&mut self, payload: &str) -> Result<(), SinkError>;

    /// Release the transport. Called at most once by the hub.
    async fn close(&mut self);
}

/// Boxed sink as stored in the registry.
pub type BoxedSnapshotSink = Box<dyn SnapshotSink>;

/// Entry point the producer hands each snapshot to.
#[async_trait]
pub trait SnapshotPublisher: Send + Sync {
    /// Deliver one snapshot to every current subscriber.
    async fn publish(&self, snapshot: &Snapshot);
}
