//! Prometheus Metrics Module
//!
//! Exposes hub metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Connections**: registered clients and removals by reason
//! - **Broadcasts**: completed passes, per-connection outcomes and pass latency
//! - **Handshakes**: connections rejected before registration
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the hub's HTTP port. Recording
//! before [`init_metrics`] is called is a no-op.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Safe to call more than once; later calls return the first handle.
///
/// # Errors
///
/// Returns an error if another global recorder is already installed.
pub fn init_metrics() -> Result<PrometheusHandle, metrics_exporter_prometheus::BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();

    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_gauge!("asset_hub_connections", "Number of registered clients");
    describe_counter!(
        "asset_hub_connections_registered_total",
        "Total clients registered"
    );
    describe_counter!(
        "asset_hub_connections_removed_total",
        "Total clients removed by reason"
    );
    describe_counter!(
        "asset_hub_snapshots_broadcast_total",
        "Total broadcast passes completed"
    );
    describe_counter!(
        "asset_hub_deliveries_total",
        "Per-connection delivery outcomes"
    );
    describe_counter!(
        "asset_hub_handshake_failures_total",
        "Connections dropped before registration"
    );
    describe_histogram!(
        "asset_hub_broadcast_seconds",
        "Duration of one broadcast pass"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Why a connection left the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// Peer closed or inbound read failed.
    Disconnected,
    /// Outbound write failed during broadcast.
    WriteFailed,
}

impl RemovalReason {
    /// Label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "read",
            Self::WriteFailed => "write",
        }
    }
}

/// Update the registered connection gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_connections(count: usize) {
    gauge!("asset_hub_connections").set(count as f64);
}

/// Record a registration.
pub fn record_registered() {
    counter!("asset_hub_connections_registered_total").increment(1);
}

/// Record a removal.
pub fn record_removed(reason: RemovalReason) {
    counter!(
        "asset_hub_connections_removed_total",
        "reason" => reason.as_str()
    )
    .increment(1);
}

/// Record a completed broadcast pass.
pub fn record_broadcast(duration: Duration) {
    counter!("asset_hub_snapshots_broadcast_total").increment(1);
    histogram!("asset_hub_broadcast_seconds").record(duration.as_secs_f64());
}

/// Record per-connection delivery outcomes of one pass.
pub fn record_deliveries(ok: u64, failed: u64) {
    counter!("asset_hub_deliveries_total", "outcome" => "ok").increment(ok);
    counter!("asset_hub_deliveries_total", "outcome" => "failed").increment(failed);
}

/// Record a connection rejected during the identifier handshake.
pub fn record_handshake_failure() {
    counter!("asset_hub_handshake_failures_total").increment(1);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removal_reason_as_str() {
        assert_eq!(RemovalReason::Disconnected.as_str(), "read");
        assert_eq!(RemovalReason::WriteFailed.as_str(), "write");
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        set_connections(3);
        record_registered();
        record_removed(RemovalReason::WriteFailed);
        record_broadcast(Duration::from_millis(2));
        record_deliveries(2, 1);
        record_handshake_failure();
    }
}
