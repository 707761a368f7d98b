//! Application Services
//!
//! - `producer`: periodic snapshot generation feeding the hub

/// Periodic snapshot producer.
pub mod producer;

pub use producer::{FixedDelta, PriceDelta, ProducerSettings, SnapshotProducer, UniformDelta};
