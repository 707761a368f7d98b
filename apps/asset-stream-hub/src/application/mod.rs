//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the snapshot producer and the port interface the
//! hub writes through, so the hub never depends on a concrete transport.

/// Port interfaces for outbound connection halves.
pub mod ports;

/// Application services (snapshot production).
pub mod services;
