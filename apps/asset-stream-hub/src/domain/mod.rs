//! Domain Layer - Core account and connection types.
//!
//! This layer contains the value types the hub distributes and the
//! identities it tracks, with no I/O. All money is `Decimal`.

/// Account snapshot value type and its arithmetic.
pub mod snapshot;

/// Connection identity and lifecycle states.
pub mod connection;
