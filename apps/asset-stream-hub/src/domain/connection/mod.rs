//! Connection Identity Types
//!
//! Identity and lifecycle of one client session as seen by the hub.
//!
//! ```text
//! Pending ──register──► Registered ──read error──► Unregistered
//!                           │
//!                           └──write failure──► Closed
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a registered connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Allocates fresh connection ids; never hands out the same id twice.
#[derive(Debug)]
pub struct ConnectionIdAllocator {
    next: AtomicU64,
}

impl ConnectionIdAllocator {
    /// Create an allocator starting at id 1.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Allocate the next id.
    pub fn allocate(&self) -> ConnectionId {
        ConnectionId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Identifier a client may send as its first message.
pub type ClientIdentifier = String;

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Upgraded, not yet in the registry.
    Pending,
    /// In the registry, receiving broadcasts.
    Registered,
    /// Removed after a read error or peer close.
    Unregistered,
    /// Removed after a failed broadcast write.
    Closed,
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn allocator_yields_distinct_ids() {
        let allocator = ConnectionIdAllocator::new();
        let ids: HashSet<_> = (0..1_000).map(|_| allocator.allocate()).collect();
        assert_eq!(ids.len(), 1_000);
    }

    #[test]
    fn allocator_starts_at_one() {
        let allocator = ConnectionIdAllocator::new();
        assert_eq!(allocator.allocate().to_string(), "conn-1");
        assert_eq!(allocator.allocate().to_string(), "conn-2");
    }

    #[test]
    fn default_allocator_matches_new() {
        let allocator = ConnectionIdAllocator::default();
        assert_eq!(allocator.allocate().to_string(), "conn-1");
    }
}
