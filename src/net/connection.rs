//! Connection identity.
//!
//! # Responsibilities
//! - Generate unique connection IDs for registry keys and tracing
//! - Ids are per-server, monotonically increasing, never reused

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Wrap a raw id value.
    pub const fn from_u64(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cid:{}", self.0)
    }
}

/// Hands out connection ids for one server.
///
/// Relaxed ordering is sufficient: only uniqueness matters, the registry
/// lock orders everything else.
#[derive(Debug, Default)]
pub struct ConnectionIdGenerator {
    last: AtomicU64,
}

impl ConnectionIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id. The first id handed out is 1.
    pub fn next_id(&self) -> ConnectionId {
        ConnectionId(self.last.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Most recently allocated id value (0 before any allocation).
    #[cfg(test)]
    pub(crate) fn last(&self) -> u64 {
        self.last.load(Ordering::Relaxed)
    }
}
