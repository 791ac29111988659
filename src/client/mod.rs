//! Client connections.
//!
//! # Data Flow
//! ```text
//! Server::create_client
//!     → Client (handle: id, peer, close flag, counters)   ← registry holds Arc<Client>
//!     → Session (task: socket halves, buffers, subscriptions, timers)
//!
//! Close paths (either may run first, both may run):
//!     Session exits (EOF, error, protocol violation, timer) → Client::close_connection
//!     Shutdown coordinator                                  → Client::close_connection
//!         → close flag set once → session woken → registry entry removed
//! ```
//!
//! # Design Decisions
//! - The session task is the only owner of the socket and the connection's
//!   private state; everything else talks to it through the handle
//! - Closing is idempotent and never takes the registry lock while holding
//!   any other lock

pub mod protocol;
pub mod session;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::{Duration, Instant, SystemTime};

use tokio::sync::watch;

use crate::net::ConnectionId;
use crate::observability::metrics;
use crate::server::auth::Credentials;
use crate::server::registry::Registry;
use crate::server::stats::Stats;

pub use session::{ArmedTimers, Session, SessionContext, SessionTimers};

/// Handle to one accepted connection.
#[derive(Debug)]
pub struct Client {
    id: ConnectionId,
    peer_addr: SocketAddr,
    connected_at: SystemTime,
    started: Instant,
    /// Credentials from the first `CONNECT`, immutable afterwards.
    credentials: OnceLock<Credentials>,
    stats: Stats,
    subscriptions: AtomicUsize,
    closed: AtomicBool,
    close_tx: watch::Sender<bool>,
    registry: Weak<Registry>,
}

impl Client {
    pub fn new(id: ConnectionId, peer_addr: SocketAddr, registry: Weak<Registry>) -> Arc<Self> {
        let (close_tx, _) = watch::channel(false);
        Arc::new(Self {
            id,
            peer_addr,
            connected_at: SystemTime::now(),
            started: Instant::now(),
            credentials: OnceLock::new(),
            stats: Stats::default(),
            subscriptions: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            close_tx,
            registry,
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn connected_at(&self) -> SystemTime {
        self.connected_at
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.get()
    }

    /// Per-connection traffic counters.
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Force-terminate the connection.
    ///
    /// Safe to call any number of times from any task, concurrently with the
    /// session's own close path. Returns `true` only for the call that
    /// actually closed it. Must not be called with the registry lock held.
    pub fn close_connection(&self) -> bool {
        if self
            .closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        self.close_tx.send_replace(true);
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
        metrics::record_connection_closed();
        tracing::debug!(connection_id = %self.id, peer_addr = %self.peer_addr, "Client connection closed");
        true
    }

    pub(crate) fn record_credentials(&self, credentials: Credentials) {
        // Later CONNECTs cannot replace the snapshot.
        let _ = self.credentials.set(credentials);
    }

    pub(crate) fn set_subscription_count(&self, count: usize) {
        self.subscriptions.store(count, Ordering::Relaxed);
    }

    pub(crate) fn close_signal(&self) -> watch::Receiver<bool> {
        self.close_tx.subscribe()
    }
}
