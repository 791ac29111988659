//! Live-connection registry and accept-loop state.
//!
//! # Responsibilities
//! - Map connection ids to client handles
//! - Hold the running flag and the listener handle under the same lock
//! - Give the shutdown coordinator one consistent view to act on
//!
//! # Design Decisions
//! - One `parking_lot::Mutex`; it is never held across an await or while
//!   closing a client (closing re-enters `remove`)
//! - Inserts are refused once the server stopped running, so a connection
//!   accepted during shutdown cannot leak into the map
//! - Snapshots are owned copies, iterated without the lock

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::client::Client;
use crate::net::{ConnectionId, ListenerHandle};
use crate::observability::metrics;

/// Accept loop lifecycle as seen through the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptPhase {
    /// No accept loop has started.
    Idle,
    /// Accept loop is binding its listener.
    Starting,
    /// Listener stored, accepting connections.
    Running,
    /// Shut down or failed to start. Terminal.
    Stopped,
}

/// Outcome of trying to start the accept loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeginAccept {
    Proceed,
    AlreadyStarted,
    ShutDown,
}

/// What the shutdown coordinator has to do after releasing the lock.
#[derive(Debug)]
pub struct ShutdownPlan {
    /// Clients registered at the moment shutdown began.
    pub clients: Vec<Arc<Client>>,
    /// Whether an accept loop exists that will confirm its exit.
    pub accept_started: bool,
}

#[derive(Debug)]
struct State {
    phase: AcceptPhase,
    accept_started: bool,
    listener: Option<ListenerHandle>,
    clients: HashMap<ConnectionId, Arc<Client>>,
}

/// The authoritative set of live connections.
#[derive(Debug)]
pub struct Registry {
    state: Mutex<State>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                phase: AcceptPhase::Idle,
                accept_started: false,
                listener: None,
                clients: HashMap::new(),
            }),
        }
    }

    /// Running flag: true only while the accept loop is accepting.
    pub fn is_running(&self) -> bool {
        self.state.lock().phase == AcceptPhase::Running
    }

    pub fn phase(&self) -> AcceptPhase {
        self.state.lock().phase
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.state.lock().listener.as_ref().map(ListenerHandle::local_addr)
    }

    /// Claim the accept loop slot. Only the first caller may proceed.
    pub fn begin_accept(&self) -> BeginAccept {
        let mut state = self.state.lock();
        if state.accept_started {
            return BeginAccept::AlreadyStarted;
        }
        state.accept_started = true;
        if state.phase == AcceptPhase::Stopped {
            return BeginAccept::ShutDown;
        }
        state.phase = AcceptPhase::Starting;
        BeginAccept::Proceed
    }

    /// Store the bound listener and set the running flag.
    ///
    /// Returns `false` (dropping the handle) if shutdown won the race.
    pub fn start_running(&self, listener: ListenerHandle) -> bool {
        let mut state = self.state.lock();
        if state.phase != AcceptPhase::Starting {
            return false;
        }
        state.listener = Some(listener);
        state.phase = AcceptPhase::Running;
        true
    }

    /// Mark a failed start as terminal.
    pub fn abort_start(&self) {
        let mut state = self.state.lock();
        state.phase = AcceptPhase::Stopped;
        state.listener = None;
    }

    /// Register a client. Refused when not running or already closed.
    pub fn insert(&self, client: Arc<Client>) -> bool {
        let mut state = self.state.lock();
        if state.phase != AcceptPhase::Running || client.is_closed() {
            return false;
        }
        if state.clients.contains_key(&client.id()) {
            return false;
        }
        state.clients.insert(client.id(), client);
        metrics::set_active_connections(state.clients.len());
        true
    }

    /// Deregister a client. Removing an unknown id is a no-op.
    pub fn remove(&self, id: ConnectionId) -> Option<Arc<Client>> {
        let mut state = self.state.lock();
        let removed = state.clients.remove(&id);
        if removed.is_some() {
            metrics::set_active_connections(state.clients.len());
        }
        removed
    }

    pub fn get(&self, id: ConnectionId) -> Option<Arc<Client>> {
        self.state.lock().clients.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.lock().clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Point-in-time copy of the registered clients, ordered by id.
    pub fn snapshot(&self) -> Vec<Arc<Client>> {
        let mut clients: Vec<_> = self.state.lock().clients.values().cloned().collect();
        clients.sort_by_key(|c| c.id());
        clients
    }

    /// Ids currently registered, ascending.
    pub fn ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<_> = self.state.lock().clients.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Clear the running flag, close the listener and copy the clients.
    pub fn begin_shutdown(&self) -> ShutdownPlan {
        let mut state = self.state.lock();
        state.phase = AcceptPhase::Stopped;
        if let Some(listener) = state.listener.take() {
            listener.close();
        }
        let mut clients: Vec<_> = state.clients.values().cloned().collect();
        clients.sort_by_key(|c| c.id());
        ShutdownPlan {
            clients,
            accept_started: state.accept_started,
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
