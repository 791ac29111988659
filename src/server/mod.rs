//! Broker server context.
//!
//! # Data Flow
//! ```text
//! Server::new (info frame cached, auth gate resolved)
//!     → accept.rs    (bind → Running → accept/backoff → Stopped → DoneSignal)
//!     → create_client (id → buffer hint → INFO → timers → session task → registry)
//!     → registry.rs  (id → Client, running flag, listener handle; one lock)
//!     → shutdown.rs  (flag off + listener closed under lock, clients closed
//!                     outside it, then wait for DoneSignal)
//! ```
//!
//! # Design Decisions
//! - One owned `Server` value carries all shared state; nothing is global
//! - The handshake frame is serialized once and never mutated
//! - `create_client` runs inline in the accept loop, so once the loop has
//!   exited no connection can still be on its way into the registry

mod accept;
pub mod auth;
pub mod info;
pub mod registry;
mod shutdown;
pub mod stats;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use socket2::SockRef;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::watch;

use crate::client::{ArmedTimers, Client, Session, SessionContext, SessionTimers};
use crate::config::{self, BrokerConfig, ConfigError};
use crate::lifecycle::DoneSignal;
use crate::net::ConnectionIdGenerator;
use crate::observability::metrics;

pub use auth::{AuthGate, AuthPolicy, Credentials};
pub use info::{ServerInfo, VERSION};
pub use registry::{AcceptPhase, Registry};
pub use stats::{Stats, StatsSnapshot};

/// Errors that stop the server from starting.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to serialize server info: {0}")]
    Info(#[from] serde_json::Error),

    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("accept loop already started")]
    AlreadyStarted,
}

/// Readiness of the client listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Readiness {
    Pending,
    Listening(SocketAddr),
    Stopped,
}

/// The broker's shared state.
pub struct Server {
    config: BrokerConfig,
    info: ServerInfo,
    info_frame: Vec<u8>,
    auth: Arc<AuthGate>,
    session: Arc<SessionContext>,
    registry: Arc<Registry>,
    ids: ConnectionIdGenerator,
    stats: Arc<Stats>,
    done: DoneSignal,
    ready: watch::Sender<Readiness>,
    started_at: SystemTime,
    started: Instant,
}

impl Server {
    /// Build the server context from a validated configuration.
    pub fn new(config: BrokerConfig) -> Result<Self, ServerError> {
        config::validate_config(&config).map_err(ConfigError::Validation)?;

        let auth = Arc::new(AuthGate::from_config(&config.auth));
        let info = ServerInfo::from_config(&config, &auth);
        let info_frame = info.to_frame()?;
        let stats = Arc::new(Stats::default());

        let session = Arc::new(SessionContext {
            auth: Arc::clone(&auth),
            stats: Arc::clone(&stats),
            max_payload: config.listener.max_payload,
            write_buffer_size: config.client.write_buffer_size,
            timers: SessionTimers {
                auth_timeout: auth.is_required().then(|| config.auth.timeout()),
                ping_interval: config.client.ping_interval(),
                max_pings_out: config.client.max_pings_out,
            },
        });

        tracing::debug!(
            server_id = %info.id,
            auth_required = info.auth_required,
            max_payload = info.max_payload,
            "Server context created"
        );

        let (ready, _) = watch::channel(Readiness::Pending);
        Ok(Self {
            config,
            info,
            info_frame,
            auth,
            session,
            registry: Arc::new(Registry::new()),
            ids: ConnectionIdGenerator::new(),
            stats,
            done: DoneSignal::new(),
            ready,
            started_at: SystemTime::now(),
            started: Instant::now(),
        })
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    /// The cached `INFO` frame sent to every connection.
    pub fn info_frame(&self) -> &[u8] {
        &self.info_frame
    }

    /// Check presented credentials against the configured policy.
    pub fn check_auth(&self, credentials: &Credentials) -> bool {
        self.auth.check(credentials)
    }

    pub fn is_running(&self) -> bool {
        self.registry.is_running()
    }

    /// Bound client address while the accept loop is running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.registry.local_addr()
    }

    /// Wait until the accept loop is accepting, returning its address.
    ///
    /// Returns `None` if the server stopped before it ever ran.
    pub async fn ready(&self) -> Option<SocketAddr> {
        let mut rx = self.ready.subscribe();
        let state = match rx.wait_for(|r| *r != Readiness::Pending).await {
            Ok(state) => *state,
            Err(_) => Readiness::Stopped,
        };
        match state {
            Readiness::Listening(addr) => Some(addr),
            Readiness::Pending | Readiness::Stopped => None,
        }
    }

    /// Wait until the accept loop has exited.
    pub async fn stopped(&self) {
        self.done.wait().await;
    }

    pub fn num_clients(&self) -> usize {
        self.registry.len()
    }

    /// Point-in-time copy of the live connections, ordered by id.
    pub fn clients_snapshot(&self) -> Vec<Arc<Client>> {
        self.registry.snapshot()
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Turn an accepted socket into a registered, running client.
    ///
    /// The session task is spawned before the client is registered. If the
    /// server stopped running in between, the client is closed instead.
    pub async fn create_client(&self, mut stream: TcpStream, peer_addr: SocketAddr) -> Arc<Client> {
        let id = self.ids.next_id();
        let client = Client::new(id, peer_addr, Arc::downgrade(&self.registry));
        metrics::record_connection_accepted();
        tracing::debug!(connection_id = %id, peer_addr = %peer_addr, "Client connection created");

        if let Err(e) = SockRef::from(&stream).set_recv_buffer_size(self.config.client.read_buffer_size) {
            tracing::debug!(connection_id = %id, error = %e, "Failed to set read buffer size");
        }

        match stream.write_all(&self.info_frame).await {
            Ok(()) => {
                client.stats().record_outbound(self.info_frame.len());
                self.stats.record_outbound(self.info_frame.len());
            }
            Err(e) => tracing::warn!(connection_id = %id, error = %e, "Failed to send INFO"),
        }

        let timers = ArmedTimers::arm(&self.session.timers);
        let session = Session::new(Arc::clone(&client), Arc::clone(&self.session), stream, timers);
        tokio::spawn(session.run());

        if !self.registry.insert(Arc::clone(&client)) {
            tracing::debug!(connection_id = %id, "Not registered, closing connection");
            client.close_connection();
        }
        client
    }

    fn mark_stopped(&self) {
        self.ready.send_replace(Readiness::Stopped);
        self.done.fire();
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("server_id", &self.info.id)
            .field("phase", &self.registry.phase())
            .field("clients", &self.registry.len())
            .finish()
    }
}
