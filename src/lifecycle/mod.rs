//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Server::new (fatal on error) → accept loop task
//!
//! Shutdown (server::shutdown + shutdown.rs):
//!     Signal received → Server::shutdown → stop accepting → close clients
//!         → wait for DoneSignal from the accept loop → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then server context, then listener
//! - Ordered shutdown: stop accept, close clients, confirm loop exit

pub mod shutdown;
pub mod signals;

pub use shutdown::DoneSignal;
