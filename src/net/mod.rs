//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (bind, close handle, accept error classification)
//!     → connection.rs (id allocation)
//!     → Hand off to the client factory (server::Server::create_client)
//!
//! Listener States:
//!     Bound → Accepting → Closed (handle closed by shutdown)
//! ```
//!
//! # Design Decisions
//! - The listener socket is owned by the accept loop; shutdown holds only a
//!   close handle, so no lock is ever held across an accept
//! - Temporary accept errors drive backoff, everything else is logged

pub mod connection;
pub mod listener;

pub use connection::{ConnectionId, ConnectionIdGenerator};
pub use listener::{is_temporary, ListenerClosed, ListenerHandle};
