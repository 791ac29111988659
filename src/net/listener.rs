//! TCP listener binding and the close handle used to stop accepting.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Hand out a [`ListenerHandle`] whose drop unblocks a pending accept
//! - Classify accept errors as temporary (back off) or not (log, continue)

use std::io;
use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::sync::oneshot;

use crate::server::ServerError;

/// Bind the client listener.
pub async fn bind(addr: &str) -> Result<TcpListener, ServerError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })?;

    match listener.local_addr() {
        Ok(local) => tracing::info!(address = %local, "Listener bound"),
        Err(e) => tracing::debug!(error = %e, "Listener bound, local address unavailable"),
    }

    Ok(listener)
}

/// Ownership token for a bound listener.
///
/// The accept loop owns the socket itself and waits on the paired
/// [`ListenerClosed`]. Closing (or dropping) the handle resolves it, which is
/// how a blocked accept is interrupted.
#[derive(Debug)]
pub struct ListenerHandle {
    local_addr: SocketAddr,
    close_tx: oneshot::Sender<()>,
}

/// Receiving side of a [`ListenerHandle`], polled next to `accept()`.
pub type ListenerClosed = oneshot::Receiver<()>;

impl ListenerHandle {
    pub fn new(local_addr: SocketAddr) -> (Self, ListenerClosed) {
        let (close_tx, close_rx) = oneshot::channel();
        (Self { local_addr, close_tx }, close_rx)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Close the listener. The accept loop observes this on its next poll.
    pub fn close(self) {
        // Receiver already gone means the loop has exited.
        let _ = self.close_tx.send(());
    }
}

#[cfg(target_os = "linux")]
mod errno {
    pub const ENOMEM: i32 = 12;
    pub const ENFILE: i32 = 23;
    pub const EMFILE: i32 = 24;
    pub const ENOBUFS: i32 = 105;
}

#[cfg(not(target_os = "linux"))]
mod errno {
    pub const ENOMEM: i32 = 12;
    pub const ENFILE: i32 = 23;
    pub const EMFILE: i32 = 24;
    pub const ENOBUFS: i32 = 55;
}

/// Whether an accept error is transient and worth backing off on.
pub fn is_temporary(err: &io::Error) -> bool {
    if let Some(code) = err.raw_os_error() {
        if matches!(
            code,
            errno::EMFILE | errno::ENFILE | errno::ENOBUFS | errno::ENOMEM
        ) {
            return true;
        }
    }

    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    )
}
