//! The accept loop.
//!
//! # States
//! ```text
//! Initializing → Running → Draining → Stopped
//!   bind          accept    listener    DoneSignal fired,
//!                 + backoff closed      no further accepts
//! ```

use tokio::net::TcpListener;

use crate::net::{is_temporary, listener, ListenerHandle};
use crate::observability::metrics;
use crate::resilience::AcceptBackoff;
use crate::server::info::VERSION;
use crate::server::registry::BeginAccept;
use crate::server::{Readiness, Server, ServerError};

impl Server {
    /// Bind the listener and accept connections until shutdown.
    ///
    /// Returns an error only if the listener cannot be bound or the loop was
    /// already started. Either way, [`Server::shutdown`] will not block on it.
    pub async fn accept_loop(&self) -> Result<(), ServerError> {
        match self.registry.begin_accept() {
            BeginAccept::Proceed => {}
            BeginAccept::AlreadyStarted => return Err(ServerError::AlreadyStarted),
            BeginAccept::ShutDown => {
                tracing::info!("Shutdown requested before the accept loop started");
                self.mark_stopped();
                return Ok(());
            }
        }

        tracing::info!(
            version = VERSION,
            port = self.config.listener.port,
            "Starting subject broker"
        );

        let (listener, handle, mut closed) = match self.bind().await {
            Ok(bound) => bound,
            Err(e) => {
                self.registry.abort_start();
                self.mark_stopped();
                return Err(e);
            }
        };
        let local_addr = handle.local_addr();

        if !self.registry.start_running(handle) {
            tracing::info!("Shutdown requested while binding");
            drop(listener);
            self.mark_stopped();
            return Ok(());
        }
        self.ready.send_replace(Readiness::Listening(local_addr));
        tracing::info!(address = %local_addr, "Subject broker is ready");

        let mut backoff = AcceptBackoff::new(
            self.config.accept.min_sleep(),
            self.config.accept.max_sleep(),
        );

        while self.registry.is_running() {
            let accepted = tokio::select! {
                biased;
                _ = &mut closed => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer_addr)) => {
                    backoff.reset();
                    self.create_client(stream, peer_addr).await;
                }
                Err(e) if is_temporary(&e) => {
                    let delay = backoff.next_delay();
                    metrics::record_accept_error("temporary");
                    tracing::debug!(
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "Temporary accept error, backing off"
                    );
                    tokio::select! {
                        biased;
                        _ = &mut closed => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => {
                    metrics::record_accept_error("other");
                    tracing::error!(error = %e, "Accept error");
                }
            }
        }

        drop(listener);
        self.mark_stopped();
        tracing::info!("Accept loop exited");
        Ok(())
    }

    async fn bind(
        &self,
    ) -> Result<(TcpListener, ListenerHandle, crate::net::ListenerClosed), ServerError> {
        let addr = self.config.bind_address();
        let listener = listener::bind(&addr).await?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;
        let (handle, closed) = ListenerHandle::new(local_addr);
        Ok((listener, handle, closed))
    }
}
