//! Shutdown coordination.

use crate::server::Server;

impl Server {
    /// Stop accepting, close every registered client, and wait for the
    /// accept loop to confirm it has exited.
    ///
    /// Safe to call repeatedly and concurrently: later calls find nothing
    /// left to close and wait on the same completion signal.
    pub async fn shutdown(&self) {
        // Lock held only for bookkeeping; closing clients re-enters the registry.
        let plan = self.registry.begin_shutdown();

        if !plan.clients.is_empty() {
            tracing::info!(connections = plan.clients.len(), "Closing client connections");
        }
        for client in &plan.clients {
            client.close_connection();
        }

        if !plan.accept_started {
            self.mark_stopped();
        }

        self.done.wait().await;
        tracing::info!("Server shutdown complete");
    }
}
