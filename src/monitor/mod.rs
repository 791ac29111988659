//! Read-only HTTP monitoring.
//!
//! # Data Flow
//! ```text
//! GET /varz  → server info, uptime, connection count, aggregate counters
//! GET /connz → registry snapshot, per-connection counters
//! ```
//!
//! # Design Decisions
//! - Handlers only read: snapshots and atomic counters, never the lock
//!   for longer than a copy
//! - Served until the accept loop confirms shutdown

pub mod handlers;

use std::io;
use std::sync::Arc;

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::server::Server;
use self::handlers::{get_connz, get_varz};

pub fn setup_monitor_router(server: Arc<Server>) -> Router {
    Router::new()
        .route("/varz", get(get_varz))
        .route("/connz", get(get_connz))
        .layer(TraceLayer::new_for_http())
        .with_state(server)
}

/// Bind the monitoring endpoint on the listener host.
pub async fn bind(server: &Server) -> io::Result<TcpListener> {
    let config = server.config();
    let addr = format!("{}:{}", config.listener.host, config.monitoring.http_port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(address = %listener.local_addr()?, "Starting http monitor");
    Ok(listener)
}

/// Serve monitoring requests until the server has stopped.
pub async fn serve(server: Arc<Server>, listener: TcpListener) -> io::Result<()> {
    let stopped = Arc::clone(&server);
    axum::serve(listener, setup_monitor_router(server))
        .with_graceful_shutdown(async move { stopped.stopped().await })
        .await
}
