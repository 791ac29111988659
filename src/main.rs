//! Subject broker (v1)
//!
//! A publish/subscribe message broker front end built with Tokio.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────────┐
//!                     │                    SUBJECT BROKER                    │
//!                     │                                                      │
//!   Client connect    │  ┌──────────┐    ┌──────────────┐    ┌────────────┐  │
//!   ──────────────────┼─▶│  accept  │───▶│    client    │───▶│  registry  │  │
//!                     │  │   loop   │    │   factory    │    │ (id → conn)│  │
//!                     │  └────┬─────┘    └──────┬───────┘    └─────▲──────┘  │
//!                     │       │ backoff         │ INFO, timers      │         │
//!                     │       ▼                 ▼                   │         │
//!                     │  ┌──────────┐    ┌──────────────┐           │         │
//!                     │  │resilience│    │   session    │── close ──┘         │
//!                     │  └──────────┘    │ (per client) │                     │
//!                     │                  └──────────────┘                     │
//!                     │  ┌────────────────────────────────────────────────┐  │
//!                     │  │ config │ lifecycle (signals, shutdown) │ monitor │  │
//!                     │  └────────────────────────────────────────────────┘  │
//!                     └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use subject_broker::config::{self, BrokerConfig};
use subject_broker::lifecycle::signals;
use subject_broker::observability::{logging, metrics};
use subject_broker::{monitor, Server};

#[derive(Parser, Debug)]
#[command(name = "subject-broker")]
#[command(version, about = "Publish/subscribe message broker", long_about = None)]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host to bind and advertise.
    #[arg(short = 'a', long = "addr")]
    host: Option<String>,

    /// Client port.
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable HTTP monitoring on this port.
    #[arg(short = 'm', long)]
    http_port: Option<u16>,

    /// Username required for connections.
    #[arg(long)]
    user: Option<String>,

    /// Password required for connections.
    #[arg(long)]
    pass: Option<String>,

    /// Authorization token required for connections.
    #[arg(long = "auth")]
    token: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long)]
    log_level: Option<String>,
}

impl Args {
    fn apply(self, config: &mut BrokerConfig) {
        if let Some(host) = self.host {
            config.listener.host = host;
        }
        if let Some(port) = self.port {
            config.listener.port = port;
        }
        if let Some(http_port) = self.http_port {
            config.monitoring.enabled = true;
            config.monitoring.http_port = http_port;
        }
        if self.user.is_some() {
            config.auth.username = self.user;
        }
        if self.pass.is_some() {
            config.auth.password = self.pass;
        }
        if self.token.is_some() {
            config.auth.token = self.token;
        }
        if let Some(level) = self.log_level {
            config.observability.log_level = level;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => config::load_config(path)?,
        None => BrokerConfig::default(),
    };
    args.apply(&mut config);

    logging::init(&config.observability.log_level);

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let monitoring = config.monitoring.enabled;
    let server = match Server::new(config) {
        Ok(server) => Arc::new(server),
        Err(e) => {
            tracing::error!(error = %e, "Failed to create server");
            return Err(e.into());
        }
    };

    tracing::info!(
        bind_address = %server.config().bind_address(),
        auth_required = server.info().auth_required,
        max_payload = server.info().max_payload,
        "Configuration loaded"
    );

    if monitoring {
        let listener = monitor::bind(&server).await?;
        let server = Arc::clone(&server);
        tokio::spawn(async move {
            if let Err(e) = monitor::serve(server, listener).await {
                tracing::error!(error = %e, "HTTP monitor failed");
            }
        });
    }

    let mut accept = tokio::spawn({
        let server = Arc::clone(&server);
        async move { server.accept_loop().await }
    });

    tokio::select! {
        result = &mut accept => {
            // The loop only returns on its own when it could not start.
            if let Ok(Err(e)) = result {
                tracing::error!(error = %e, "Server failed to start");
                return Err(e.into());
            }
        }
        _ = signals::shutdown_on_signal(Arc::clone(&server)) => {
            if let Ok(Err(e)) = accept.await {
                tracing::error!(error = %e, "Accept loop failed");
            }
        }
    }

    tracing::info!("Server exiting");
    Ok(())
}
