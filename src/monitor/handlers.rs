use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{extract::State, Json};
use serde::Serialize;

use crate::net::ConnectionId;
use crate::server::{Server, ServerInfo, StatsSnapshot};

#[derive(Debug, Serialize)]
pub struct Varz {
    #[serde(flatten)]
    pub info: ServerInfo,
    pub start: u64,
    pub uptime_secs: u64,
    pub connections: usize,
    #[serde(flatten)]
    pub stats: StatsSnapshot,
    pub auth_timeout_ms: u64,
    pub ping_interval_secs: u64,
    pub max_pings_out: u32,
}

#[derive(Debug, Serialize)]
pub struct ConnInfo {
    pub cid: ConnectionId,
    pub ip: String,
    pub port: u16,
    pub subscriptions: usize,
    pub uptime_secs: u64,
    #[serde(flatten)]
    pub stats: StatsSnapshot,
}

#[derive(Debug, Serialize)]
pub struct Connz {
    pub num_connections: usize,
    pub connections: Vec<ConnInfo>,
}

fn unix_secs(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default()
}

pub async fn get_varz(State(server): State<Arc<Server>>) -> Json<Varz> {
    let config = server.config();
    Json(Varz {
        info: server.info().clone(),
        start: unix_secs(server.started_at()),
        uptime_secs: server.uptime().as_secs(),
        connections: server.num_clients(),
        stats: server.stats(),
        auth_timeout_ms: config.auth.timeout_ms,
        ping_interval_secs: config.client.ping_interval_secs,
        max_pings_out: config.client.max_pings_out,
    })
}

pub async fn get_connz(State(server): State<Arc<Server>>) -> Json<Connz> {
    let connections: Vec<ConnInfo> = server
        .clients_snapshot()
        .iter()
        .map(|client| ConnInfo {
            cid: client.id(),
            ip: client.peer_addr().ip().to_string(),
            port: client.peer_addr().port(),
            subscriptions: client.subscription_count(),
            uptime_secs: client.uptime().as_secs(),
            stats: client.stats().snapshot(),
        })
        .collect();

    Json(Connz {
        num_connections: connections.len(),
        connections,
    })
}
