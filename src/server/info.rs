//! Server identity and the cached handshake frame.

use serde::Serialize;
use uuid::Uuid;

use crate::config::BrokerConfig;
use crate::server::auth::AuthGate;

/// Broker version advertised to clients.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Server identity announced to every new connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerInfo {
    #[serde(rename = "server_id")]
    pub id: String,
    pub version: String,
    pub host: String,
    pub port: u16,
    pub auth_required: bool,
    pub ssl_required: bool,
    pub max_payload: usize,
}

impl ServerInfo {
    /// Resolve the identity from configuration with a fresh server id.
    pub fn from_config(config: &BrokerConfig, auth: &AuthGate) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            version: VERSION.to_string(),
            host: config.listener.host.clone(),
            port: config.listener.port,
            auth_required: auth.is_required(),
            ssl_required: config.listener.tls_required,
            max_payload: config.listener.max_payload,
        }
    }

    /// Serialize into the `INFO` frame sent verbatim to each connection.
    pub fn to_frame(&self) -> Result<Vec<u8>, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(format!("INFO {json} \r\n").into_bytes())
    }
}
