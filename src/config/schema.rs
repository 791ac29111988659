//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the broker.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default client port.
pub const DEFAULT_PORT: u16 = 4222;

/// Default HTTP monitoring port.
pub const DEFAULT_HTTP_PORT: u16 = 8222;

/// Default maximum payload accepted in a single `PUB`.
pub const MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

/// Root configuration for the broker.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BrokerConfig {
    /// Client listener configuration (bind address, advertised limits).
    pub listener: ListenerConfig,

    /// Accept loop backoff bounds.
    pub accept: AcceptConfig,

    /// Client authentication policy.
    pub auth: AuthConfig,

    /// Per-connection timers and buffer sizes.
    pub client: ClientConfig,

    /// HTTP monitoring endpoint.
    pub monitoring: MonitoringConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl BrokerConfig {
    /// Address string the client listener binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.listener.host, self.listener.port)
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Host to bind and advertise (e.g., "0.0.0.0").
    pub host: String,

    /// Port to bind and advertise. Port 0 binds an ephemeral port.
    pub port: u16,

    /// Advertised to clients; TLS itself is not negotiated here.
    pub tls_required: bool,

    /// Largest `PUB` payload accepted, in bytes.
    pub max_payload: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            tls_required: false,
            max_payload: MAX_PAYLOAD_SIZE,
        }
    }
}

/// Backoff applied between accept retries after temporary errors.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AcceptConfig {
    /// Backoff floor in milliseconds.
    pub min_sleep_ms: u64,

    /// Backoff ceiling in milliseconds.
    pub max_sleep_ms: u64,
}

impl AcceptConfig {
    pub fn min_sleep(&self) -> Duration {
        Duration::from_millis(self.min_sleep_ms)
    }

    pub fn max_sleep(&self) -> Duration {
        Duration::from_millis(self.max_sleep_ms)
    }
}

impl Default for AcceptConfig {
    fn default() -> Self {
        Self {
            min_sleep_ms: 10,
            max_sleep_ms: 1000,
        }
    }
}

/// Authentication configuration.
///
/// A token takes precedence over username/password when both are set.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Required username (enables user/password auth).
    pub username: Option<String>,

    /// Required password.
    pub password: Option<String>,

    /// Shared authorization token.
    pub token: Option<String>,

    /// Time a connection has to authenticate, in milliseconds.
    pub timeout_ms: u64,
}

impl AuthConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            token: None,
            timeout_ms: 2000,
        }
    }
}

/// Per-connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Interval between server-initiated pings, in seconds.
    pub ping_interval_secs: u64,

    /// Outstanding pings tolerated before the connection is considered stale.
    pub max_pings_out: u32,

    /// Socket receive buffer size hint.
    pub read_buffer_size: usize,

    /// Outbound write buffer capacity.
    pub write_buffer_size: usize,
}

impl ClientConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ping_interval_secs: 120,
            max_pings_out: 2,
            read_buffer_size: 32 * 1024,
            write_buffer_size: 32 * 1024,
        }
    }
}

/// HTTP monitoring configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Serve `/varz` and `/connz`.
    pub enabled: bool,

    /// Monitoring port, bound on the listener host.
    pub http_port: u16,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            http_port: DEFAULT_HTTP_PORT,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus metrics exporter.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config: BrokerConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.port, DEFAULT_PORT);
        assert_eq!(config.listener.max_payload, MAX_PAYLOAD_SIZE);
        assert_eq!(config.accept.min_sleep(), Duration::from_millis(10));
        assert_eq!(config.accept.max_sleep(), Duration::from_secs(1));
        assert_eq!(config.auth.timeout(), Duration::from_secs(2));
        assert!(config.auth.token.is_none());
        assert!(!config.monitoring.enabled);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config: BrokerConfig = toml::from_str(
            r#"
            [listener]
            port = 5222

            [auth]
            token = "s3cr3t"
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.port, 5222);
        assert_eq!(config.listener.host, "0.0.0.0");
        assert_eq!(config.auth.token.as_deref(), Some("s3cr3t"));
        assert_eq!(config.auth.timeout_ms, 2000);
        assert_eq!(config.bind_address(), "0.0.0.0:5222");
    }
}
