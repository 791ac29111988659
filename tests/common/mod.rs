//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use subject_broker::{BrokerConfig, Server, ServerError};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Loopback config on an ephemeral port.
pub fn test_config() -> BrokerConfig {
    let mut config = BrokerConfig::default();
    config.listener.host = "127.0.0.1".to_string();
    config.listener.port = 0;
    config
}

pub struct RunningServer {
    pub server: Arc<Server>,
    pub addr: SocketAddr,
    pub accept: JoinHandle<Result<(), ServerError>>,
}

/// Start the accept loop and wait until it is accepting.
pub async fn start_server(config: BrokerConfig) -> RunningServer {
    let server = Arc::new(Server::new(config).unwrap());
    let accept = tokio::spawn({
        let server = Arc::clone(&server);
        async move { server.accept_loop().await }
    });
    let addr = tokio::time::timeout(TIMEOUT, server.ready())
        .await
        .expect("server ready in time")
        .expect("server listening");
    RunningServer { server, addr, accept }
}

/// Poll `check` until it holds or the timeout expires.
pub async fn wait_until<F: FnMut() -> bool>(mut check: F) -> bool {
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// Raw line-oriented client.
pub struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

#[allow(dead_code)]
impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    /// Connect and consume the INFO line.
    pub async fn connect_with_info(addr: SocketAddr) -> (Self, serde_json::Value) {
        let mut client = Self::connect(addr).await;
        let line = client.read_line().await.expect("INFO line");
        let json = line
            .strip_prefix("INFO ")
            .expect("line starts with INFO")
            .trim();
        let info = serde_json::from_str(json).unwrap();
        (client, info)
    }

    pub async fn send(&mut self, data: &str) {
        self.writer.write_all(data.as_bytes()).await.unwrap();
    }

    /// Next line without its terminator, or `None` on EOF.
    pub async fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        let n = tokio::time::timeout(TIMEOUT, self.reader.read_line(&mut line))
            .await
            .expect("read within timeout")
            .ok()?;
        if n == 0 {
            None
        } else {
            Some(line.trim_end_matches(['\r', '\n']).to_string())
        }
    }

    /// Whether the server closed the connection (after draining any lines).
    pub async fn closed_by_server(&mut self) -> bool {
        loop {
            match self.read_line().await {
                None => return true,
                Some(_) => continue,
            }
        }
    }
}
