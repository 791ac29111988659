//! Client-facing wire behaviour: INFO, auth gate, timers and basic ops.

use subject_broker::BrokerConfig;

mod common;
use common::{start_server, test_config, wait_until, TestClient};

fn token_config(token: &str) -> BrokerConfig {
    let mut config = test_config();
    config.auth.token = Some(token.to_string());
    config
}

#[tokio::test]
async fn info_is_first_frame() {
    let mut config = test_config();
    config.listener.max_payload = 4096;
    let running = start_server(config).await;

    let (_client, info) = TestClient::connect_with_info(running.addr).await;
    assert_eq!(info["server_id"], running.server.info().id.as_str());
    assert_eq!(info["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(info["host"], "127.0.0.1");
    assert_eq!(info["auth_required"], false);
    assert_eq!(info["ssl_required"], false);
    assert_eq!(info["max_payload"], 4096);

    running.server.shutdown().await;
}

#[tokio::test]
async fn ping_gets_pong() {
    let running = start_server(test_config()).await;
    let (mut client, _) = TestClient::connect_with_info(running.addr).await;

    client.send("PING\r\n").await;
    assert_eq!(client.read_line().await.as_deref(), Some("PONG"));

    // INFO and PONG.
    let expected_bytes = (running.server.info_frame().len() + "PONG\r\n".len()) as u64;
    let stats = running.server.stats();
    assert_eq!(stats.out_msgs, 2);
    assert_eq!(stats.out_bytes, expected_bytes);

    let snapshot = running.server.clients_snapshot();
    assert_eq!(snapshot[0].stats().snapshot().out_bytes, expected_bytes);

    running.server.shutdown().await;
}

#[tokio::test]
async fn valid_token_is_accepted() {
    let running = start_server(token_config("s3cr3t")).await;
    let (mut client, info) = TestClient::connect_with_info(running.addr).await;
    assert_eq!(info["auth_required"], true);

    client.send("CONNECT {\"auth_token\":\"s3cr3t\"}\r\n").await;
    assert_eq!(client.read_line().await.as_deref(), Some("+OK"));

    client.send("SUB foo 1\r\n").await;
    assert_eq!(client.read_line().await.as_deref(), Some("+OK"));
    assert!(wait_until(|| {
        running
            .server
            .clients_snapshot()
            .first()
            .is_some_and(|c| c.subscription_count() == 1)
    })
    .await);

    running.server.shutdown().await;
}

#[tokio::test]
async fn wrong_token_is_rejected_and_closed() {
    let running = start_server(token_config("s3cr3t")).await;
    let (mut client, _) = TestClient::connect_with_info(running.addr).await;

    client.send("CONNECT {\"auth_token\":\"nope\"}\r\n").await;
    assert_eq!(
        client.read_line().await.as_deref(),
        Some("-ERR 'Authorization Violation'")
    );
    assert!(client.closed_by_server().await);
    assert!(wait_until(|| running.server.num_clients() == 0).await);

    running.server.shutdown().await;
}

#[tokio::test]
async fn ops_before_connect_need_auth() {
    let running = start_server(token_config("s3cr3t")).await;
    let (mut client, _) = TestClient::connect_with_info(running.addr).await;

    // PING is allowed before CONNECT.
    client.send("PING\r\n").await;
    assert_eq!(client.read_line().await.as_deref(), Some("PONG"));

    client.send("PUB foo 2\r\nhi\r\n").await;
    assert_eq!(
        client.read_line().await.as_deref(),
        Some("-ERR 'Authorization Violation'")
    );
    assert!(client.closed_by_server().await);

    running.server.shutdown().await;
}

#[tokio::test]
async fn silent_client_hits_auth_timeout() {
    let mut config = token_config("s3cr3t");
    config.auth.timeout_ms = 100;
    let running = start_server(config).await;
    let (mut client, _) = TestClient::connect_with_info(running.addr).await;

    assert_eq!(
        client.read_line().await.as_deref(),
        Some("-ERR 'Authorization Timeout'")
    );
    assert!(client.closed_by_server().await);
    assert!(wait_until(|| running.server.num_clients() == 0).await);

    running.server.shutdown().await;
}

#[tokio::test]
async fn no_auth_timeout_without_auth() {
    let mut config = test_config();
    config.auth.timeout_ms = 50;
    let running = start_server(config).await;
    let (mut client, _) = TestClient::connect_with_info(running.addr).await;

    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    client.send("PING\r\n").await;
    assert_eq!(client.read_line().await.as_deref(), Some("PONG"));
    assert_eq!(running.server.num_clients(), 1);

    running.server.shutdown().await;
}

#[tokio::test]
async fn unanswered_pings_mark_connection_stale() {
    let mut config = test_config();
    config.client.ping_interval_secs = 1;
    config.client.max_pings_out = 1;
    let running = start_server(config).await;
    let (mut client, _) = TestClient::connect_with_info(running.addr).await;

    assert_eq!(client.read_line().await.as_deref(), Some("PING"));
    assert_eq!(
        client.read_line().await.as_deref(),
        Some("-ERR 'Stale Connection'")
    );
    assert!(client.closed_by_server().await);

    running.server.shutdown().await;
}

#[tokio::test]
async fn publish_counts_inbound_traffic() {
    let running = start_server(test_config()).await;
    let (mut client, _) = TestClient::connect_with_info(running.addr).await;

    client.send("CONNECT {\"verbose\":false}\r\n").await;
    client.send("PUB foo 5\r\nhello\r\nPUB bar reply 3\r\nabc\r\n").await;
    client.send("PING\r\n").await;
    assert_eq!(client.read_line().await.as_deref(), Some("PONG"));

    let stats = running.server.stats();
    assert_eq!(stats.in_msgs, 2);
    assert_eq!(stats.in_bytes, 8);

    let snapshot = running.server.clients_snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].stats().snapshot().in_msgs, 2);

    running.server.shutdown().await;
}

#[tokio::test]
async fn payload_without_crlf_is_rejected() {
    let running = start_server(test_config()).await;
    let (mut client, _) = TestClient::connect_with_info(running.addr).await;

    client.send("PUB foo 5\r\nhelloXX").await;
    assert_eq!(
        client.read_line().await.as_deref(),
        Some("-ERR 'Unknown Protocol Operation'")
    );
    assert!(client.closed_by_server().await);
    assert_eq!(running.server.stats().in_msgs, 0);

    running.server.shutdown().await;
}

#[tokio::test]
async fn oversized_publish_is_rejected() {
    let mut config = test_config();
    config.listener.max_payload = 8;
    let running = start_server(config).await;
    let (mut client, _) = TestClient::connect_with_info(running.addr).await;

    client.send("PUB foo 16\r\n").await;
    assert_eq!(
        client.read_line().await.as_deref(),
        Some("-ERR 'Maximum Payload Violation'")
    );
    assert!(client.closed_by_server().await);

    running.server.shutdown().await;
}

#[tokio::test]
async fn unknown_op_is_rejected() {
    let running = start_server(test_config()).await;
    let (mut client, _) = TestClient::connect_with_info(running.addr).await;

    client.send("HELLO world\r\n").await;
    assert_eq!(
        client.read_line().await.as_deref(),
        Some("-ERR 'Unknown Protocol Operation'")
    );
    assert!(client.closed_by_server().await);

    running.server.shutdown().await;
}
