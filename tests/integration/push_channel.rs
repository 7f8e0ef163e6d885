//! Push channel tests: hub WebSocket server against the subscriber connection manager

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use energy_monitoring::api::{ApiConfig, ApiState, spawn_api_server};
use energy_monitoring::broadcaster::Broadcaster;
use energy_monitoring::client::websocket::WebSocketConnector;
use energy_monitoring::client::{
    ConnectionHandle, ConnectionOptions, ConnectionState, ConnectionStatus, MAX_ATTEMPTS_REACHED,
};
use energy_monitoring::config::Config;
use energy_monitoring::protocol::{Envelope, Payload};
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::helpers::*;

async fn serve(pipeline: &Pipeline, auth_token: Option<&str>) -> String {
    let config = ApiConfig {
        bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
        auth_token: auth_token.map(str::to_string),
        enable_cors: false,
    };
    let state = ApiState::new(
        pipeline.storage.clone(),
        pipeline.broadcaster.clone(),
        pipeline.monitor.clone(),
    );
    let addr = spawn_api_server(config, state).await.unwrap();
    format!("http://{addr}")
}

fn options(max_attempts: u32) -> ConnectionOptions {
    ConnectionOptions {
        reconnect_delay: Duration::from_millis(10),
        max_attempts,
        heartbeat_interval: None,
        handshake_timeout: Duration::from_secs(2),
    }
}

async fn wait_for_state(handle: &ConnectionHandle, state: ConnectionState) -> ConnectionStatus {
    tokio::time::timeout(Duration::from_secs(5), handle.wait_for(|s| s.state == state))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {state}"))
        .expect("manager alive")
}

async fn wait_for_subscribers(broadcaster: &Broadcaster, count: usize) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while broadcaster.subscriber_count() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("subscriber registered in time");
}

#[tokio::test]
async fn test_subscriber_receives_energy_updates() {
    let pipeline = spawn_pipeline(&busy_config(), memory_storage());
    let base = serve(&pipeline, Some("hub-token")).await;

    let connector = WebSocketConnector::new(&base, Some("hub-token".to_string()));
    let (handle, mut inbound) = ConnectionHandle::spawn(connector, options(3));
    handle.connect();
    wait_for_state(&handle, ConnectionState::Connected).await;
    wait_for_subscribers(&pipeline.broadcaster, 1).await;

    let tick = pipeline.monitor.tick_now().await.unwrap();

    let envelope = tokio::time::timeout(Duration::from_secs(2), inbound.recv())
        .await
        .expect("update in time")
        .unwrap();
    match envelope.payload {
        Payload::EnergyUpdate(update) => {
            assert_eq!(update.reading.id, tick.reading.id);
            assert_eq!(update.circuits.len(), tick.circuits.len());
            assert_eq!(update.alerts.len(), tick.alerts.len());
        }
        other => panic!("expected energy_update, got {other:?}"),
    }

    handle.shutdown();
}

#[tokio::test]
async fn test_server_answers_ping_with_pong() {
    let pipeline = spawn_pipeline(&Config::default(), memory_storage());
    let base = serve(&pipeline, None).await;
    let url = energy_monitoring::util::stream_url(&base);

    let (mut socket, _) = connect_async(url.as_str()).await.unwrap();
    let ping = Envelope::ping().with_id("probe-1");
    socket
        .send(Message::Text(ping.to_text().unwrap()))
        .await
        .unwrap();

    let reply = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if let Some(Ok(Message::Text(text))) = socket.next().await {
                return Envelope::parse(&text).unwrap();
            }
        }
    })
    .await
    .expect("pong in time");

    assert_eq!(reply.payload, Payload::Pong);
    assert_eq!(reply.id.as_deref(), Some("probe-1"));
}

#[tokio::test]
async fn test_heartbeat_pongs_are_forwarded() {
    let pipeline = spawn_pipeline(&Config::default(), memory_storage());
    let base = serve(&pipeline, None).await;

    let options = ConnectionOptions {
        heartbeat_interval: Some(Duration::from_millis(20)),
        ..options(3)
    };
    let (handle, mut inbound) = ConnectionHandle::spawn(WebSocketConnector::new(&base, None), options);
    handle.connect();
    wait_for_state(&handle, ConnectionState::Connected).await;

    let mut ids = Vec::new();
    while ids.len() < 2 {
        let envelope = tokio::time::timeout(Duration::from_secs(2), inbound.recv())
            .await
            .expect("pong in time")
            .expect("manager alive");
        assert_eq!(envelope.payload, Payload::Pong);
        ids.push(envelope.id.expect("pong echoes the ping id"));
    }

    // heartbeat pings carry fresh uuids, echoed back one pong each
    for id in &ids {
        assert!(uuid::Uuid::parse_str(id).is_ok(), "unexpected pong id {id}");
    }
    assert_ne!(ids[0], ids[1]);
    assert_eq!(handle.state(), ConnectionState::Connected);

    handle.shutdown();
}

#[tokio::test]
async fn test_rejected_token_exhausts_attempts() {
    let pipeline = spawn_pipeline(&Config::default(), memory_storage());
    let base = serve(&pipeline, Some("hub-token")).await;

    let connector = WebSocketConnector::new(&base, Some("wrong".to_string()));
    let (handle, _inbound) = ConnectionHandle::spawn(connector, options(2));
    handle.connect();

    let status = wait_for_state(&handle, ConnectionState::Failed).await;
    assert_eq!(status.attempts, 2);
    assert_eq!(status.last_error.as_deref(), Some(MAX_ATTEMPTS_REACHED));
    assert_eq!(pipeline.broadcaster.subscriber_count(), 0);
}

#[tokio::test]
async fn test_unreachable_hub_then_disconnect() {
    // nothing listens on this port once the listener is dropped
    let listener = std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let connector = WebSocketConnector::new(&format!("http://{addr}"), None);
    let options = ConnectionOptions {
        reconnect_delay: Duration::from_millis(200),
        ..options(5)
    };
    let (handle, _inbound) = ConnectionHandle::spawn(connector, options);
    handle.connect();

    let status = wait_for_state(&handle, ConnectionState::Reconnecting).await;
    assert!(status.last_error.is_some());

    handle.disconnect();
    let status = wait_for_state(&handle, ConnectionState::Disconnected).await;
    assert_eq!(status.attempts, 0);
}
