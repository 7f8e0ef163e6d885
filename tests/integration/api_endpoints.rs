//! Tests for the REST API served in-process

use std::net::{Ipv4Addr, SocketAddr};

use energy_monitoring::api::{ApiConfig, ApiState, spawn_api_server};
use energy_monitoring::config::Config;
use energy_monitoring::protocol::{Envelope, Payload};
use reqwest::StatusCode;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::helpers::*;

async fn serve(pipeline: &Pipeline, auth_token: Option<&str>) -> String {
    let config = ApiConfig {
        bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
        auth_token: auth_token.map(str::to_string),
        enable_cors: true,
    };
    let state = ApiState::new(
        pipeline.storage.clone(),
        pipeline.broadcaster.clone(),
        pipeline.monitor.clone(),
    );
    let addr = spawn_api_server(config, state).await.unwrap();
    format!("http://{addr}")
}

async fn next_envelope(updates: &mut broadcast::Receiver<Envelope>) -> Envelope {
    tokio::time::timeout(std::time::Duration::from_secs(2), updates.recv())
        .await
        .expect("envelope in time")
        .unwrap()
}

#[tokio::test]
async fn test_health_reports_storage() {
    let pipeline = spawn_pipeline(&Config::default(), memory_storage());
    let base = serve(&pipeline, None).await;

    let body: Value = reqwest::get(format!("{base}/api/v1/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["status"], "ok");
    assert_eq!(body["storage"], "In-memory storage operational");
}

#[tokio::test]
async fn test_latest_reading_and_circuits() {
    let pipeline = spawn_pipeline(&Config::default(), memory_storage());
    let base = serve(&pipeline, None).await;
    let client = energy_monitoring::client::api::ApiClient::new(&base, None);

    assert!(client.latest_reading().await.unwrap().is_none());
    assert!(client.circuits().await.unwrap().is_empty());

    let tick = pipeline.monitor.tick_now().await.unwrap();

    let latest = client.latest_reading().await.unwrap().unwrap();
    assert_eq!(latest.id, tick.reading.id);
    assert_eq!(latest.timestamp, tick.reading.timestamp);

    let circuits = client.circuits().await.unwrap();
    assert_eq!(circuits.len(), tick.circuits.len());
    assert_eq!(circuits[0].circuit_id, "main");
}

#[tokio::test]
async fn test_usage_history_window() {
    let pipeline = spawn_pipeline(&Config::default(), memory_storage());
    let base = serve(&pipeline, None).await;

    for _ in 0..3 {
        pipeline.monitor.tick_now().await.unwrap();
    }

    let body: Value = reqwest::get(format!("{base}/api/v1/usage"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["hours"], 24);
    assert_eq!(body["count"], 3);

    let response = reqwest::get(format!("{base}/api/v1/usage?hours=0"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_acknowledge_alert_notifies_subscribers() {
    let pipeline = spawn_pipeline(&busy_config(), memory_storage());
    let base = serve(&pipeline, None).await;
    let client = energy_monitoring::client::api::ApiClient::new(&base, None);

    let tick = pipeline.monitor.tick_now().await.unwrap();
    let alerts = client.active_alerts().await.unwrap();
    assert_eq!(alerts.len(), tick.alerts.len());

    let mut updates = pipeline.broadcaster.subscribe();
    let id = alerts[0].id.clone();
    assert!(client.acknowledge_alert(&id).await.unwrap());

    let envelope = next_envelope(&mut updates).await;
    assert_eq!(
        envelope.payload,
        Payload::AlertAcknowledged { id: id.clone() }
    );

    let remaining = client.active_alerts().await.unwrap();
    assert!(remaining.iter().all(|a| a.id != id));

    // unknown ids are a 404
    assert!(!client.acknowledge_alert("missing").await.unwrap());
}

#[tokio::test]
async fn test_monitor_lifecycle_endpoints() {
    let pipeline = spawn_pipeline(&Config::default(), memory_storage());
    let base = serve(&pipeline, None).await;
    let http = reqwest::Client::new();

    let stats: Value = http
        .get(format!("{base}/api/v1/monitor"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["enabled"], false);

    let started: Value = http
        .post(format!("{base}/api/v1/monitor/start"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(started["enabled"], true);

    let mut updates = pipeline.broadcaster.subscribe();
    next_update(&mut updates).await;

    let stopped: Value = http
        .post(format!("{base}/api/v1/monitor/stop"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stopped["enabled"], false);
    assert!(stopped["ticks_completed"].as_u64().unwrap() >= 1);
}

#[tokio::test]
async fn test_token_is_enforced() {
    let pipeline = spawn_pipeline(&Config::default(), memory_storage());
    let base = serve(&pipeline, Some("s3cret")).await;
    let http = reqwest::Client::new();
    let url = format!("{base}/api/v1/alerts");

    let missing = http.get(&url).send().await.unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let wrong = http.get(&url).bearer_auth("guess").send().await.unwrap();
    assert_eq!(wrong.status(), StatusCode::FORBIDDEN);

    let right = http.get(&url).bearer_auth("s3cret").send().await.unwrap();
    assert_eq!(right.status(), StatusCode::OK);

    let client = energy_monitoring::client::api::ApiClient::new(&base, Some("s3cret".into()));
    assert!(client.active_alerts().await.unwrap().is_empty());
}
