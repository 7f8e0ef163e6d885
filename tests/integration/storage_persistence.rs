//! Pipeline tests against the SQLite backend

use std::sync::Arc;

use chrono::{Duration, SubsecRound, Utc};
use energy_monitoring::config::StorageConfig;
use energy_monitoring::storage::{self, SharedStorage, StorageError, sqlite::SqliteBackend};
use tempfile::TempDir;

use crate::helpers::*;

async fn sqlite_storage(dir: &TempDir) -> SharedStorage {
    let path = dir.path().join("energy.db");
    Arc::new(SqliteBackend::new(&path).await.unwrap())
}

#[tokio::test]
async fn test_ticks_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let storage = sqlite_storage(&dir).await;

    let tick = {
        let pipeline = spawn_pipeline(&busy_config(), storage.clone());
        pipeline.monitor.tick_now().await.unwrap()
    };
    storage.close().await.unwrap();

    let reopened = sqlite_storage(&dir).await;
    let latest = reopened.query_latest_reading().await.unwrap().unwrap();
    assert_eq!(latest, tick.reading);

    let circuits = reopened.query_circuit_readings().await.unwrap();
    assert_eq!(circuits, tick.circuits);

    let alerts = reopened.query_active_alerts().await.unwrap();
    assert_eq!(alerts.len(), tick.alerts.len());
    assert!(alerts.iter().all(|a| !a.acknowledged));
}

#[tokio::test]
async fn test_open_backend_from_config() {
    let dir = TempDir::new().unwrap();
    let config = StorageConfig::Sqlite {
        path: dir.path().join("configured.db"),
    };

    let backend = storage::open_backend(&config).await.unwrap();
    let health = backend.health_check().await.unwrap();
    assert!(health.healthy);
    assert_eq!(health.metadata.get("backend").map(String::as_str), Some("sqlite"));

    let memory = storage::open_backend(&StorageConfig::None).await.unwrap();
    assert_eq!(
        memory.health_check().await.unwrap().metadata["backend"],
        "memory"
    );
}

#[tokio::test]
async fn test_aggregate_usage_uses_stored_average() {
    let dir = TempDir::new().unwrap();
    let storage = sqlite_storage(&dir).await;

    // earlier today the house drew 1 kW on average
    let now = Utc::now().trunc_subsecs(3);
    let earlier = now - Duration::milliseconds(10);
    storage
        .store_reading(&reading_at("earlier", earlier, 1_000.0))
        .await
        .unwrap();

    let pipeline = spawn_pipeline(&steady_config(3_000.0), storage.clone());
    let tick = pipeline.monitor.tick_now().await.unwrap();

    let hours_today = energy_monitoring::sampling::usage::hours_since(
        tick.reading.timestamp,
        energy_monitoring::sampling::usage::day_start(tick.reading.timestamp),
    );
    // the average covers only what was stored before this tick
    assert!((tick.reading.daily_usage - 1.0 * hours_today).abs() < 1e-6);
}

#[tokio::test]
async fn test_acknowledgement_is_persisted() {
    let dir = TempDir::new().unwrap();
    let storage = sqlite_storage(&dir).await;
    let pipeline = spawn_pipeline(&busy_config(), storage.clone());

    let tick = pipeline.monitor.tick_now().await.unwrap();
    let id = &tick.alerts[0].id;

    storage.acknowledge_alert(id).await.unwrap();
    storage.acknowledge_alert(id).await.unwrap();
    assert!(
        storage
            .query_active_alerts()
            .await
            .unwrap()
            .iter()
            .all(|a| &a.id != id)
    );

    assert!(matches!(
        storage.acknowledge_alert("no-such-alert").await,
        Err(StorageError::NotFound(_))
    ));
}
