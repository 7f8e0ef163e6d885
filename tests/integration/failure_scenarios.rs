//! Failure tests for the sampling pipeline
//!
//! A broken store, a stuck subscriber or an implausible sample must never stop the loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use energy_monitoring::{
    CircuitReading, Reading,
    actors::MonitorHandle,
    alerts::Alert,
    broadcaster::Broadcaster,
    config::Config,
    sampling::Sampler,
    storage::{
        HealthStatus, MemoryBackend, StorageBackend, StorageError, StorageResult, UsageTotals,
    },
};
use tokio::sync::broadcast::error::RecvError;

use crate::helpers::*;

/// Backend that rejects every write but counts the attempts
#[derive(Default)]
struct RejectingStorage {
    writes: AtomicU64,
    inner: MemoryBackend,
}

impl RejectingStorage {
    fn reject(&self) -> StorageResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Err(StorageError::QueryFailed("disk full".to_string()))
    }
}

#[async_trait]
impl StorageBackend for RejectingStorage {
    async fn store_reading(&self, _: &Reading) -> StorageResult<()> {
        self.reject()
    }
    async fn store_circuit_readings(&self, _: &[CircuitReading]) -> StorageResult<()> {
        self.reject()
    }
    async fn store_alert(&self, _: &Alert) -> StorageResult<()> {
        self.reject()
    }
    async fn query_latest_reading(&self) -> StorageResult<Option<Reading>> {
        self.inner.query_latest_reading().await
    }
    async fn query_circuit_readings(&self) -> StorageResult<Vec<CircuitReading>> {
        self.inner.query_circuit_readings().await
    }
    async fn query_usage_history(&self, window_hours: u32) -> StorageResult<Vec<Reading>> {
        self.inner.query_usage_history(window_hours).await
    }
    async fn query_usage_totals(
        &self,
        day_start: DateTime<Utc>,
        month_start: DateTime<Utc>,
    ) -> StorageResult<UsageTotals> {
        Err(StorageError::ConnectionFailed(format!(
            "cannot aggregate {day_start}..{month_start}"
        )))
    }
    async fn query_active_alerts(&self) -> StorageResult<Vec<Alert>> {
        self.inner.query_active_alerts().await
    }
    async fn acknowledge_alert(&self, id: &str) -> StorageResult<()> {
        self.inner.acknowledge_alert(id).await
    }
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        self.inner.health_check().await
    }
    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_store_failures_still_publish() {
    let storage = Arc::new(RejectingStorage::default());
    let pipeline = spawn_pipeline(&busy_config(), storage.clone());
    let mut updates = pipeline.broadcaster.subscribe();

    let tick = pipeline.monitor.tick_now().await.unwrap();
    assert_eq!(next_update(&mut updates).await, tick);

    // reading + circuits + each alert, every call attempted
    let expected = 2 + tick.alerts.len() as u64;
    assert_eq!(storage.writes.load(Ordering::SeqCst), expected);

    let stats = pipeline.monitor.stats().await.unwrap();
    assert_eq!(stats.persistence_failures, expected);
    assert_eq!(stats.ticks_completed, 1);
}

#[tokio::test]
async fn test_usage_query_failure_falls_back_to_local_estimate() {
    let storage = Arc::new(RejectingStorage::default());
    let pipeline = spawn_pipeline(&steady_config(3_000.0), storage);

    let tick = pipeline.monitor.tick_now().await.unwrap();
    let reading = tick.reading;

    let expected_daily = energy_monitoring::sampling::usage::local_estimate(
        reading.total_power,
        reading.timestamp,
    )
    .daily_usage;
    assert!((reading.daily_usage - expected_daily).abs() < 1e-9);
}

#[tokio::test]
async fn test_slow_subscriber_lags_without_blocking_others() {
    let broadcaster = Broadcaster::new(2);
    let sampler = Sampler::seeded(&Config::default(), memory_storage(), 3);
    let monitor = MonitorHandle::spawn(sampler, broadcaster.clone(), Duration::from_secs(60));

    let mut fast = broadcaster.subscribe();
    let mut slow = broadcaster.subscribe();

    for _ in 0..5 {
        let tick = monitor.tick_now().await.unwrap();
        assert_eq!(next_update(&mut fast).await, tick);
    }

    assert!(matches!(slow.recv().await, Err(RecvError::Lagged(3))));
    assert!(slow.recv().await.is_ok());

    monitor.shutdown();
}

#[tokio::test]
async fn test_implausible_sample_skips_tick_and_loop_continues() {
    let mut config = Config::default();
    config.sampling.nominal_voltage = f64::INFINITY;
    let pipeline = spawn_pipeline(&config, memory_storage());
    let mut updates = pipeline.broadcaster.subscribe();

    assert!(pipeline.monitor.tick_now().await.is_err());
    assert!(pipeline.monitor.tick_now().await.is_err());
    assert!(updates.try_recv().is_err());
    assert!(
        pipeline
            .storage
            .query_latest_reading()
            .await
            .unwrap()
            .is_none()
    );

    let stats = pipeline.monitor.stats().await.unwrap();
    assert_eq!(stats.ticks_failed, 2);
    assert_eq!(stats.ticks_completed, 0);
}

#[tokio::test]
async fn test_start_and_stop_are_idempotent() {
    let pipeline = spawn_pipeline(&Config::default(), memory_storage());
    let mut updates = pipeline.broadcaster.subscribe();

    assert!(pipeline.monitor.start().await.unwrap().enabled);
    assert!(pipeline.monitor.start().await.unwrap().enabled);
    next_update(&mut updates).await;

    assert!(!pipeline.monitor.stop().await.unwrap().enabled);
    assert!(!pipeline.monitor.stop().await.unwrap().enabled);

    // tick_now still works while disabled
    pipeline.monitor.tick_now().await.unwrap();
}
