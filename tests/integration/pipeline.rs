//! End-to-end tests of the sample → alert → persist → publish pipeline

use energy_monitoring::alerts::AlertKind;
use energy_monitoring::config::Config;

use crate::helpers::*;

#[tokio::test]
async fn test_tick_reaches_storage_and_subscribers() {
    let pipeline = spawn_pipeline(&busy_config(), memory_storage());
    let mut first = pipeline.broadcaster.subscribe();
    let mut second = pipeline.broadcaster.subscribe();

    let tick = pipeline.monitor.tick_now().await.unwrap();

    assert_eq!(next_update(&mut first).await, tick);
    assert_eq!(next_update(&mut second).await, tick);

    let latest = pipeline.storage.query_latest_reading().await.unwrap().unwrap();
    assert_eq!(latest.id, tick.reading.id);

    let circuits = pipeline.storage.query_circuit_readings().await.unwrap();
    assert_eq!(circuits, tick.circuits);

    let active = pipeline.storage.query_active_alerts().await.unwrap();
    let high_usage = active
        .iter()
        .find(|a| a.kind == AlertKind::HighUsage)
        .expect("high usage alert stored");
    assert_eq!(high_usage.id, format!("{}-high_usage", tick.reading.id));
    assert_eq!(high_usage.timestamp, tick.reading.timestamp);
}

#[tokio::test]
async fn test_quiet_household_raises_no_alerts() {
    let pipeline = spawn_pipeline(&steady_config(1_500.0), memory_storage());

    let tick = pipeline.monitor.tick_now().await.unwrap();

    assert!(tick.alerts.is_empty());
    assert!(pipeline.storage.query_active_alerts().await.unwrap().is_empty());
    let stats = pipeline.monitor.stats().await.unwrap();
    assert_eq!(stats.alerts_raised, 0);
    assert_eq!(stats.ticks_completed, 1);
}

#[tokio::test]
async fn test_usage_and_cost_follow_stored_history() {
    let config = steady_config(2_000.0);
    let pipeline = spawn_pipeline(&config, memory_storage());

    pipeline.monitor.tick_now().await.unwrap();
    let tick = pipeline.monitor.tick_now().await.unwrap();
    let reading = &tick.reading;

    assert!(reading.daily_usage >= 0.0);
    assert!(reading.monthly_usage >= reading.daily_usage);
    assert!((reading.cost_today - reading.daily_usage * config.electricity_rate).abs() < 1e-9);
    assert!((reading.cost_month - reading.monthly_usage * config.electricity_rate).abs() < 1e-9);
}

#[tokio::test]
async fn test_timestamps_strictly_increase() {
    let pipeline = spawn_pipeline(&Config::default(), memory_storage());

    let mut previous = None;
    for _ in 0..20 {
        let tick = pipeline.monitor.tick_now().await.unwrap();
        if let Some(previous) = previous {
            assert!(tick.reading.timestamp > previous);
        }
        for circuit in &tick.circuits {
            assert_eq!(circuit.timestamp, tick.reading.timestamp);
        }
        previous = Some(tick.reading.timestamp);
    }

    let history = pipeline.storage.query_usage_history(1).await.unwrap();
    assert_eq!(history.len(), 20);
    assert!(history.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
}

#[tokio::test]
async fn test_acknowledged_alerts_leave_active_list() {
    let pipeline = spawn_pipeline(&busy_config(), memory_storage());

    let first = pipeline.monitor.tick_now().await.unwrap();
    let first_id = first.alerts[0].id.clone();
    pipeline.storage.acknowledge_alert(&first_id).await.unwrap();
    // acknowledging twice is fine
    pipeline.storage.acknowledge_alert(&first_id).await.unwrap();

    let second = pipeline.monitor.tick_now().await.unwrap();
    let active = pipeline.storage.query_active_alerts().await.unwrap();

    assert!(active.iter().all(|a| a.id != first_id));
    assert!(active.iter().any(|a| a.id == second.alerts[0].id));
}

#[tokio::test]
async fn test_period_update_is_reported() {
    let pipeline = spawn_pipeline(&Config::default(), memory_storage());

    pipeline.monitor.update_period(250).await.unwrap();
    let stats = pipeline.monitor.stats().await.unwrap();
    assert_eq!(stats.period_ms, 250);

    // zero is rejected and the old period kept
    pipeline.monitor.update_period(0).await.unwrap();
    assert_eq!(pipeline.monitor.stats().await.unwrap().period_ms, 250);
}
