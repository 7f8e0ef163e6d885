//! Helper functions for integration tests
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use energy_monitoring::{
    Reading, TickResult,
    actors::MonitorHandle,
    broadcaster::Broadcaster,
    config::Config,
    protocol::{Envelope, Payload},
    sampling::Sampler,
    storage::SharedStorage,
};
use tokio::sync::broadcast;

/// Flat load without noise, so every tick produces the same power
pub fn steady_config(base_load_watts: f64) -> Config {
    let mut config = Config::default();
    config.sampling.base_load_watts = base_load_watts;
    config.sampling.diurnal_amplitude_watts = 0.0;
    config.sampling.noise_watts = 0.0;
    config.sampling.circuit_noise_watts = 0.0;
    config
}

/// Config whose every tick raises a high usage alert
pub fn busy_config() -> Config {
    steady_config(4_800.0)
}

pub struct Pipeline {
    pub monitor: MonitorHandle,
    pub broadcaster: Broadcaster,
    pub storage: SharedStorage,
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.monitor.shutdown();
    }
}

pub fn spawn_pipeline(config: &Config, storage: SharedStorage) -> Pipeline {
    let broadcaster = Broadcaster::default();
    let sampler = Sampler::seeded(config, storage.clone(), 5);
    let monitor = MonitorHandle::spawn(sampler, broadcaster.clone(), Duration::from_millis(20));
    Pipeline {
        monitor,
        broadcaster,
        storage,
    }
}

pub fn memory_storage() -> SharedStorage {
    Arc::new(energy_monitoring::storage::MemoryBackend::new())
}

/// Wait for the next `energy_update` on a broadcast receiver
pub async fn next_update(updates: &mut broadcast::Receiver<Envelope>) -> TickResult {
    loop {
        let envelope = tokio::time::timeout(Duration::from_secs(2), updates.recv())
            .await
            .expect("update in time")
            .expect("broadcaster alive");
        if let Payload::EnergyUpdate(tick) = envelope.payload {
            return tick;
        }
    }
}

pub fn reading_at(id: &str, timestamp: DateTime<Utc>, total_power: f64) -> Reading {
    Reading {
        id: id.to_string(),
        timestamp,
        total_power,
        voltage: 240.0,
        current: total_power / 240.0,
        frequency: 60.0,
        power_factor: 0.92,
        daily_usage: 1.0,
        monthly_usage: 10.0,
        cost_today: 0.12,
        cost_month: 1.2,
    }
}
