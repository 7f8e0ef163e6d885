//! Reading generation
//!
//! A [`Sampler`] turns the current time into one aggregate [`Reading`] plus one
//! [`CircuitReading`] per configured circuit. It never runs concurrently with itself: the
//! monitor actor owns it and drives it from a single loop.

pub mod circuits;
pub mod load;
pub mod usage;

use std::fmt;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, instrument};

use crate::config::{CircuitConfig, Config};
use crate::storage::SharedStorage;
use crate::{CircuitReading, Reading};
use load::LoadModel;

#[derive(Debug)]
pub enum SamplingError {
    /// A generated value left its plausible band
    OutOfBand(String),
}

impl fmt::Display for SamplingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SamplingError::OutOfBand(msg) => write!(f, "implausible sample: {}", msg),
        }
    }
}

impl std::error::Error for SamplingError {}

pub struct Sampler {
    model: LoadModel,
    circuits: Vec<CircuitConfig>,
    electricity_rate: f64,
    storage: SharedStorage,
    rng: StdRng,
    last_timestamp: Option<DateTime<Utc>>,
}

impl Sampler {
    pub fn new(config: &Config, storage: SharedStorage) -> Self {
        Self::with_rng(config, storage, StdRng::from_os_rng())
    }

    /// Sampler with a fixed seed, producing the same noise on every run
    pub fn seeded(config: &Config, storage: SharedStorage, seed: u64) -> Self {
        Self::with_rng(config, storage, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: &Config, storage: SharedStorage, rng: StdRng) -> Self {
        Self {
            model: LoadModel::new(config.sampling.clone()),
            circuits: config.circuits.clone(),
            electricity_rate: config.electricity_rate,
            storage,
            rng,
            last_timestamp: None,
        }
    }

    pub fn storage(&self) -> &SharedStorage {
        &self.storage
    }

    pub fn circuits(&self) -> &[CircuitConfig] {
        &self.circuits
    }

    pub async fn tick(&mut self) -> Result<(Reading, Vec<CircuitReading>), SamplingError> {
        self.tick_at(Utc::now()).await
    }

    /// Produce the reading for the given instant
    ///
    /// Timestamps are millisecond precision and strictly increasing: if `at` does not lie
    /// after the previous tick, the previous timestamp plus one millisecond is used.
    #[instrument(skip(self))]
    pub async fn tick_at(
        &mut self,
        at: DateTime<Utc>,
    ) -> Result<(Reading, Vec<CircuitReading>), SamplingError> {
        let timestamp = self.next_timestamp(at);

        let sample = self.model.sample(timestamp, &mut self.rng);
        self.model.validate(&sample)?;

        let usage = usage::estimate(self.storage.as_ref(), sample.total_power, timestamp).await;
        let (cost_today, cost_month) = usage.cost(self.electricity_rate);

        let reading = Reading {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp,
            total_power: sample.total_power,
            voltage: sample.voltage,
            current: sample.current,
            frequency: sample.frequency,
            power_factor: sample.power_factor,
            daily_usage: usage.daily_usage,
            monthly_usage: usage.monthly_usage,
            cost_today,
            cost_month,
        };

        let circuits = circuits::apportion(
            &self.circuits,
            &sample,
            timestamp,
            self.model.config().circuit_noise_watts,
            &mut self.rng,
        );

        debug!(
            "sampled {:.0} W at {:.1} V across {} circuits",
            reading.total_power,
            reading.voltage,
            circuits.len()
        );

        Ok((reading, circuits))
    }

    fn next_timestamp(&mut self, at: DateTime<Utc>) -> DateTime<Utc> {
        let at = at.trunc_subsecs(3);
        let timestamp = match self.last_timestamp {
            Some(previous) if at <= previous => previous + Duration::milliseconds(1),
            _ => at,
        };
        self.last_timestamp = Some(timestamp);
        timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::TimeZone;

    use crate::storage::{MemoryBackend, StorageBackend};

    fn sampler() -> Sampler {
        Sampler::seeded(&Config::default(), Arc::new(MemoryBackend::new()), 3)
    }

    #[tokio::test]
    async fn test_tick_pairs_reading_with_every_circuit() {
        let mut sampler = sampler();

        let (reading, circuits) = sampler.tick().await.unwrap();

        assert_eq!(circuits.len(), 6);
        assert!(circuits.iter().all(|c| c.timestamp == reading.timestamp));
        assert!((0.0..=1.0).contains(&reading.power_factor));
        assert!((235.0..=245.0).contains(&reading.voltage));
    }

    #[tokio::test]
    async fn test_timestamps_strictly_increase() {
        let mut sampler = sampler();
        let frozen = Utc.with_ymd_and_hms(2026, 2, 2, 12, 0, 0).unwrap();

        let (first, _) = sampler.tick_at(frozen).await.unwrap();
        let (second, _) = sampler.tick_at(frozen).await.unwrap();
        let (third, _) = sampler.tick_at(frozen - Duration::seconds(10)).await.unwrap();

        assert_eq!(first.timestamp, frozen);
        assert_eq!(second.timestamp, frozen + Duration::milliseconds(1));
        assert_eq!(third.timestamp, frozen + Duration::milliseconds(2));
    }

    #[tokio::test]
    async fn test_costs_follow_rate() {
        let config = Config {
            electricity_rate: 0.25,
            ..Config::default()
        };
        let mut sampler = Sampler::seeded(&config, Arc::new(MemoryBackend::new()), 9);

        let (reading, _) = sampler.tick().await.unwrap();

        assert!((reading.cost_today - reading.daily_usage * 0.25).abs() < 1e-9);
        assert!((reading.cost_month - reading.monthly_usage * 0.25).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_usage_uses_stored_average() {
        let storage = Arc::new(MemoryBackend::new());
        let at = Utc.with_ymd_and_hms(2026, 5, 10, 6, 0, 0).unwrap();

        let mut earlier = sampler().tick_at(at - Duration::hours(1)).await.unwrap().0;
        earlier.total_power = 1000.0;
        storage.store_reading(&earlier).await.unwrap();

        let mut sampler = Sampler::seeded(&Config::default(), storage, 3);
        let (reading, _) = sampler.tick_at(at).await.unwrap();

        // stored average of 1 kW over 6 h
        assert!((reading.daily_usage - 6.0).abs() < 1e-9);
    }
}
