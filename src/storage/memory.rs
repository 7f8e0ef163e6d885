//! In-memory storage backend (no persistence)
//!
//! Readings are kept in a ring buffer; when it is full the oldest reading is evicted.
//! Evicted readings are folded into hourly power sums so usage totals still cover a whole
//! month, at hour granularity beyond the buffer. Alerts are never evicted, matching their
//! "never deleted by the pipeline" lifecycle.
//!
//! Used when storage is configured as `none` and throughout the tests.

use std::collections::{BTreeMap, HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use super::backend::{ACTIVE_ALERT_LIMIT, HealthStatus, StorageBackend, UsageTotals};
use super::error::{StorageError, StorageResult};
use crate::alerts::Alert;
use crate::{CircuitReading, Reading};

/// One day of readings at the default five second period
pub const DEFAULT_READING_CAPACITY: usize = 17_280;

/// Hourly sums are kept this long after the newest evicted reading
const EVICTED_RETENTION_DAYS: i64 = 32;

#[derive(Debug, Default, Clone, Copy)]
struct PowerSum {
    sum: f64,
    count: usize,
}

impl PowerSum {
    fn add(&mut self, other: PowerSum) {
        self.sum += other.sum;
        self.count += other.count;
    }

    fn average(self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

#[derive(Default)]
struct MemoryState {
    readings: VecDeque<Reading>,
    /// Evicted readings, summed per hour
    evicted: BTreeMap<DateTime<Utc>, PowerSum>,
    circuits: Vec<CircuitReading>,
    alerts: Vec<Alert>,
}

impl MemoryState {
    fn evict(&mut self, reading: &Reading) {
        let hour = hour_start(reading.timestamp);
        self.evicted.entry(hour).or_default().add(PowerSum {
            sum: reading.total_power,
            count: 1,
        });
        self.evicted = self
            .evicted
            .split_off(&(hour - Duration::days(EVICTED_RETENTION_DAYS)));
    }

    fn average_since(&self, since: DateTime<Utc>) -> Option<f64> {
        let mut total = PowerSum::default();
        for reading in self.readings.iter().filter(|r| r.timestamp >= since) {
            total.add(PowerSum {
                sum: reading.total_power,
                count: 1,
            });
        }
        for sum in self.evicted.range(since..).map(|(_, sum)| *sum) {
            total.add(sum);
        }
        total.average()
    }
}

fn hour_start(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(timestamp.timestamp().div_euclid(3600) * 3600, 0).unwrap_or(timestamp)
}

pub struct MemoryBackend {
    state: RwLock<MemoryState>,
    capacity: usize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_READING_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            capacity: capacity.max(1),
        }
    }

    /// Number of readings currently held
    pub async fn reading_count(&self) -> usize {
        self.state.read().await.readings.len()
    }

    /// All alerts ever stored, acknowledged or not
    pub async fn all_alerts(&self) -> Vec<Alert> {
        self.state.read().await.alerts.clone()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn store_reading(&self, reading: &Reading) -> StorageResult<()> {
        let mut state = self.state.write().await;
        if state.readings.len() >= self.capacity {
            if let Some(oldest) = state.readings.pop_front() {
                state.evict(&oldest);
            }
        }
        state.readings.push_back(reading.clone());
        Ok(())
    }

    async fn store_circuit_readings(&self, circuits: &[CircuitReading]) -> StorageResult<()> {
        self.state.write().await.circuits = circuits.to_vec();
        Ok(())
    }

    async fn store_alert(&self, alert: &Alert) -> StorageResult<()> {
        self.state.write().await.alerts.push(alert.clone());
        Ok(())
    }

    async fn query_latest_reading(&self) -> StorageResult<Option<Reading>> {
        Ok(self.state.read().await.readings.back().cloned())
    }

    async fn query_circuit_readings(&self) -> StorageResult<Vec<CircuitReading>> {
        Ok(self.state.read().await.circuits.clone())
    }

    async fn query_usage_history(&self, window_hours: u32) -> StorageResult<Vec<Reading>> {
        let since = Utc::now() - Duration::hours(i64::from(window_hours));
        debug!("querying in-memory readings since {}", since);

        let state = self.state.read().await;
        Ok(state
            .readings
            .iter()
            .filter(|r| r.timestamp >= since)
            .cloned()
            .collect())
    }

    async fn query_usage_totals(
        &self,
        day_start: DateTime<Utc>,
        month_start: DateTime<Utc>,
    ) -> StorageResult<UsageTotals> {
        let state = self.state.read().await;
        Ok(UsageTotals {
            day_average_power: state.average_since(day_start),
            month_average_power: state.average_since(month_start),
        })
    }

    async fn query_active_alerts(&self) -> StorageResult<Vec<Alert>> {
        let state = self.state.read().await;
        Ok(state
            .alerts
            .iter()
            .rev()
            .filter(|a| !a.acknowledged)
            .take(ACTIVE_ALERT_LIMIT)
            .cloned()
            .collect())
    }

    async fn acknowledge_alert(&self, id: &str) -> StorageResult<()> {
        let mut state = self.state.write().await;
        let alert = state
            .alerts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        alert.acknowledged = true;
        Ok(())
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let state = self.state.read().await;
        Ok(HealthStatus {
            healthy: true,
            message: "In-memory storage operational".to_string(),
            metadata: HashMap::from([
                ("backend".to_string(), "memory".to_string()),
                ("readings".to_string(), state.readings.len().to_string()),
                ("alerts".to_string(), state.alerts.len().to_string()),
            ]),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing in-memory backend (no-op)");
        Ok(())
    }
}
