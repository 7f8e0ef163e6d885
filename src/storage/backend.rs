//! Storage backend trait definition
//!
//! The sampling pipeline treats every call on this trait as best-effort: failures are
//! logged by the caller and never abort a tick.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::error::StorageResult;
use crate::alerts::Alert;
use crate::{CircuitReading, Reading};

/// Upper bound on the number of alerts returned by [`StorageBackend::query_active_alerts`]
pub const ACTIVE_ALERT_LIMIT: usize = 500;

/// Average stored power since the start of the current day and month
///
/// `None` means no readings exist in that window.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UsageTotals {
    pub day_average_power: Option<f64>,
    pub month_average_power: Option<f64>,
}

/// Health status of the storage backend
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: HashMap<String, String>,
}

/// Durable store for readings, circuit breakdowns and alerts
///
/// Implementations must be `Send + Sync` as they are shared between the sampling actor
/// and the API handlers.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn store_reading(&self, reading: &Reading) -> StorageResult<()>;

    /// Store the circuit breakdown of one reading
    async fn store_circuit_readings(&self, circuits: &[CircuitReading]) -> StorageResult<()>;

    async fn store_alert(&self, alert: &Alert) -> StorageResult<()>;

    async fn query_latest_reading(&self) -> StorageResult<Option<Reading>>;

    /// The circuit breakdown belonging to the most recent reading
    async fn query_circuit_readings(&self) -> StorageResult<Vec<CircuitReading>>;

    /// Readings of the last `window_hours` hours, oldest first
    async fn query_usage_history(&self, window_hours: u32) -> StorageResult<Vec<Reading>>;

    /// Average `total_power` of the readings stored since each boundary
    async fn query_usage_totals(
        &self,
        day_start: DateTime<Utc>,
        month_start: DateTime<Utc>,
    ) -> StorageResult<UsageTotals>;

    /// Unacknowledged alerts, newest first, at most [`ACTIVE_ALERT_LIMIT`]
    async fn query_active_alerts(&self) -> StorageResult<Vec<Alert>>;

    /// Mark an alert as acknowledged
    ///
    /// Acknowledging an already acknowledged alert succeeds without effect. An unknown id
    /// yields [`StorageError::NotFound`](super::StorageError::NotFound).
    async fn acknowledge_alert(&self, id: &str) -> StorageResult<()>;

    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Close the backend and release resources
    async fn close(&self) -> StorageResult<()>;
}
