//! Shared API response types
//!
//! These types are shared between the hub's HTTP handlers and the tail client, so both
//! sides agree on the JSON shape.

use serde::{Deserialize, Serialize};

use crate::alerts::Alert;
use crate::{CircuitReading, Reading};

/// Health check response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// "ok" when storage is healthy, "degraded" otherwise
    pub status: String,
    pub timestamp: String,
    pub storage: String,
    /// Number of connected push channel subscribers
    pub subscribers: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestReadingResponse {
    /// `None` until the first reading was stored
    pub reading: Option<Reading>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitsResponse {
    pub circuits: Vec<CircuitReading>,
}

/// Query parameters for the usage history
#[derive(Debug, Clone, Deserialize)]
pub struct UsageQuery {
    /// History window in hours (default: 24)
    #[serde(default = "default_usage_hours")]
    pub hours: u32,
}

pub fn default_usage_hours() -> u32 {
    24
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageResponse {
    pub hours: u32,
    pub count: usize,
    /// Oldest first
    pub readings: Vec<Reading>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertsResponse {
    pub count: usize,
    /// Newest first
    pub alerts: Vec<Alert>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcknowledgeResponse {
    pub id: String,
    pub acknowledged: bool,
}
