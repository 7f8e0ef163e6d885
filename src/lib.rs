pub mod actors;
pub mod alerts;
pub mod api;
pub mod broadcaster;
pub mod client;
pub mod config;
pub mod protocol;
pub mod sampling;
pub mod storage;
pub mod util;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Percentage of circuit capacity at which a circuit counts as critical
pub const CIRCUIT_CRITICAL_PERCENT: f64 = 90.0;

/// Percentage of circuit capacity at which a circuit counts as warning
pub const CIRCUIT_WARNING_PERCENT: f64 = 75.0;

/// Aggregate snapshot produced by one sampling tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    /// Watts
    pub total_power: f64,
    /// Volts
    pub voltage: f64,
    /// Amperes
    pub current: f64,
    /// Hertz
    pub frequency: f64,
    pub power_factor: f64,
    /// kWh since midnight
    pub daily_usage: f64,
    /// kWh since the first of the month
    pub monthly_usage: f64,
    pub cost_today: f64,
    pub cost_month: f64,
}

/// Share of one [`Reading`] attributed to a named circuit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitReading {
    pub id: String,
    pub circuit_id: String,
    pub circuit_name: String,
    pub power: f64,
    pub voltage: f64,
    pub current: f64,
    /// Load relative to circuit capacity, always within `[0, 100]`
    pub percentage: f64,
    pub status: CircuitStatus,
    pub timestamp: DateTime<Utc>,
}

/// Everything one sampling tick produced, in the order it was produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickResult {
    pub reading: Reading,
    pub circuits: Vec<CircuitReading>,
    #[serde(default)]
    pub alerts: Vec<alerts::Alert>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CircuitStatus {
    Normal,
    Warning,
    Critical,
}

impl CircuitStatus {
    /// Derive the status of a circuit from its load percentage
    pub fn from_percentage(percentage: f64) -> Self {
        if percentage >= CIRCUIT_CRITICAL_PERCENT {
            CircuitStatus::Critical
        } else if percentage >= CIRCUIT_WARNING_PERCENT {
            CircuitStatus::Warning
        } else {
            CircuitStatus::Normal
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitStatus::Normal => "normal",
            CircuitStatus::Warning => "warning",
            CircuitStatus::Critical => "critical",
        }
    }
}

impl std::fmt::Display for CircuitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CircuitStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(CircuitStatus::Normal),
            "warning" => Ok(CircuitStatus::Warning),
            "critical" => Ok(CircuitStatus::Critical),
            other => Err(format!("unknown circuit status '{other}'")),
        }
    }
}
