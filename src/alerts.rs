//! Threshold-based alert evaluation
//!
//! Every rule is evaluated on every tick and all matching rules fire together.
//! There is no suppression across ticks: a condition that persists produces a new
//! alert on each tick, which keeps the alert history continuous.
//!
//! ```text
//! total_power > 4000 W          → high_usage       (high above 4500 W, else medium)
//! voltage < 230 V or > 250 V    → voltage_anomaly  (medium)
//! voltage < 100 V               → power_outage     (critical)
//! circuit status == critical    → circuit_overload (high, one per circuit)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CIRCUIT_CRITICAL_PERCENT, CircuitReading, CircuitStatus, Reading};

pub const HIGH_USAGE_THRESHOLD: f64 = 4_000.0;

pub const HIGH_USAGE_SEVERE: f64 = 4_500.0;

pub const VOLTAGE_LOW: f64 = 230.0;

pub const VOLTAGE_HIGH: f64 = 250.0;

pub const OUTAGE_VOLTAGE: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    HighUsage,
    VoltageAnomaly,
    CircuitOverload,
    PowerOutage,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::HighUsage => "high_usage",
            AlertKind::VoltageAnomaly => "voltage_anomaly",
            AlertKind::CircuitOverload => "circuit_overload",
            AlertKind::PowerOutage => "power_outage",
        }
    }
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AlertKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high_usage" => Ok(AlertKind::HighUsage),
            "voltage_anomaly" => Ok(AlertKind::VoltageAnomaly),
            "circuit_overload" => Ok(AlertKind::CircuitOverload),
            "power_outage" => Ok(AlertKind::PowerOutage),
            other => Err(format!("unknown alert type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Low => "low",
            AlertSeverity::Medium => "medium",
            AlertSeverity::High => "high",
            AlertSeverity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AlertSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(AlertSeverity::Low),
            "medium" => Ok(AlertSeverity::Medium),
            "high" => Ok(AlertSeverity::High),
            "critical" => Ok(AlertSeverity::Critical),
            other => Err(format!("unknown alert severity '{other}'")),
        }
    }
}

/// A threshold breach raised for one tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub circuit_id: Option<String>,
    pub value: f64,
    pub threshold: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub acknowledged: bool,
}

impl Alert {
    fn for_reading(
        reading: &Reading,
        kind: AlertKind,
        severity: AlertSeverity,
        value: f64,
        threshold: f64,
        message: String,
    ) -> Self {
        Self {
            id: format!("{}-{kind}", reading.id),
            kind,
            severity,
            message,
            circuit_id: None,
            value,
            threshold,
            timestamp: reading.timestamp,
            acknowledged: false,
        }
    }
}

/// Stateless evaluator turning a reading into alerts
pub struct AlertEngine;

impl AlertEngine {
    /// Evaluate a reading and its circuit breakdown against the fixed thresholds.
    ///
    /// The result depends only on the inputs; alert ids are derived from the reading id
    /// so evaluating the same tick twice yields identical alerts.
    pub fn evaluate(reading: &Reading, circuits: &[CircuitReading]) -> Vec<Alert> {
        let mut alerts = Vec::new();

        if reading.total_power > HIGH_USAGE_THRESHOLD {
            let severity = if reading.total_power > HIGH_USAGE_SEVERE {
                AlertSeverity::High
            } else {
                AlertSeverity::Medium
            };
            alerts.push(Alert::for_reading(
                reading,
                AlertKind::HighUsage,
                severity,
                reading.total_power,
                HIGH_USAGE_THRESHOLD,
                format!(
                    "High power usage: {:.0} W exceeds {:.0} W",
                    reading.total_power, HIGH_USAGE_THRESHOLD
                ),
            ));
        }

        if reading.voltage < VOLTAGE_LOW || reading.voltage > VOLTAGE_HIGH {
            let (bound, direction) = if reading.voltage < VOLTAGE_LOW {
                (VOLTAGE_LOW, "below")
            } else {
                (VOLTAGE_HIGH, "above")
            };
            alerts.push(Alert::for_reading(
                reading,
                AlertKind::VoltageAnomaly,
                AlertSeverity::Medium,
                reading.voltage,
                bound,
                format!(
                    "Voltage anomaly: {:.1} V is {direction} {bound:.0} V",
                    reading.voltage
                ),
            ));
        }

        if reading.voltage < OUTAGE_VOLTAGE {
            alerts.push(Alert::for_reading(
                reading,
                AlertKind::PowerOutage,
                AlertSeverity::Critical,
                reading.voltage,
                OUTAGE_VOLTAGE,
                format!("Possible power outage: supply at {:.1} V", reading.voltage),
            ));
        }

        for circuit in circuits
            .iter()
            .filter(|c| c.status == CircuitStatus::Critical)
        {
            alerts.push(Alert {
                id: format!(
                    "{}-{}-{}",
                    reading.id,
                    AlertKind::CircuitOverload,
                    circuit.circuit_id
                ),
                kind: AlertKind::CircuitOverload,
                severity: AlertSeverity::High,
                message: format!(
                    "Circuit {} overloaded: {:.1}% of capacity",
                    circuit.circuit_name, circuit.percentage
                ),
                circuit_id: Some(circuit.circuit_id.clone()),
                value: circuit.percentage,
                threshold: CIRCUIT_CRITICAL_PERCENT,
                timestamp: reading.timestamp,
                acknowledged: false,
            });
        }

        alerts
    }
}
