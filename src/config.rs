use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use tracing::trace;

/// Storage backend configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./energy.db")
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sampling: SamplingConfig,

    #[serde(default = "default_circuits")]
    pub circuits: Vec<CircuitConfig>,

    /// Currency per kWh
    #[serde(default = "default_electricity_rate")]
    pub electricity_rate: f64,

    /// Storage configuration (optional - defaults to SQLite)
    pub storage: Option<StorageConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sampling: SamplingConfig::default(),
            circuits: default_circuits(),
            electricity_rate: default_electricity_rate(),
            storage: None,
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct SamplingConfig {
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,
    #[serde(default = "default_base_load")]
    pub base_load_watts: f64,
    #[serde(default = "default_diurnal_amplitude")]
    pub diurnal_amplitude_watts: f64,
    #[serde(default = "default_noise")]
    pub noise_watts: f64,
    #[serde(default = "default_circuit_noise")]
    pub circuit_noise_watts: f64,
    #[serde(default = "default_nominal_voltage")]
    pub nominal_voltage: f64,
    #[serde(default = "default_voltage_band")]
    pub voltage_band: f64,
    #[serde(default = "default_nominal_frequency")]
    pub nominal_frequency: f64,
    #[serde(default = "default_frequency_band")]
    pub frequency_band: f64,
}

impl SamplingConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            period_ms: default_period_ms(),
            base_load_watts: default_base_load(),
            diurnal_amplitude_watts: default_diurnal_amplitude(),
            noise_watts: default_noise(),
            circuit_noise_watts: default_circuit_noise(),
            nominal_voltage: default_nominal_voltage(),
            voltage_band: default_voltage_band(),
            nominal_frequency: default_nominal_frequency(),
            frequency_band: default_frequency_band(),
        }
    }
}

/// Reconnect policy of a push channel subscriber
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ReconnectConfig {
    #[serde(default = "default_reconnect_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl ReconnectConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_attempts == 0 {
            bail!("max reconnect attempts must be greater than zero");
        }
        Ok(())
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_reconnect_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct CircuitConfig {
    pub id: String,
    pub name: String,
    /// Capacity limit in watts
    pub capacity_watts: f64,
    /// Share of total power drawn by this circuit
    #[serde(default)]
    pub weight: f64,
    /// The main circuit carries the whole household load
    #[serde(default)]
    pub main: bool,
}

impl CircuitConfig {
    pub fn new(id: &str, name: &str, capacity_watts: f64, weight: f64) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            capacity_watts,
            weight,
            main: false,
        }
    }

    pub fn main(id: &str, name: &str, capacity_watts: f64) -> Self {
        Self {
            main: true,
            ..Self::new(id, name, capacity_watts, 1.0)
        }
    }
}

fn default_circuits() -> Vec<CircuitConfig> {
    vec![
        CircuitConfig::main("main", "Main Panel", 48_000.0),
        CircuitConfig::new("hvac", "HVAC", 7_200.0, 0.35),
        CircuitConfig::new("kitchen", "Kitchen", 4_800.0, 0.25),
        CircuitConfig::new("laundry", "Laundry", 4_800.0, 0.15),
        CircuitConfig::new("office", "Office", 3_600.0, 0.15),
        CircuitConfig::new("lighting", "Lighting", 3_600.0, 0.10),
    ]
}

fn default_period_ms() -> u64 {
    5_000
}

fn default_base_load() -> f64 {
    2_000.0
}

fn default_diurnal_amplitude() -> f64 {
    1_200.0
}

fn default_noise() -> f64 {
    300.0
}

fn default_circuit_noise() -> f64 {
    50.0
}

fn default_nominal_voltage() -> f64 {
    240.0
}

fn default_voltage_band() -> f64 {
    5.0
}

fn default_nominal_frequency() -> f64 {
    60.0
}

fn default_frequency_band() -> f64 {
    0.1
}

fn default_reconnect_delay_ms() -> u64 {
    3_000
}

fn default_max_attempts() -> u32 {
    10
}

fn default_electricity_rate() -> f64 {
    0.12
}

impl Config {
    /// Reject configurations the sampler cannot work with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.sampling.period_ms == 0 {
            bail!("sampling period must be greater than zero");
        }
        if self.circuits.is_empty() {
            bail!("at least one circuit must be configured");
        }
        if self.circuits.iter().filter(|c| c.main).count() > 1 {
            bail!("only one circuit may be marked as main");
        }
        for circuit in &self.circuits {
            if circuit.capacity_watts.is_nan() || circuit.capacity_watts <= 0.0 {
                bail!("circuit '{}' needs a positive capacity", circuit.id);
            }
            if circuit.weight < 0.0 {
                bail!("circuit '{}' has a negative weight", circuit.id);
            }
        }
        if self.electricity_rate < 0.0 {
            bail!("electricity rate must not be negative");
        }
        Ok(())
    }
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content =
        std::fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
    let config: Config = serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))?;
    config.validate()?;
    trace!("loaded config: {config:?}");
    Ok(config)
}
