//! Household load model
//!
//! Total power follows a daily sine wave peaking at 12:00 UTC with bounded uniform noise on
//! top. Voltage, frequency and power factor are drawn from fixed bands.

use std::f64::consts::PI;

use chrono::{DateTime, Timelike, Utc};
use rand::Rng;

use super::SamplingError;
use crate::config::SamplingConfig;

pub const POWER_FACTOR_MIN: f64 = 0.85;
pub const POWER_FACTOR_MAX: f64 = 0.98;

/// Slack for float rounding when checking the configured bands
const BAND_EPSILON: f64 = 1e-9;

/// Raw electrical values for one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElectricalSample {
    pub total_power: f64,
    pub voltage: f64,
    pub current: f64,
    pub frequency: f64,
    pub power_factor: f64,
}

pub struct LoadModel {
    config: SamplingConfig,
}

/// Uniform draw from `[-band, band]`; a non-positive band yields zero
pub(crate) fn symmetric_noise<R: Rng + ?Sized>(rng: &mut R, band: f64) -> f64 {
    if band > 0.0 {
        rng.random_range(-band..=band)
    } else {
        0.0
    }
}

impl LoadModel {
    pub fn new(config: SamplingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SamplingConfig {
        &self.config
    }

    /// Noise-free load at the given time of day
    pub fn diurnal_baseline(&self, at: DateTime<Utc>) -> f64 {
        let hour = f64::from(at.num_seconds_from_midnight()) / 3600.0;
        let phase = 2.0 * PI * (hour - 6.0) / 24.0;
        (self.config.base_load_watts + self.config.diurnal_amplitude_watts * phase.sin()).max(0.0)
    }

    pub fn sample<R: Rng + ?Sized>(&self, at: DateTime<Utc>, rng: &mut R) -> ElectricalSample {
        let total_power =
            (self.diurnal_baseline(at) + symmetric_noise(rng, self.config.noise_watts)).max(0.0);
        let voltage =
            self.config.nominal_voltage + symmetric_noise(rng, self.config.voltage_band);
        let frequency =
            self.config.nominal_frequency + symmetric_noise(rng, self.config.frequency_band);
        let power_factor = rng.random_range(POWER_FACTOR_MIN..=POWER_FACTOR_MAX);

        ElectricalSample {
            total_power,
            voltage,
            current: total_power / (voltage * power_factor),
            frequency,
            power_factor,
        }
    }

    /// Check that a sample lies within the physically plausible bands
    pub fn validate(&self, sample: &ElectricalSample) -> Result<(), SamplingError> {
        let values = [
            ("total_power", sample.total_power),
            ("voltage", sample.voltage),
            ("current", sample.current),
            ("frequency", sample.frequency),
            ("power_factor", sample.power_factor),
        ];
        if let Some((name, value)) = values.iter().find(|(_, v)| !v.is_finite()) {
            return Err(SamplingError::OutOfBand(format!("{name} is not finite ({value})")));
        }

        if sample.total_power < 0.0 {
            return Err(SamplingError::OutOfBand(format!(
                "negative total power {:.1} W",
                sample.total_power
            )));
        }
        if !(0.0..=1.0).contains(&sample.power_factor) {
            return Err(SamplingError::OutOfBand(format!(
                "power factor {:.3} outside [0, 1]",
                sample.power_factor
            )));
        }

        let config = &self.config;
        let voltage_deviation = (sample.voltage - config.nominal_voltage).abs();
        if voltage_deviation > config.voltage_band.abs() + BAND_EPSILON {
            return Err(SamplingError::OutOfBand(format!(
                "voltage {:.1} V outside {:.0} ± {:.1} V",
                sample.voltage, config.nominal_voltage, config.voltage_band
            )));
        }
        let frequency_deviation = (sample.frequency - config.nominal_frequency).abs();
        if frequency_deviation > config.frequency_band.abs() + BAND_EPSILON {
            return Err(SamplingError::OutOfBand(format!(
                "frequency {:.2} Hz outside {:.0} ± {:.2} Hz",
                sample.frequency, config.nominal_frequency, config.frequency_band
            )));
        }

        Ok(())
    }
}
