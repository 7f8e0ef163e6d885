use chrono::{DateTime, Utc};
use rand::Rng;

use super::load::{ElectricalSample, symmetric_noise};
use crate::config::CircuitConfig;
use crate::{CircuitReading, CircuitStatus};

/// Load of a circuit as a share of its capacity, clamped to `[0, 100]`
pub fn load_percentage(power: f64, capacity_watts: f64) -> f64 {
    let percentage = power / capacity_watts * 100.0;
    if percentage.is_nan() {
        return 0.0;
    }
    percentage.clamp(0.0, 100.0)
}

/// Split one tick's total power across the configured circuits
///
/// The main circuit carries the whole load; every other circuit takes its weighted share
/// plus independent noise. One reading is produced per configured circuit, in
/// configuration order, all sharing `timestamp`.
pub fn apportion<R: Rng + ?Sized>(
    circuits: &[CircuitConfig],
    sample: &ElectricalSample,
    timestamp: DateTime<Utc>,
    noise_watts: f64,
    rng: &mut R,
) -> Vec<CircuitReading> {
    circuits
        .iter()
        .map(|circuit| {
            let power = if circuit.main {
                sample.total_power
            } else {
                (sample.total_power * circuit.weight + symmetric_noise(rng, noise_watts)).max(0.0)
            };
            let percentage = load_percentage(power, circuit.capacity_watts);

            CircuitReading {
                id: uuid::Uuid::new_v4().to_string(),
                circuit_id: circuit.id.clone(),
                circuit_name: circuit.name.clone(),
                power,
                voltage: sample.voltage,
                current: power / sample.voltage,
                percentage,
                status: CircuitStatus::from_percentage(percentage),
                timestamp,
            }
        })
        .collect()
}
