//! Daily and monthly energy usage estimates
//!
//! The aggregate estimate averages the stored readings since the start of the day (or
//! month) and scales the average by the elapsed time. When the store cannot answer, or a
//! window holds no readings yet, the current tick's power is used for that window instead.

use chrono::{DateTime, Datelike, NaiveTime, Utc};
use tracing::{trace, warn};

use crate::storage::{StorageBackend, UsageTotals};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UsageEstimate {
    /// kWh since 00:00 UTC
    pub daily_usage: f64,
    /// kWh since the first of the month, 00:00 UTC
    pub monthly_usage: f64,
}

impl UsageEstimate {
    pub fn cost(&self, rate: f64) -> (f64, f64) {
        (self.daily_usage * rate, self.monthly_usage * rate)
    }
}

pub fn day_start(at: DateTime<Utc>) -> DateTime<Utc> {
    at.date_naive().and_time(NaiveTime::MIN).and_utc()
}

pub fn month_start(at: DateTime<Utc>) -> DateTime<Utc> {
    let date = at.date_naive();
    date.with_day(1)
        .unwrap_or(date)
        .and_time(NaiveTime::MIN)
        .and_utc()
}

pub fn hours_since(at: DateTime<Utc>, start: DateTime<Utc>) -> f64 {
    ((at - start).num_milliseconds() as f64 / 3_600_000.0).max(0.0)
}

/// Usage assuming the current power was drawn for the whole window
pub fn local_estimate(power_watts: f64, at: DateTime<Utc>) -> UsageEstimate {
    let kw = power_watts / 1000.0;
    UsageEstimate {
        daily_usage: kw * hours_since(at, day_start(at)),
        monthly_usage: kw * hours_since(at, month_start(at)),
    }
}

/// Usage from stored averages, falling back per window when a window is empty
pub fn from_totals(totals: UsageTotals, power_watts: f64, at: DateTime<Utc>) -> UsageEstimate {
    let day_power = totals.day_average_power.unwrap_or(power_watts);
    let month_power = totals.month_average_power.unwrap_or(power_watts);
    UsageEstimate {
        daily_usage: day_power / 1000.0 * hours_since(at, day_start(at)),
        monthly_usage: month_power / 1000.0 * hours_since(at, month_start(at)),
    }
}

/// Query the store for aggregate usage, falling back to the local estimate on failure
pub async fn estimate(
    storage: &dyn StorageBackend,
    power_watts: f64,
    at: DateTime<Utc>,
) -> UsageEstimate {
    match storage
        .query_usage_totals(day_start(at), month_start(at))
        .await
    {
        Ok(totals) => {
            trace!("usage totals from storage: {:?}", totals);
            from_totals(totals, power_watts, at)
        }
        Err(e) => {
            warn!("usage query failed, using local estimate: {}", e);
            local_estimate(power_watts, at)
        }
    }
}
