//! Message types for actor communication
//!
//! Commands are sent to a specific actor over its mpsc channel; queries carry a oneshot
//! sender for the reply.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::TickResult;
use crate::sampling::SamplingError;

/// Commands that can be sent to the MonitorActor
#[derive(Debug)]
pub enum MonitorCommand {
    /// Enable the periodic ticker
    ///
    /// The first tick runs immediately, later ones follow the configured period.
    Start {
        respond_to: oneshot::Sender<MonitorStats>,
    },

    /// Disable the periodic ticker
    ///
    /// A tick that is already running completes first.
    Stop {
        respond_to: oneshot::Sender<MonitorStats>,
    },

    /// Run one tick now, whether or not the ticker is enabled
    TickNow {
        respond_to: oneshot::Sender<Result<TickResult, SamplingError>>,
    },

    /// Change the sampling period
    UpdatePeriod { period_ms: u64 },

    GetStats {
        respond_to: oneshot::Sender<MonitorStats>,
    },
}

/// Counters describing the sampling loop
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorStats {
    /// Whether the periodic ticker is active
    pub enabled: bool,

    pub period_ms: u64,

    pub ticks_completed: u64,

    /// Ticks skipped because sampling failed
    pub ticks_failed: u64,

    pub alerts_raised: u64,

    /// Individual store calls that failed
    pub persistence_failures: u64,

    pub last_tick: Option<DateTime<Utc>>,
}
