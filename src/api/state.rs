//! API shared state

use crate::actors::MonitorHandle;
use crate::broadcaster::Broadcaster;
use crate::storage::SharedStorage;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Backend for readings, circuit breakdowns and alerts
    pub storage: SharedStorage,

    /// Fan-out for push channel sessions
    pub broadcaster: Broadcaster,

    /// Handle to the sampling actor
    pub monitor: MonitorHandle,
}

impl ApiState {
    pub fn new(storage: SharedStorage, broadcaster: Broadcaster, monitor: MonitorHandle) -> Self {
        Self {
            storage,
            broadcaster,
            monitor,
        }
    }
}
