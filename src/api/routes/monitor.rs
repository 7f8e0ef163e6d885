//! Sampling loop control endpoints

use axum::{Json, extract::State};

use crate::actors::MonitorStats;
use crate::api::error::ApiResult;
use crate::api::state::ApiState;

/// GET /api/v1/monitor
pub async fn get_monitor(State(state): State<ApiState>) -> ApiResult<Json<MonitorStats>> {
    Ok(Json(state.monitor.stats().await?))
}

/// POST /api/v1/monitor/start
pub async fn start_monitor(State(state): State<ApiState>) -> ApiResult<Json<MonitorStats>> {
    Ok(Json(state.monitor.start().await?))
}

/// POST /api/v1/monitor/stop
pub async fn stop_monitor(State(state): State<ApiState>) -> ApiResult<Json<MonitorStats>> {
    Ok(Json(state.monitor.stop().await?))
}
