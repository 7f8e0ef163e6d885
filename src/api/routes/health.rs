//! Health check endpoint

use axum::{Json, extract::State};
use tracing::warn;

use crate::api::state::ApiState;
use crate::api::types::HealthResponse;

/// GET /api/v1/health
///
/// Always answers 200; a failing storage backend is reported as "degraded".
pub async fn health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    let (status, storage) = match state.storage.health_check().await {
        Ok(health) if health.healthy => ("ok", health.message),
        Ok(health) => ("degraded", health.message),
        Err(e) => {
            warn!("storage health check failed: {}", e);
            ("degraded", e.to_string())
        }
    };

    Json(HealthResponse {
        status: status.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        storage,
        subscribers: state.broadcaster.subscriber_count(),
    })
}
