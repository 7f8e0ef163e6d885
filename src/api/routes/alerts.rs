//! Alert endpoints

use axum::{
    Json,
    extract::{Path, State},
};
use tracing::info;

use crate::api::error::ApiResult;
use crate::api::state::ApiState;
use crate::api::types::{AcknowledgeResponse, AlertsResponse};
use crate::protocol::Envelope;

/// GET /api/v1/alerts
///
/// Unacknowledged alerts, newest first.
pub async fn list_alerts(State(state): State<ApiState>) -> ApiResult<Json<AlertsResponse>> {
    let alerts = state.storage.query_active_alerts().await?;
    Ok(Json(AlertsResponse {
        count: alerts.len(),
        alerts,
    }))
}

/// POST /api/v1/alerts/:id/acknowledge
///
/// Idempotent. Subscribers are told through an `alert_acknowledged` envelope.
pub async fn acknowledge_alert(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<AcknowledgeResponse>> {
    state.storage.acknowledge_alert(&id).await?;

    info!("alert {} acknowledged", id);
    state
        .broadcaster
        .publish_envelope(Envelope::alert_acknowledged(id.clone()));

    Ok(Json(AcknowledgeResponse {
        id,
        acknowledged: true,
    }))
}
