//! Reading, circuit and usage history endpoints

use axum::{
    Json,
    extract::{Query, State},
};

use crate::api::error::{ApiError, ApiResult};
use crate::api::state::ApiState;
use crate::api::types::{CircuitsResponse, LatestReadingResponse, UsageQuery, UsageResponse};

/// Longest history window served, one year
const MAX_USAGE_HOURS: u32 = 24 * 366;

/// GET /api/v1/readings/latest
pub async fn get_latest_reading(
    State(state): State<ApiState>,
) -> ApiResult<Json<LatestReadingResponse>> {
    let reading = state.storage.query_latest_reading().await?;
    Ok(Json(LatestReadingResponse { reading }))
}

/// GET /api/v1/circuits
pub async fn get_circuits(State(state): State<ApiState>) -> ApiResult<Json<CircuitsResponse>> {
    let circuits = state.storage.query_circuit_readings().await?;
    Ok(Json(CircuitsResponse { circuits }))
}

/// GET /api/v1/usage?hours=N
///
/// Readings of the last N hours (default 24), oldest first.
pub async fn get_usage(
    State(state): State<ApiState>,
    Query(query): Query<UsageQuery>,
) -> ApiResult<Json<UsageResponse>> {
    if query.hours == 0 || query.hours > MAX_USAGE_HOURS {
        return Err(ApiError::InvalidRequest(format!(
            "hours must be between 1 and {MAX_USAGE_HOURS}"
        )));
    }

    let readings = state.storage.query_usage_history(query.hours).await?;

    Ok(Json(UsageResponse {
        hours: query.hours,
        count: readings.len(),
        readings,
    }))
}
