//! Stage weight endpoints

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, put},
    Json, Router,
};
use pscore_common::db::models::StageWeight;
use serde::Deserialize;
use uuid::Uuid;

use super::caller;
use crate::services::WeightChange;
use crate::{ApiResult, AppState};

/// GET /api/groups/:group_id/weights
///
/// Only stages with an explicit weight are listed; the rest weigh 1.
pub async fn list_weights(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(group_id): Path<Uuid>,
) -> ApiResult<Json<Vec<StageWeight>>> {
    caller(&state, &headers)?;
    Ok(Json(state.weights.list(group_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct SetWeightRequest {
    pub weight: f64,
}

/// PUT /api/stages/:stage_id/weight
pub async fn set_weight(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(stage_id): Path<Uuid>,
    Json(request): Json<SetWeightRequest>,
) -> ApiResult<Json<WeightChange>> {
    let actor = caller(&state, &headers)?;
    Ok(Json(
        state
            .weights
            .set_stage_weight(stage_id, request.weight, actor)
            .await?,
    ))
}

/// DELETE /api/stages/:stage_id/weight
pub async fn reset_weight(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(stage_id): Path<Uuid>,
) -> ApiResult<Json<WeightChange>> {
    let actor = caller(&state, &headers)?;
    Ok(Json(state.weights.reset_stage_weight(stage_id, actor).await?))
}

pub fn weight_routes() -> Router<AppState> {
    Router::new()
        .route("/api/groups/:group_id/weights", get(list_weights))
        .route("/api/stages/:stage_id/weight", put(set_weight).delete(reset_weight))
}
