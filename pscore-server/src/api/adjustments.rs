//! Adjustment endpoints

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use super::caller;
use crate::services::{AdjustmentOutcome, AdjustmentRequest, GroupAdjustmentReport, MemberAdjustment};
use crate::{ApiResult, AppState};

/// POST /api/adjustments
///
/// **Request:** `{"tier": "task", "score_id": "...", "delta": -10, "reason": "late"}`
/// or by natural key `{"tier": "stage", "entity_id": "...", "user_id": "...", ...}`
///
/// **Errors:**
/// - 400: non-finite delta, or non-zero delta without a reason
/// - 403: caller is not a leader of the owning group
/// - 404: target row, task, stage, group or assignment absent
pub async fn apply_adjustment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<AdjustmentRequest>,
) -> ApiResult<Json<AdjustmentOutcome>> {
    let actor = caller(&state, &headers)?;
    Ok(Json(state.adjustments.apply_adjustment(&request, actor).await?))
}

/// Either one delta for every assignee or an explicit list
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum GroupAdjustmentRequest {
    PerMember { members: Vec<MemberAdjustment> },
    Uniform {
        delta: f64,
        #[serde(default)]
        reason: Option<String>,
    },
}

/// POST /api/tasks/:task_id/group-adjustment
///
/// Per-member failures are reported in `outcomes`, not as an error status.
pub async fn apply_group_adjustment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(task_id): Path<Uuid>,
    Json(request): Json<GroupAdjustmentRequest>,
) -> ApiResult<Json<GroupAdjustmentReport>> {
    let actor = caller(&state, &headers)?;

    let report = match request {
        GroupAdjustmentRequest::Uniform { delta, reason } => {
            state
                .adjustments
                .apply_group_adjustment(task_id, delta, reason.as_deref(), actor)
                .await?
        }
        GroupAdjustmentRequest::PerMember { members } => {
            state
                .adjustments
                .apply_member_adjustments(task_id, &members, actor)
                .await?
        }
    };

    Ok(Json(report))
}

pub fn adjustment_routes() -> Router<AppState> {
    Router::new()
        .route("/api/adjustments", post(apply_adjustment))
        .route("/api/tasks/:task_id/group-adjustment", post(apply_group_adjustment))
}
