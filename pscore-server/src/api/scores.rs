//! Score read API, history and reconciliation

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use pscore_common::db::models::{
    AdjustmentHistory, MemberFinalScore, MemberStageScore, ScoreRow, ScoreTier, TaskScore,
};
use pscore_common::Error;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::caller;
use crate::pagination::Pagination;
use crate::services::ReconcileReport;
use crate::store::final_scores::{self, FinalScoreFilter};
use crate::store::history::{self, HistoryFilter};
use crate::store::stage_scores::{self, StageScoreFilter};
use crate::store::task_scores::{self, TaskScoreFilter};
use crate::store::scores;
use crate::{ApiResult, AppState};

/// GET /api/groups/:group_id/task-scores
pub async fn list_task_scores(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(group_id): Path<Uuid>,
    Query(filter): Query<TaskScoreFilter>,
) -> ApiResult<Json<Vec<TaskScore>>> {
    caller(&state, &headers)?;
    Ok(Json(task_scores::list(&state.db, group_id, filter).await?))
}

/// GET /api/groups/:group_id/stage-scores
pub async fn list_stage_scores(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(group_id): Path<Uuid>,
    Query(filter): Query<StageScoreFilter>,
) -> ApiResult<Json<Vec<MemberStageScore>>> {
    caller(&state, &headers)?;
    Ok(Json(stage_scores::list(&state.db, group_id, filter).await?))
}

/// GET /api/groups/:group_id/final-scores
///
/// Ordered by final score, highest first.
pub async fn list_final_scores(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(group_id): Path<Uuid>,
    Query(filter): Query<FinalScoreFilter>,
) -> ApiResult<Json<Vec<MemberFinalScore>>> {
    caller(&state, &headers)?;
    Ok(Json(final_scores::list(&state.db, group_id, filter).await?))
}

/// GET /api/scores/:tier/:score_id
pub async fn get_score(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((tier, score_id)): Path<(ScoreTier, Uuid)>,
) -> ApiResult<Json<ScoreRow>> {
    caller(&state, &headers)?;
    let row = scores::get_row(&state.db, tier, score_id)
        .await?
        .ok_or_else(|| Error::not_found(format!("{} score {}", tier, score_id)))?;
    Ok(Json(row))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub tier: Option<ScoreTier>,
    pub score_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    #[serde(default = "default_page")]
    pub page: i64,
}

fn default_page() -> i64 {
    1
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub entries: Vec<AdjustmentHistory>,
    pub total: i64,
    #[serde(flatten)]
    pub pagination: Pagination,
}

/// GET /api/groups/:group_id/history
///
/// Newest first, 50 entries per page.
pub async fn list_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(group_id): Path<Uuid>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<HistoryResponse>> {
    caller(&state, &headers)?;

    let filter = HistoryFilter {
        tier: query.tier,
        score_id: query.score_id,
        user_id: query.user_id,
    };
    let page = history::list(&state.db, group_id, filter, query.page).await?;

    Ok(Json(HistoryResponse {
        entries: page.entries,
        total: page.total,
        pagination: page.pagination,
    }))
}

/// POST /api/groups/:group_id/reconcile
pub async fn reconcile_group(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(group_id): Path<Uuid>,
) -> ApiResult<Json<ReconcileReport>> {
    caller(&state, &headers)?;
    Ok(Json(state.reconciler.reconcile(group_id).await?))
}

pub fn score_routes() -> Router<AppState> {
    Router::new()
        .route("/api/groups/:group_id/task-scores", get(list_task_scores))
        .route("/api/groups/:group_id/stage-scores", get(list_stage_scores))
        .route("/api/groups/:group_id/final-scores", get(list_final_scores))
        .route("/api/groups/:group_id/history", get(list_history))
        .route("/api/groups/:group_id/reconcile", post(reconcile_group))
        .route("/api/scores/:tier/:score_id", get(get_score))
}
