//! Appeal endpoints

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use pscore_common::db::models::{AppealStatus, AppealTarget, ScoreAppeal};
use serde::Deserialize;
use uuid::Uuid;

use super::caller;
use crate::collaborators::AttachmentUpload;
use crate::services::AppealDetails;
use crate::{ApiError, ApiResult, AppState};

/// Attachment carried inline in the JSON body
#[derive(Debug, Deserialize)]
pub struct AttachmentPayload {
    pub file_name: String,
    #[serde(default)]
    pub content_type: Option<String>,
    /// Standard base64 of the file content
    pub data: String,
}

impl AttachmentPayload {
    fn decode(self) -> ApiResult<AttachmentUpload> {
        let bytes = STANDARD.decode(self.data.trim()).map_err(|e| {
            ApiError::BadRequest(format!("attachment {} is not valid base64: {}", self.file_name, e))
        })?;
        Ok(AttachmentUpload {
            file_name: self.file_name,
            content_type: self.content_type,
            bytes,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct SubmitAppealRequest {
    #[serde(flatten)]
    pub target: AppealTarget,
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<AttachmentPayload>,
}

/// POST /api/appeals
///
/// **Request:** `{"tier": "task", "target_id": "...", "content": "...",
/// "attachments": [{"file_name": "proof.png", "content_type": "image/png", "data": "<base64>"}]}`
pub async fn submit_appeal(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SubmitAppealRequest>,
) -> ApiResult<Json<ScoreAppeal>> {
    let user_id = caller(&state, &headers)?;

    let uploads = request
        .attachments
        .into_iter()
        .map(AttachmentPayload::decode)
        .collect::<ApiResult<Vec<_>>>()?;

    let appeal = state
        .appeals
        .submit_appeal(user_id, request.target, &request.content, uploads)
        .await?;
    Ok(Json(appeal))
}

/// GET /api/appeals/:appeal_id
///
/// Includes short-lived signed attachment links. Visible to the appellant
/// and to leaders of the group.
pub async fn get_appeal(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(appeal_id): Path<Uuid>,
) -> ApiResult<Json<AppealDetails>> {
    let requester = caller(&state, &headers)?;
    Ok(Json(state.appeals.get_appeal(appeal_id, requester).await?))
}

#[derive(Debug, Deserialize)]
pub struct ResolveAppealRequest {
    pub approve: bool,
    pub response: String,
}

/// POST /api/appeals/:appeal_id/resolve
///
/// **Errors:**
/// - 403: caller is not a leader of the appeal's group
/// - 404: unknown appeal
/// - 409: appeal already resolved
/// - 400: blank response
pub async fn resolve_appeal(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(appeal_id): Path<Uuid>,
    Json(request): Json<ResolveAppealRequest>,
) -> ApiResult<Json<ScoreAppeal>> {
    let reviewer = caller(&state, &headers)?;
    let appeal = state
        .appeals
        .resolve_appeal(appeal_id, reviewer, request.approve, &request.response)
        .await?;
    Ok(Json(appeal))
}

#[derive(Debug, Deserialize)]
pub struct AppealListQuery {
    pub status: Option<AppealStatus>,
}

/// GET /api/groups/:group_id/appeals
pub async fn list_group_appeals(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(group_id): Path<Uuid>,
    Query(query): Query<AppealListQuery>,
) -> ApiResult<Json<Vec<ScoreAppeal>>> {
    let requester = caller(&state, &headers)?;
    Ok(Json(
        state
            .appeals
            .list_group_appeals(group_id, query.status, requester)
            .await?,
    ))
}

/// GET /api/users/me/appeals
pub async fn list_own_appeals(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<ScoreAppeal>>> {
    let user_id = caller(&state, &headers)?;
    Ok(Json(state.appeals.list_own_appeals(user_id).await?))
}

pub fn appeal_routes() -> Router<AppState> {
    Router::new()
        .route("/api/appeals", post(submit_appeal))
        .route("/api/appeals/:appeal_id", get(get_appeal))
        .route("/api/appeals/:appeal_id/resolve", post(resolve_appeal))
        .route("/api/groups/:group_id/appeals", get(list_group_appeals))
        .route("/api/users/me/appeals", get(list_own_appeals))
}
