//! Signed attachment downloads

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Deserialize;

use crate::{ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct SignedQuery {
    pub expires: i64,
    pub signature: String,
}

/// GET /attachments/*path
///
/// Needs no caller identity; the signature and expiry are the credential.
pub async fn download_attachment(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Query(query): Query<SignedQuery>,
) -> ApiResult<impl IntoResponse> {
    let bytes = state
        .attachments
        .open_signed(path.trim_start_matches('/'), query.expires, &query.signature)
        .await?;

    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        bytes,
    ))
}

pub fn attachment_routes() -> Router<AppState> {
    Router::new().route("/attachments/*path", get(download_attachment))
}
