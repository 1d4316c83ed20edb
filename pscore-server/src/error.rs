//! HTTP error mapping for pscore-server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request body or query (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Domain error from the score engine
    #[error(transparent)]
    Common(#[from] pscore_common::Error),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        use pscore_common::Error as E;

        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            ApiError::Common(err) => {
                let status = match err {
                    E::Validation(_) => StatusCode::BAD_REQUEST,
                    E::NotFound(_) => StatusCode::NOT_FOUND,
                    E::InvalidState(_) => StatusCode::CONFLICT,
                    E::Authorization(_) => StatusCode::FORBIDDEN,
                    E::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
                    E::Database(_) | E::Io(_) | E::Config(_) | E::Internal(_) => {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                (status, err.code())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.parts();
        let message = match &self {
            ApiError::BadRequest(msg) => msg.clone(),
            ApiError::Common(err) => err.to_string(),
        };

        if status.is_server_error() {
            error!("Request failed: {}", message);
        }

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
