//! HTTP API handlers for pscore-server
//!
//! Every `/api` route identifies the caller through [`AccessControl`];
//! `/health` and signed attachment downloads do not.
//!
//! [`AccessControl`]: crate::collaborators::AccessControl

pub mod adjustments;
pub mod appeals;
pub mod attachments;
pub mod buildinfo;
pub mod health;
pub mod scores;
pub mod weights;

pub use adjustments::adjustment_routes;
pub use appeals::appeal_routes;
pub use attachments::attachment_routes;
pub use buildinfo::get_build_info;
pub use health::health_routes;
pub use scores::score_routes;
pub use weights::weight_routes;

use axum::http::HeaderMap;
use uuid::Uuid;

use crate::{ApiResult, AppState};

/// Identity of the caller
pub(crate) fn caller(state: &AppState, headers: &HeaderMap) -> ApiResult<Uuid> {
    Ok(state.access.current_user(headers)?)
}
