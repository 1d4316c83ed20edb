//! pscore-server library - process score aggregation and adjustment
//!
//! Three-tier derived scores (task -> stage -> final), justified and audited
//! manual adjustments, weighted stage roll-up, member appeals, and an
//! idempotent reconciliation that keeps every derived value consistent.

use axum::extract::DefaultBodyLimit;
use axum::Router;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod collaborators;
pub mod error;
pub mod pagination;
pub mod services;
pub mod store;

pub use error::{ApiError, ApiResult};

use collaborators::{
    AccessControl, AttachmentStorage, HeaderAccessControl, SqliteTaskProvider, TaskProvider,
};
use services::{AdjustmentService, AppealService, Reconciler, WeightService};

/// Largest accepted request body (appeal attachments arrive base64-encoded)
pub const MAX_REQUEST_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub tasks: Arc<dyn TaskProvider>,
    pub access: Arc<dyn AccessControl>,
    pub attachments: Arc<dyn AttachmentStorage>,
    pub reconciler: Reconciler,
    pub adjustments: AdjustmentService,
    pub appeals: AppealService,
    pub weights: WeightService,
}

impl AppState {
    /// Wire the services over explicit collaborators
    pub fn new(
        db: SqlitePool,
        tasks: Arc<dyn TaskProvider>,
        access: Arc<dyn AccessControl>,
        attachments: Arc<dyn AttachmentStorage>,
    ) -> Self {
        let reconciler = Reconciler::new(db.clone(), tasks.clone());
        let adjustments =
            AdjustmentService::new(db.clone(), tasks.clone(), access.clone(), reconciler.clone());
        let appeals = AppealService::new(db.clone(), access.clone(), attachments.clone());
        let weights =
            WeightService::new(db.clone(), tasks.clone(), access.clone(), reconciler.clone());

        Self {
            db,
            tasks,
            access,
            attachments,
            reconciler,
            adjustments,
            appeals,
            weights,
        }
    }

    /// Collaborators backed by the bundled SQLite tables and header identity
    pub fn with_sqlite_collaborators(db: SqlitePool, attachments: Arc<dyn AttachmentStorage>) -> Self {
        let tasks = Arc::new(SqliteTaskProvider::new(db.clone()));
        let access = Arc::new(HeaderAccessControl::new(db.clone()));
        Self::new(db, tasks, access, attachments)
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::score_routes())
        .merge(api::adjustment_routes())
        .merge(api::weight_routes())
        .merge(api::appeal_routes())
        .merge(api::attachment_routes())
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
