//! Stage weight management

use pscore_common::db::models::{StageWeight, DEFAULT_STAGE_WEIGHT};
use pscore_common::{time, Error, Result};
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::reconcile::{ReconcileReport, Reconciler};
use crate::collaborators::access::require_leader;
use crate::collaborators::{AccessControl, Stage, TaskProvider};
use crate::store::weights;

#[derive(Debug, Clone, Serialize)]
pub struct WeightChange {
    pub stage_id: Uuid,
    /// Effective weight after the change
    pub weight: f64,
    pub reconcile: Option<ReconcileReport>,
}

#[derive(Clone)]
pub struct WeightService {
    db: SqlitePool,
    tasks: Arc<dyn TaskProvider>,
    access: Arc<dyn AccessControl>,
    reconciler: Reconciler,
}

impl WeightService {
    pub fn new(
        db: SqlitePool,
        tasks: Arc<dyn TaskProvider>,
        access: Arc<dyn AccessControl>,
        reconciler: Reconciler,
    ) -> Self {
        Self {
            db,
            tasks,
            access,
            reconciler,
        }
    }

    pub async fn list(&self, group_id: Uuid) -> Result<Vec<StageWeight>> {
        weights::list_for_group(&self.db, group_id).await
    }

    /// Set an explicit weight and re-derive the group's finals
    pub async fn set_stage_weight(
        &self,
        stage_id: Uuid,
        weight: f64,
        actor: Uuid,
    ) -> Result<WeightChange> {
        if !weight.is_finite() || weight <= 0.0 {
            return Err(Error::validation("weight must be a positive finite number"));
        }

        let stage = self.authorize(stage_id, actor).await?;
        weights::upsert(&self.db, stage.group_id, stage_id, weight, actor, time::now()).await?;
        info!(stage_id = %stage_id, weight, actor = %actor, "Stage weight set");

        Ok(WeightChange {
            stage_id,
            weight,
            reconcile: self.reconciler.reconcile_logged(stage.group_id).await,
        })
    }

    /// Drop the explicit weight so the stage counts with weight 1 again
    pub async fn reset_stage_weight(&self, stage_id: Uuid, actor: Uuid) -> Result<WeightChange> {
        let stage = self.authorize(stage_id, actor).await?;
        let removed = weights::delete(&self.db, stage_id).await?;
        info!(stage_id = %stage_id, removed, actor = %actor, "Stage weight reset");

        let reconcile = if removed {
            self.reconciler.reconcile_logged(stage.group_id).await
        } else {
            None
        };

        Ok(WeightChange {
            stage_id,
            weight: DEFAULT_STAGE_WEIGHT,
            reconcile,
        })
    }

    async fn authorize(&self, stage_id: Uuid, actor: Uuid) -> Result<Stage> {
        let stage = self
            .tasks
            .get_stage(stage_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("stage {}", stage_id)))?;
        require_leader(self.access.as_ref(), stage.group_id, actor).await?;
        Ok(stage)
    }
}
