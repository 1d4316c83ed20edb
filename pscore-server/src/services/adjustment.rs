//! Adjustment Service
//!
//! Applies a signed delta to exactly one score row at any tier. Adjustments
//! accumulate: a row adjusted by -10 and then by +3 carries `adjustment = -7`.
//! The row update and its history entry commit in one transaction, and the
//! owning group is reconciled once the transaction is durable.

use chrono::{DateTime, Utc};
use pscore_common::db::models::{ScoreRow, ScoreTier, SCORE_EPSILON};
use pscore_common::{time, Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::reconcile::Reconciler;
use crate::collaborators::access::require_leader;
use crate::collaborators::{AccessControl, TaskProvider};
use crate::store::history::{self, NewHistoryEntry};
use crate::store::{scores, task_scores};

/// Which row an adjustment applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AdjustmentTarget {
    /// An existing row addressed by its id
    Row { tier: ScoreTier, score_id: Uuid },
    /// A row addressed by its natural key: task, stage or group id plus member
    Pair {
        tier: ScoreTier,
        entity_id: Uuid,
        user_id: Uuid,
    },
}

impl AdjustmentTarget {
    pub fn tier(&self) -> ScoreTier {
        match self {
            AdjustmentTarget::Row { tier, .. } | AdjustmentTarget::Pair { tier, .. } => *tier,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustmentRequest {
    #[serde(flatten)]
    pub target: AdjustmentTarget,
    pub delta: f64,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdjustmentOutcome {
    /// The row after the adjustment
    pub score: ScoreRow,
    pub previous_score: f64,
    pub history_id: Uuid,
}

/// Trimmed reason, or None when absent or blank
pub(crate) fn normalize_reason(reason: Option<&str>) -> Option<&str> {
    reason.map(str::trim).filter(|r| !r.is_empty())
}

/// Reject non-finite deltas and unjustified non-zero deltas
pub(crate) fn validate_delta(delta: f64, reason: Option<&str>) -> Result<()> {
    if !delta.is_finite() {
        return Err(Error::validation("delta must be a finite number"));
    }
    if delta != 0.0 && normalize_reason(reason).is_none() {
        return Err(Error::validation("a reason is required for a non-zero adjustment"));
    }
    Ok(())
}

/// Target resolved to its group; `row` is None when it still has to be created
struct ResolvedTarget {
    group_id: Uuid,
    tier: ScoreTier,
    entity_id: Uuid,
    user_id: Uuid,
    row: Option<ScoreRow>,
}

#[derive(Clone)]
pub struct AdjustmentService {
    db: SqlitePool,
    tasks: Arc<dyn TaskProvider>,
    access: Arc<dyn AccessControl>,
    reconciler: Reconciler,
}

impl AdjustmentService {
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

    pub(crate) fn task_provider(&self) -> &dyn TaskProvider {
        self.tasks.as_ref()
    }

    pub(crate) fn access_control(&self) -> &dyn AccessControl {
        self.access.as_ref()
    }

    pub(crate) fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Apply one adjustment and reconcile the owning group
    pub async fn apply_adjustment(
        &self,
        request: &AdjustmentRequest,
        actor: Uuid,
    ) -> Result<AdjustmentOutcome> {
        let outcome = self.apply_unreconciled(request, actor).await?;
        self.reconciler.reconcile_logged(outcome.score.group_id).await;
        Ok(outcome)
    }

    /// Apply one adjustment without the follow-up reconciliation
    ///
    /// Batch callers reconcile once after the whole batch.
    pub(crate) async fn apply_unreconciled(
        &self,
        request: &AdjustmentRequest,
        actor: Uuid,
    ) -> Result<AdjustmentOutcome> {
        validate_delta(request.delta, request.reason.as_deref())?;

        let resolved = self.resolve_target(&request.target).await?;
        require_leader(self.access.as_ref(), resolved.group_id, actor).await?;

        let row = match resolved.row {
            Some(row) => row,
            None => self.materialize(&resolved).await?,
        };

        let outcome = self
            .write(
                &row,
                request.delta,
                normalize_reason(request.reason.as_deref()),
                actor,
                time::now(),
            )
            .await?;

        info!(
            tier = %row.tier,
            score_id = %row.id,
            user_id = %row.user_id,
            delta = request.delta,
            previous = outcome.previous_score,
            new = outcome.score.final_score,
            actor = %actor,
            "Applied score adjustment"
        );

        Ok(outcome)
    }

    /// Find the owning group and the row, checking the target exists in the
    /// assignment graph
    async fn resolve_target(&self, target: &AdjustmentTarget) -> Result<ResolvedTarget> {
        match *target {
            AdjustmentTarget::Row { tier, score_id } => {
                let row = scores::get_row(&self.db, tier, score_id)
                    .await?
                    .ok_or_else(|| Error::not_found(format!("{} score {}", tier, score_id)))?;
                Ok(ResolvedTarget {
                    group_id: row.group_id,
                    tier,
                    entity_id: row.entity_id,
                    user_id: row.user_id,
                    row: Some(row),
                })
            }
            AdjustmentTarget::Pair {
                tier,
                entity_id,
                user_id,
            } => {
                let group_id = self.group_of(tier, entity_id).await?;
                let row = scores::find_by_pair(&self.db, tier, entity_id, user_id).await?;

                if row.is_none() && !self.is_scorable(tier, group_id, entity_id, user_id).await? {
                    return Err(Error::not_found(format!(
                        "user {} has no {} score for {}",
                        user_id, tier, entity_id
                    )));
                }

                Ok(ResolvedTarget {
                    group_id,
                    tier,
                    entity_id,
                    user_id,
                    row,
                })
            }
        }
    }

    async fn group_of(&self, tier: ScoreTier, entity_id: Uuid) -> Result<Uuid> {
        match tier {
            ScoreTier::Task => self
                .tasks
                .get_task(entity_id)
                .await?
                .map(|t| t.group_id)
                .ok_or_else(|| Error::not_found(format!("task {}", entity_id))),
            ScoreTier::Stage => self
                .tasks
                .get_stage(entity_id)
                .await?
                .map(|s| s.group_id)
                .ok_or_else(|| Error::not_found(format!("stage {}", entity_id))),
            ScoreTier::Final => {
                if self.tasks.group_exists(entity_id).await? {
                    Ok(entity_id)
                } else {
                    Err(Error::not_found(format!("group {}", entity_id)))
                }
            }
        }
    }

    /// Whether a row for (entity, user) would exist after reconciliation
    async fn is_scorable(
        &self,
        tier: ScoreTier,
        group_id: Uuid,
        entity_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool> {
        match tier {
            ScoreTier::Task => Ok(self.tasks.list_assignees(entity_id).await?.contains(&user_id)),
            ScoreTier::Stage => {
                for task in self.tasks.list_tasks(group_id).await? {
                    if task.stage_id == Some(entity_id)
                        && self.tasks.list_assignees(task.id).await?.contains(&user_id)
                    {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            ScoreTier::Final => Ok(self
                .tasks
                .list_group_members(group_id)
                .await?
                .contains(&user_id)),
        }
    }

    /// Create a missing row: task rows directly, derived rows via reconciliation
    async fn materialize(&self, target: &ResolvedTarget) -> Result<ScoreRow> {
        match target.tier {
            ScoreTier::Task => {
                task_scores::ensure(
                    &self.db,
                    target.group_id,
                    target.entity_id,
                    target.user_id,
                    time::now(),
                )
                .await?;
            }
            ScoreTier::Stage | ScoreTier::Final => {
                debug!(
                    tier = %target.tier,
                    entity_id = %target.entity_id,
                    user_id = %target.user_id,
                    "Reconciling to create missing score row"
                );
                self.reconciler.reconcile(target.group_id).await?;
            }
        }

        scores::find_by_pair(&self.db, target.tier, target.entity_id, target.user_id)
            .await?
            .ok_or_else(|| {
                Error::not_found(format!(
                    "user {} has no {} score for {}",
                    target.user_id, target.tier, target.entity_id
                ))
            })
    }

    /// Row update and history append in one transaction
    async fn write(
        &self,
        row: &ScoreRow,
        delta: f64,
        reason: Option<&str>,
        actor: Uuid,
        now: DateTime<Utc>,
    ) -> Result<AdjustmentOutcome> {
        let mut tx = self.db.begin().await?;

        // Re-read inside the transaction so concurrent adjustments stack
        let current = scores::get_row(&mut *tx, row.tier, row.id)
            .await?
            .ok_or_else(|| Error::not_found(format!("{} score {}", row.tier, row.id)))?;

        let mut adjustment = current.adjustment + delta;
        if adjustment.abs() < SCORE_EPSILON {
            adjustment = 0.0;
        }
        let stored_reason = reason.or(current.adjustment_reason.as_deref());
        if adjustment != 0.0 && stored_reason.is_none() {
            return Err(Error::validation("a reason is required for a non-zero adjustment"));
        }

        scores::write_adjustment(&mut *tx, row.tier, row.id, adjustment, stored_reason, actor, now)
            .await?;

        let updated = scores::get_row(&mut *tx, row.tier, row.id)
            .await?
            .ok_or_else(|| Error::Internal(format!("{} score {} vanished", row.tier, row.id)))?;

        let history_id = history::append(
            &mut *tx,
            &NewHistoryEntry {
                group_id: updated.group_id,
                tier: updated.tier,
                score_id: updated.id,
                user_id: updated.user_id,
                previous_score: current.final_score,
                new_score: updated.final_score,
                adjustment_value: delta,
                reason,
                adjusted_by: actor,
                created_at: now,
            },
        )
        .await?;

        tx.commit().await?;

        Ok(AdjustmentOutcome {
            previous_score: current.final_score,
            score: updated,
            history_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_delta() {
        assert!(validate_delta(-10.0, Some("late")).is_ok());
        assert!(validate_delta(0.0, None).is_ok());
        assert!(matches!(validate_delta(5.0, None), Err(Error::Validation(_))));
        assert!(matches!(validate_delta(5.0, Some("   ")), Err(Error::Validation(_))));
        assert!(matches!(validate_delta(f64::NAN, Some("x")), Err(Error::Validation(_))));
        assert!(matches!(
            validate_delta(f64::INFINITY, Some("x")),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_normalize_reason() {
        assert_eq!(normalize_reason(Some("  late  ")), Some("late"));
        assert_eq!(normalize_reason(Some("\t")), None);
        assert_eq!(normalize_reason(None), None);
    }

    #[test]
    fn test_request_accepts_row_and_pair_targets() {
        let id = Uuid::new_v4();
        let by_row: AdjustmentRequest = serde_json::from_value(serde_json::json!({
            "tier": "task", "score_id": id, "delta": -5, "reason": "late"
        }))
        .unwrap();
        assert_eq!(
            by_row.target,
            AdjustmentTarget::Row {
                tier: ScoreTier::Task,
                score_id: id
            }
        );

        let user = Uuid::new_v4();
        let by_pair: AdjustmentRequest = serde_json::from_value(serde_json::json!({
            "tier": "stage", "entity_id": id, "user_id": user, "delta": 2.5, "reason": "bonus"
        }))
        .unwrap();
        assert_eq!(by_pair.target.tier(), ScoreTier::Stage);
        assert_eq!(by_pair.delta, 2.5);
    }
}
