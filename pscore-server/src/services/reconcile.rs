//! Reconciliation Engine
//!
//! Re-derives every non-adjustment score component of a group from the
//! current tasks, assignments and stage weights:
//! 1. every (task, assignee) pair gets a task score row (base 100)
//! 2. each member's stage average is the mean of their task finals in that stage
//! 3. each member's final is the weighted mean of their stage finals
//!
//! Stage rows no longer backed by a task score (task deleted or moved to
//! another stage) and final rows of members with no such stage rows drop out
//! of the derivation. They are deleted unless they carry an adjustment or an
//! appeal, in which case they are kept but not counted.
//!
//! Writes only happen when a derived value moved, and nothing here touches
//! adjustment fields or the history log, so a second run is a no-op and
//! concurrent runs converge on the same values.

use pscore_common::db::models::{MemberStageScore, TaskScore, DEFAULT_STAGE_WEIGHT};
use pscore_common::{time, Error, Result};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::collaborators::{Task, TaskProvider};
use crate::store::final_scores::{self, FinalScoreFilter};
use crate::store::stage_scores::{self, StageScoreFilter};
use crate::store::{task_scores, weights, UpsertOutcome};

/// Pipeline step a failure occurred in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileStep {
    TaskScores,
    StageScores,
    FinalScores,
}

/// One item that could not be reconciled; the rest of the run still applies
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileFailure {
    pub step: ReconcileStep,
    /// Task id, stage id or member id depending on the step
    pub entity_id: Uuid,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub group_id: Uuid,
    pub task_scores_created: usize,
    pub stage_scores_created: usize,
    pub stage_scores_updated: usize,
    pub stage_scores_removed: usize,
    pub final_scores_created: usize,
    pub final_scores_updated: usize,
    pub final_scores_removed: usize,
    pub failures: Vec<ReconcileFailure>,
}

impl ReconcileReport {
    fn new(group_id: Uuid) -> Self {
        Self {
            group_id,
            ..Default::default()
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Whether the run wrote anything
    pub fn changed(&self) -> bool {
        self.task_scores_created
            + self.stage_scores_created
            + self.stage_scores_updated
            + self.stage_scores_removed
            + self.final_scores_created
            + self.final_scores_updated
            + self.final_scores_removed
            > 0
    }

    fn fail(&mut self, step: ReconcileStep, entity_id: Uuid, err: &Error) {
        warn!(
            group_id = %self.group_id,
            entity_id = %entity_id,
            ?step,
            "Reconciliation item failed: {}",
            err
        );
        self.failures.push(ReconcileFailure {
            step,
            entity_id,
            message: err.to_string(),
        });
    }
}

/// Mean task final per member over the given tasks
///
/// Tasks a member has no row for are left out rather than counted as zero.
pub fn stage_averages(scores: &[TaskScore], stage_tasks: &HashSet<Uuid>) -> BTreeMap<Uuid, f64> {
    let mut sums: BTreeMap<Uuid, (f64, usize)> = BTreeMap::new();
    for score in scores.iter().filter(|s| stage_tasks.contains(&s.task_id)) {
        let entry = sums.entry(score.user_id).or_insert((0.0, 0));
        entry.0 += score.final_score;
        entry.1 += 1;
    }

    sums.into_iter()
        .map(|(user, (sum, count))| (user, sum / count as f64))
        .collect()
}

/// `Σ(final_stage_score × weight) / Σ(weight)` over one member's stage rows
///
/// Returns None when the member has no stage rows.
pub fn weighted_final(rows: &[&MemberStageScore], weights: &HashMap<Uuid, f64>) -> Option<f64> {
    let (weighted, total) = rows.iter().fold((0.0, 0.0), |(weighted, total), row| {
        let weight = weights
            .get(&row.stage_id)
            .copied()
            .unwrap_or(DEFAULT_STAGE_WEIGHT);
        (weighted + row.final_stage_score * weight, total + weight)
    });

    if rows.is_empty() || total <= 0.0 {
        None
    } else {
        Some(weighted / total)
    }
}

#[derive(Clone)]
pub struct Reconciler {
    db: SqlitePool,
    tasks: Arc<dyn TaskProvider>,
}

impl Reconciler {
    pub fn new(db: SqlitePool, tasks: Arc<dyn TaskProvider>) -> Self {
        Self { db, tasks }
    }

    /// Reconcile one group
    ///
    /// Fails outright only when the inputs cannot be read; per-item write
    /// failures are collected in the report and logged.
    pub async fn reconcile(&self, group_id: Uuid) -> Result<ReconcileReport> {
        if !self.tasks.group_exists(group_id).await? {
            return Err(Error::not_found(format!("group {}", group_id)));
        }

        let mut report = ReconcileReport::new(group_id);
        let tasks = self.tasks.list_tasks(group_id).await?;

        self.ensure_task_scores(group_id, &tasks, &mut report).await;
        let scored = self.recompute_stage_scores(group_id, &tasks, &mut report).await?;
        self.recompute_final_scores(group_id, &scored, &mut report)
            .await?;

        if report.changed() || !report.is_clean() {
            info!(
                group_id = %group_id,
                task_created = report.task_scores_created,
                stage_created = report.stage_scores_created,
                stage_updated = report.stage_scores_updated,
                stage_removed = report.stage_scores_removed,
                final_created = report.final_scores_created,
                final_updated = report.final_scores_updated,
                final_removed = report.final_scores_removed,
                failures = report.failures.len(),
                "Reconciled group scores"
            );
        } else {
            debug!(group_id = %group_id, "Group scores already consistent");
        }

        Ok(report)
    }

    /// Reconcile after a write that already committed
    ///
    /// The triggering write stands either way; a failed run is logged and
    /// recovered by the next invocation.
    pub async fn reconcile_logged(&self, group_id: Uuid) -> Option<ReconcileReport> {
        match self.reconcile(group_id).await {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(group_id = %group_id, "Reconciliation after write failed: {}", e);
                None
            }
        }
    }

    /// Step 1: a row for every (task, currently assigned user)
    async fn ensure_task_scores(&self, group_id: Uuid, tasks: &[Task], report: &mut ReconcileReport) {
        let now = time::now();

        for task in tasks {
            let assignees = match self.tasks.list_assignees(task.id).await {
                Ok(assignees) => assignees,
                Err(e) => {
                    report.fail(ReconcileStep::TaskScores, task.id, &e);
                    continue;
                }
            };

            for user_id in assignees {
                match task_scores::ensure(&self.db, group_id, task.id, user_id, now).await {
                    Ok(true) => {
                        debug!(task_id = %task.id, user_id = %user_id, "Created task score");
                        report.task_scores_created += 1;
                    }
                    Ok(false) => {}
                    Err(e) => report.fail(ReconcileStep::TaskScores, task.id, &e),
                }
            }
        }
    }

    /// Step 2: stage averages; returns the (stage, member) pairs backed by
    /// at least one task score
    async fn recompute_stage_scores(
        &self,
        group_id: Uuid,
        tasks: &[Task],
        report: &mut ReconcileReport,
    ) -> Result<HashSet<(Uuid, Uuid)>> {
        let stages = self.tasks.list_stages(group_id).await?;
        let task_ids: Vec<Uuid> = tasks.iter().map(|t| t.id).collect();
        let scores = task_scores::list_for_tasks(&self.db, &task_ids).await?;
        let now = time::now();
        let mut scored = HashSet::new();

        for stage in &stages {
            let stage_tasks: HashSet<Uuid> = tasks
                .iter()
                .filter(|t| t.stage_id == Some(stage.id))
                .map(|t| t.id)
                .collect();

            for (user_id, average) in stage_averages(&scores, &stage_tasks) {
                scored.insert((stage.id, user_id));
                match stage_scores::upsert_average(&self.db, group_id, stage.id, user_id, average, now)
                    .await
                {
                    Ok(UpsertOutcome::Created) => report.stage_scores_created += 1,
                    Ok(UpsertOutcome::Updated) => {
                        debug!(stage_id = %stage.id, user_id = %user_id, average, "Updated stage average");
                        report.stage_scores_updated += 1;
                    }
                    Ok(UpsertOutcome::Unchanged) => {}
                    Err(e) => report.fail(ReconcileStep::StageScores, stage.id, &e),
                }
            }
        }

        let existing = stage_scores::list(&self.db, group_id, StageScoreFilter::default()).await?;
        for row in existing
            .iter()
            .filter(|r| !scored.contains(&(r.stage_id, r.user_id)))
        {
            match stage_scores::delete_orphan(&self.db, row.id).await {
                Ok(true) => {
                    debug!(stage_id = %row.stage_id, user_id = %row.user_id, "Removed orphaned stage score");
                    report.stage_scores_removed += 1;
                }
                Ok(false) => {
                    debug!(score_id = %row.id, "Keeping orphaned stage score with adjustment or appeal");
                }
                Err(e) => report.fail(ReconcileStep::StageScores, row.stage_id, &e),
            }
        }

        Ok(scored)
    }

    /// Step 3: weighted finals for members with at least one backed stage row
    async fn recompute_final_scores(
        &self,
        group_id: Uuid,
        scored: &HashSet<(Uuid, Uuid)>,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        let members = self.tasks.list_group_members(group_id).await?;
        let stage_rows = stage_scores::list(&self.db, group_id, StageScoreFilter::default()).await?;
        let weights = weights::weight_map(&self.db, group_id).await?;
        let now = time::now();
        let mut finalized = HashSet::new();

        for user_id in members {
            let rows: Vec<&MemberStageScore> = stage_rows
                .iter()
                .filter(|r| r.user_id == user_id && scored.contains(&(r.stage_id, r.user_id)))
                .collect();
            let Some(calculated) = weighted_final(&rows, &weights) else {
                continue;
            };
            finalized.insert(user_id);

            match final_scores::upsert_calculated(&self.db, group_id, user_id, calculated, now).await {
                Ok(UpsertOutcome::Created) => report.final_scores_created += 1,
                Ok(UpsertOutcome::Updated) => {
                    debug!(user_id = %user_id, calculated, "Updated final score");
                    report.final_scores_updated += 1;
                }
                Ok(UpsertOutcome::Unchanged) => {}
                Err(e) => report.fail(ReconcileStep::FinalScores, user_id, &e),
            }
        }

        let existing = final_scores::list(&self.db, group_id, FinalScoreFilter::default()).await?;
        for row in existing.iter().filter(|r| !finalized.contains(&r.user_id)) {
            match final_scores::delete_orphan(&self.db, row.id).await {
                Ok(true) => {
                    debug!(user_id = %row.user_id, "Removed orphaned final score");
                    report.final_scores_removed += 1;
                }
                Ok(false) => {
                    debug!(score_id = %row.id, "Keeping orphaned final score with adjustment or appeal");
                }
                Err(e) => report.fail(ReconcileStep::FinalScores, row.user_id, &e),
            }
        }

        Ok(())
    }
}
