//! Group scoring
//!
//! One leader action fanned out over every assignee of a task, either with
//! the same delta for everyone or with an explicit delta per member. Each
//! member's adjustment is independent: one failing does not undo the others.
//! The group is reconciled once after the batch.

use pscore_common::db::models::{ScoreRow, ScoreTier};
use pscore_common::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::adjustment::{validate_delta, AdjustmentRequest, AdjustmentService, AdjustmentTarget};
use super::reconcile::ReconcileReport;
use crate::collaborators::access::require_leader;

/// Explicit delta for one assignee
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberAdjustment {
    pub user_id: Uuid,
    pub delta: f64,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Error detail for a member whose adjustment failed
#[derive(Debug, Clone, Serialize)]
pub struct MemberError {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemberOutcome {
    pub user_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<ScoreRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<MemberError>,
}

impl MemberOutcome {
    fn from_result(user_id: Uuid, result: Result<ScoreRow>) -> Self {
        match result {
            Ok(score) => Self {
                user_id,
                score: Some(score),
                error: None,
            },
            Err(e) => Self {
                user_id,
                score: None,
                error: Some(MemberError {
                    code: e.code(),
                    message: e.to_string(),
                }),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupAdjustmentReport {
    pub task_id: Uuid,
    pub outcomes: Vec<MemberOutcome>,
    /// Present when the closing reconciliation ran to completion
    pub reconcile: Option<ReconcileReport>,
}

impl GroupAdjustmentReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

impl AdjustmentService {
    /// Same delta and reason for every current assignee of `task_id`
    ///
    /// Reason, delta and authorization are checked once up front; a failure
    /// there rejects the whole batch before any row is touched.
    pub async fn apply_group_adjustment(
        &self,
        task_id: Uuid,
        delta: f64,
        reason: Option<&str>,
        actor: Uuid,
    ) -> Result<GroupAdjustmentReport> {
        validate_delta(delta, reason)?;
        let group_id = self.authorize_task(task_id, actor).await?;

        let assignees = self.task_provider().list_assignees(task_id).await?;
        let mut outcomes = Vec::with_capacity(assignees.len());
        for user_id in assignees {
            let request = AdjustmentRequest {
                target: task_target(task_id, user_id),
                delta,
                reason: reason.map(str::to_string),
            };
            outcomes.push(self.apply_member(user_id, &request, actor).await);
        }

        Ok(self.finish(group_id, task_id, outcomes).await)
    }

    /// Individual deltas, each validated on its own
    pub async fn apply_member_adjustments(
        &self,
        task_id: Uuid,
        members: &[MemberAdjustment],
        actor: Uuid,
    ) -> Result<GroupAdjustmentReport> {
        if members.is_empty() {
            return Err(Error::validation("at least one member adjustment is required"));
        }
        let group_id = self.authorize_task(task_id, actor).await?;

        let mut outcomes = Vec::with_capacity(members.len());
        for member in members {
            let request = AdjustmentRequest {
                target: task_target(task_id, member.user_id),
                delta: member.delta,
                reason: member.reason.clone(),
            };
            outcomes.push(self.apply_member(member.user_id, &request, actor).await);
        }

        Ok(self.finish(group_id, task_id, outcomes).await)
    }

    async fn authorize_task(&self, task_id: Uuid, actor: Uuid) -> Result<Uuid> {
        let task = self
            .task_provider()
            .get_task(task_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("task {}", task_id)))?;
        require_leader(self.access_control(), task.group_id, actor).await?;
        Ok(task.group_id)
    }

    async fn apply_member(
        &self,
        user_id: Uuid,
        request: &AdjustmentRequest,
        actor: Uuid,
    ) -> MemberOutcome {
        let result = self
            .apply_unreconciled(request, actor)
            .await
            .map(|outcome| outcome.score);
        if let Err(e) = &result {
            warn!(user_id = %user_id, "Member adjustment failed: {}", e);
        }
        MemberOutcome::from_result(user_id, result)
    }

    async fn finish(
        &self,
        group_id: Uuid,
        task_id: Uuid,
        outcomes: Vec<MemberOutcome>,
    ) -> GroupAdjustmentReport {
        let reconcile = if outcomes.iter().any(MemberOutcome::is_success) {
            self.reconciler().reconcile_logged(group_id).await
        } else {
            None
        };

        let report = GroupAdjustmentReport {
            task_id,
            outcomes,
            reconcile,
        };
        info!(
            task_id = %task_id,
            succeeded = report.succeeded(),
            failed = report.failed(),
            "Applied group adjustment"
        );
        report
    }
}

fn task_target(task_id: Uuid, user_id: Uuid) -> AdjustmentTarget {
    AdjustmentTarget::Pair {
        tier: ScoreTier::Task,
        entity_id: task_id,
        user_id,
    }
}
