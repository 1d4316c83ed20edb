//! Score Store models
//!
//! Every tier shares the same shape: a base component (`base_score`,
//! `average_score` or `calculated_score`), a signed `adjustment` with its
//! justification and attribution, and a stored final value that SQLite
//! derives as `base + adjustment`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::uuid_utils::{parse_stored, parse_stored_opt};
use crate::{Error, Result};

/// Base score of a freshly created task score row
pub const DEFAULT_TASK_BASE_SCORE: f64 = 100.0;

/// Weight of a stage without a `stage_weights` row
pub const DEFAULT_STAGE_WEIGHT: f64 = 1.0;

/// Tolerance used when deciding whether a derived value changed
pub const SCORE_EPSILON: f64 = 1e-9;

/// The three levels of the derived score pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreTier {
    Task,
    Stage,
    Final,
}

impl ScoreTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreTier::Task => "task",
            ScoreTier::Stage => "stage",
            ScoreTier::Final => "final",
        }
    }

    /// Table holding rows of this tier
    pub fn table(&self) -> &'static str {
        match self {
            ScoreTier::Task => "task_scores",
            ScoreTier::Stage => "member_stage_scores",
            ScoreTier::Final => "member_final_scores",
        }
    }

    /// Column holding the unadjusted component
    pub fn base_column(&self) -> &'static str {
        match self {
            ScoreTier::Task => "base_score",
            ScoreTier::Stage => "average_score",
            ScoreTier::Final => "calculated_score",
        }
    }

    /// Generated column holding `base + adjustment`
    pub fn final_column(&self) -> &'static str {
        match self {
            ScoreTier::Task => "final_score",
            ScoreTier::Stage => "final_stage_score",
            ScoreTier::Final => "final_score",
        }
    }

    /// Column naming the scored entity in the natural key
    pub fn entity_column(&self) -> &'static str {
        match self {
            ScoreTier::Task => "task_id",
            ScoreTier::Stage => "stage_id",
            ScoreTier::Final => "group_id",
        }
    }
}

impl fmt::Display for ScoreTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScoreTier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "task" => Ok(ScoreTier::Task),
            "stage" => Ok(ScoreTier::Stage),
            "final" => Ok(ScoreTier::Final),
            other => Err(Error::validation(format!("Unknown score tier: {}", other))),
        }
    }
}

/// Appeal lifecycle; `Approved` and `Rejected` are terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppealStatus {
    Pending,
    Approved,
    Rejected,
}

impl AppealStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppealStatus::Pending => "pending",
            AppealStatus::Approved => "approved",
            AppealStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, AppealStatus::Pending)
    }
}

impl fmt::Display for AppealStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppealStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(AppealStatus::Pending),
            "approved" => Ok(AppealStatus::Approved),
            "rejected" => Ok(AppealStatus::Rejected),
            other => Err(Error::validation(format!("Unknown appeal status: {}", other))),
        }
    }
}

/// Per-(task, assignee) score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskScore {
    pub id: Uuid,
    pub group_id: Uuid,
    pub task_id: Uuid,
    pub user_id: Uuid,
    pub base_score: f64,
    pub adjustment: f64,
    pub adjustment_reason: Option<String>,
    pub adjusted_by: Option<Uuid>,
    pub adjusted_at: Option<DateTime<Utc>>,
    pub final_score: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskScore {
    pub fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            id: parse_stored("id", &row.try_get::<String, _>("id")?)?,
            group_id: parse_stored("group_id", &row.try_get::<String, _>("group_id")?)?,
            task_id: parse_stored("task_id", &row.try_get::<String, _>("task_id")?)?,
            user_id: parse_stored("user_id", &row.try_get::<String, _>("user_id")?)?,
            base_score: row.try_get("base_score")?,
            adjustment: row.try_get("adjustment")?,
            adjustment_reason: row.try_get("adjustment_reason")?,
            adjusted_by: parse_stored_opt("adjusted_by", row.try_get("adjusted_by")?)?,
            adjusted_at: row.try_get("adjusted_at")?,
            final_score: row.try_get("final_score")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Per-(stage, member) score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberStageScore {
    pub id: Uuid,
    pub group_id: Uuid,
    pub stage_id: Uuid,
    pub user_id: Uuid,
    pub average_score: f64,
    pub adjustment: f64,
    pub adjustment_reason: Option<String>,
    pub adjusted_by: Option<Uuid>,
    pub adjusted_at: Option<DateTime<Utc>>,
    pub final_stage_score: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MemberStageScore {
    pub fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            id: parse_stored("id", &row.try_get::<String, _>("id")?)?,
            group_id: parse_stored("group_id", &row.try_get::<String, _>("group_id")?)?,
            stage_id: parse_stored("stage_id", &row.try_get::<String, _>("stage_id")?)?,
            user_id: parse_stored("user_id", &row.try_get::<String, _>("user_id")?)?,
            average_score: row.try_get("average_score")?,
            adjustment: row.try_get("adjustment")?,
            adjustment_reason: row.try_get("adjustment_reason")?,
            adjusted_by: parse_stored_opt("adjusted_by", row.try_get("adjusted_by")?)?,
            adjusted_at: row.try_get("adjusted_at")?,
            final_stage_score: row.try_get("final_stage_score")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Per-(group, member) final score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberFinalScore {
    pub id: Uuid,
    pub group_id: Uuid,
    pub user_id: Uuid,
    pub calculated_score: f64,
    pub adjustment: f64,
    pub adjustment_reason: Option<String>,
    pub adjusted_by: Option<Uuid>,
    pub adjusted_at: Option<DateTime<Utc>>,
    pub final_score: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MemberFinalScore {
    pub fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            id: parse_stored("id", &row.try_get::<String, _>("id")?)?,
            group_id: parse_stored("group_id", &row.try_get::<String, _>("group_id")?)?,
            user_id: parse_stored("user_id", &row.try_get::<String, _>("user_id")?)?,
            calculated_score: row.try_get("calculated_score")?,
            adjustment: row.try_get("adjustment")?,
            adjustment_reason: row.try_get("adjustment_reason")?,
            adjusted_by: parse_stored_opt("adjusted_by", row.try_get("adjusted_by")?)?,
            adjusted_at: row.try_get("adjusted_at")?,
            final_score: row.try_get("final_score")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Tier-independent view of one score row
///
/// Used by the Adjustment Service and the Appeal Workflow, which operate on
/// any tier through the same `(tier, id)` handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRow {
    pub tier: ScoreTier,
    pub id: Uuid,
    pub group_id: Uuid,
    /// Task, stage or group id, depending on the tier
    pub entity_id: Uuid,
    pub user_id: Uuid,
    pub base: f64,
    pub adjustment: f64,
    pub adjustment_reason: Option<String>,
    pub adjusted_by: Option<Uuid>,
    pub adjusted_at: Option<DateTime<Utc>>,
    pub final_score: f64,
}

impl ScoreRow {
    /// Decode a row selected with the aliases used by the score store
    /// (`entity_id`, `base`, `final_value`)
    pub fn from_row(tier: ScoreTier, row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            tier,
            id: parse_stored("id", &row.try_get::<String, _>("id")?)?,
            group_id: parse_stored("group_id", &row.try_get::<String, _>("group_id")?)?,
            entity_id: parse_stored("entity_id", &row.try_get::<String, _>("entity_id")?)?,
            user_id: parse_stored("user_id", &row.try_get::<String, _>("user_id")?)?,
            base: row.try_get("base")?,
            adjustment: row.try_get("adjustment")?,
            adjustment_reason: row.try_get("adjustment_reason")?,
            adjusted_by: parse_stored_opt("adjusted_by", row.try_get("adjusted_by")?)?,
            adjusted_at: row.try_get("adjusted_at")?,
            final_score: row.try_get("final_value")?,
        })
    }
}

/// Optional per-stage multiplier; absence means weight 1
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageWeight {
    pub stage_id: Uuid,
    pub group_id: Uuid,
    pub weight: f64,
    pub updated_by: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
}

impl StageWeight {
    pub fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            stage_id: parse_stored("stage_id", &row.try_get::<String, _>("stage_id")?)?,
            group_id: parse_stored("group_id", &row.try_get::<String, _>("group_id")?)?,
            weight: row.try_get("weight")?,
            updated_by: parse_stored_opt("updated_by", row.try_get("updated_by")?)?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// The single score row an appeal contests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppealTarget {
    pub tier: ScoreTier,
    pub target_id: Uuid,
}

/// A member's contest of one score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreAppeal {
    pub id: Uuid,
    pub group_id: Uuid,
    pub user_id: Uuid,
    pub target: AppealTarget,
    pub content: String,
    pub status: AppealStatus,
    pub response: Option<String>,
    pub responded_by: Option<Uuid>,
    pub responded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScoreAppeal {
    pub fn from_row(row: &SqliteRow) -> Result<Self> {
        let tier: String = row.try_get("target_tier")?;
        let status: String = row.try_get("status")?;

        Ok(Self {
            id: parse_stored("id", &row.try_get::<String, _>("id")?)?,
            group_id: parse_stored("group_id", &row.try_get::<String, _>("group_id")?)?,
            user_id: parse_stored("user_id", &row.try_get::<String, _>("user_id")?)?,
            target: AppealTarget {
                tier: tier.parse().map_err(|_| {
                    Error::Internal(format!("Unknown target_tier in storage: {}", tier))
                })?,
                target_id: parse_stored("target_id", &row.try_get::<String, _>("target_id")?)?,
            },
            content: row.try_get("content")?,
            status: status.parse().map_err(|_| {
                Error::Internal(format!("Unknown appeal status in storage: {}", status))
            })?,
            response: row.try_get("response")?,
            responded_by: parse_stored_opt("responded_by", row.try_get("responded_by")?)?,
            responded_at: row.try_get("responded_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// File attached to an appeal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppealAttachment {
    pub id: Uuid,
    pub appeal_id: Uuid,
    pub file_name: String,
    pub file_path: String,
    pub file_size: i64,
    pub content_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AppealAttachment {
    pub fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            id: parse_stored("id", &row.try_get::<String, _>("id")?)?,
            appeal_id: parse_stored("appeal_id", &row.try_get::<String, _>("appeal_id")?)?,
            file_name: row.try_get("file_name")?,
            file_path: row.try_get("file_path")?,
            file_size: row.try_get("file_size")?,
            content_type: row.try_get("content_type")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Immutable audit record of one adjustment action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentHistory {
    pub id: Uuid,
    pub group_id: Uuid,
    pub tier: ScoreTier,
    pub score_id: Uuid,
    /// Member whose score was adjusted
    pub user_id: Uuid,
    pub previous_score: f64,
    pub new_score: f64,
    pub adjustment_value: f64,
    pub reason: Option<String>,
    pub adjusted_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl AdjustmentHistory {
    pub fn from_row(row: &SqliteRow) -> Result<Self> {
        let tier: String = row.try_get("entity_tier")?;

        Ok(Self {
            id: parse_stored("id", &row.try_get::<String, _>("id")?)?,
            group_id: parse_stored("group_id", &row.try_get::<String, _>("group_id")?)?,
            tier: tier.parse().map_err(|_| {
                Error::Internal(format!("Unknown entity_tier in storage: {}", tier))
            })?,
            score_id: parse_stored("score_id", &row.try_get::<String, _>("score_id")?)?,
            user_id: parse_stored("user_id", &row.try_get::<String, _>("user_id")?)?,
            previous_score: row.try_get("previous_score")?,
            new_score: row.try_get("new_score")?,
            adjustment_value: row.try_get("adjustment_value")?,
            reason: row.try_get("reason")?,
            adjusted_by: parse_stored("adjusted_by", &row.try_get::<String, _>("adjusted_by")?)?,
            created_at: row.try_get("created_at")?,
        })
    }
}
