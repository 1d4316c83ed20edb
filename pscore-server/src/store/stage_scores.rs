//! Member stage score rows

use chrono::{DateTime, Utc};
use pscore_common::db::models::{MemberStageScore, SCORE_EPSILON};
use pscore_common::{uuid_utils, Result};
use serde::Deserialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::UpsertOutcome;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct StageScoreFilter {
    pub stage_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
}

/// Write a recomputed `average_score`, leaving every adjustment field alone
///
/// The row is only touched when the average actually moved, so repeated
/// reconciliation is a no-op.
pub async fn upsert_average(
    pool: &SqlitePool,
    group_id: Uuid,
    stage_id: Uuid,
    user_id: Uuid,
    average_score: f64,
    now: DateTime<Utc>,
) -> Result<UpsertOutcome> {
    let existed: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM member_stage_scores WHERE stage_id = ? AND user_id = ?)",
    )
    .bind(stage_id.to_string())
    .bind(user_id.to_string())
    .fetch_one(pool)
    .await?;

    let result = sqlx::query(
        r#"
        INSERT INTO member_stage_scores (id, group_id, stage_id, user_id, average_score,
                                         adjustment, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, 0, ?, ?)
        ON CONFLICT(stage_id, user_id) DO UPDATE SET
            average_score = excluded.average_score,
            updated_at = excluded.updated_at
        WHERE abs(member_stage_scores.average_score - excluded.average_score) > ?
        "#,
    )
    .bind(uuid_utils::generate().to_string())
    .bind(group_id.to_string())
    .bind(stage_id.to_string())
    .bind(user_id.to_string())
    .bind(average_score)
    .bind(now)
    .bind(now)
    .bind(SCORE_EPSILON)
    .execute(pool)
    .await?;

    Ok(match (result.rows_affected(), existed) {
        (0, _) => UpsertOutcome::Unchanged,
        (_, false) => UpsertOutcome::Created,
        (_, true) => UpsertOutcome::Updated,
    })
}

pub async fn list(
    pool: &SqlitePool,
    group_id: Uuid,
    filter: StageScoreFilter,
) -> Result<Vec<MemberStageScore>> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM member_stage_scores
        WHERE group_id = ?1
          AND (?2 IS NULL OR stage_id = ?2)
          AND (?3 IS NULL OR user_id = ?3)
        ORDER BY stage_id, user_id
        "#,
    )
    .bind(group_id.to_string())
    .bind(filter.stage_id.map(|id| id.to_string()))
    .bind(filter.user_id.map(|id| id.to_string()))
    .fetch_all(pool)
    .await?;

    rows.iter().map(MemberStageScore::from_row).collect()
}

/// Delete a stage row that no task score backs any more
///
/// Rows carrying an adjustment or targeted by an appeal are kept. Returns
/// whether the row was removed.
pub async fn delete_orphan(pool: &SqlitePool, id: Uuid) -> Result<bool> {
    let result = sqlx::query(
        r#"
        DELETE FROM member_stage_scores
        WHERE id = ?1
          AND abs(adjustment) < ?2
          AND NOT EXISTS (
              SELECT 1 FROM score_appeals WHERE target_tier = 'stage' AND target_id = ?1
          )
        "#,
    )
    .bind(id.to_string())
    .bind(SCORE_EPSILON)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}
