//! Member final score rows

use chrono::{DateTime, Utc};
use pscore_common::db::models::{MemberFinalScore, SCORE_EPSILON};
use pscore_common::{uuid_utils, Result};
use serde::Deserialize;
use sqlx::SqlitePool;
use uuid::Uuid;

use super::UpsertOutcome;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct FinalScoreFilter {
    pub user_id: Option<Uuid>,
}

/// Write a recomputed `calculated_score`, leaving every adjustment field alone
pub async fn upsert_calculated(
    pool: &SqlitePool,
    group_id: Uuid,
    user_id: Uuid,
    calculated_score: f64,
    now: DateTime<Utc>,
) -> Result<UpsertOutcome> {
    let existed: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM member_final_scores WHERE group_id = ? AND user_id = ?)",
    )
    .bind(group_id.to_string())
    .bind(user_id.to_string())
    .fetch_one(pool)
    .await?;

    let result = sqlx::query(
        r#"
        INSERT INTO member_final_scores (id, group_id, user_id, calculated_score, adjustment,
                                         created_at, updated_at)
        VALUES (?, ?, ?, ?, 0, ?, ?)
        ON CONFLICT(group_id, user_id) DO UPDATE SET
            calculated_score = excluded.calculated_score,
            updated_at = excluded.updated_at
        WHERE abs(member_final_scores.calculated_score - excluded.calculated_score) > ?
        "#,
    )
    .bind(uuid_utils::generate().to_string())
    .bind(group_id.to_string())
    .bind(user_id.to_string())
    .bind(calculated_score)
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
    filter: FinalScoreFilter,
) -> Result<Vec<MemberFinalScore>> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM member_final_scores
        WHERE group_id = ?1
          AND (?2 IS NULL OR user_id = ?2)
        ORDER BY final_score DESC, user_id
        "#,
    )
    .bind(group_id.to_string())
    .bind(filter.user_id.map(|id| id.to_string()))
    .fetch_all(pool)
    .await?;

    rows.iter().map(MemberFinalScore::from_row).collect()
}

/// Delete the final row of a member with no contributing stage rows
///
/// Same retention rule as stage rows: adjusted or appealed rows stay.
pub async fn delete_orphan(pool: &SqlitePool, id: Uuid) -> Result<bool> {
    let result = sqlx::query(
        r#"
        DELETE FROM member_final_scores
        WHERE id = ?1
          AND abs(adjustment) < ?2
          AND NOT EXISTS (
              SELECT 1 FROM score_appeals WHERE target_tier = 'final' AND target_id = ?1
          )
        "#,
    )
    .bind(id.to_string())
    .bind(SCORE_EPSILON)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}
