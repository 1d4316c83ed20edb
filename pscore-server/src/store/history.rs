//! Adjustment history (append-only)

use chrono::{DateTime, Utc};
use pscore_common::db::models::{AdjustmentHistory, ScoreTier};
use pscore_common::{uuid_utils, Result};
use serde::Deserialize;
use sqlx::{Executor, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::pagination::{calculate_pagination, Pagination, PAGE_SIZE};

/// One adjustment action about to be recorded
#[derive(Debug, Clone)]
pub struct NewHistoryEntry<'a> {
    pub group_id: Uuid,
    pub tier: ScoreTier,
    pub score_id: Uuid,
    pub user_id: Uuid,
    pub previous_score: f64,
    pub new_score: f64,
    pub adjustment_value: f64,
    pub reason: Option<&'a str>,
    pub adjusted_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct HistoryFilter {
    pub tier: Option<ScoreTier>,
    pub score_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
}

/// Append one record; returns its id
pub async fn append<'e, E>(executor: E, entry: &NewHistoryEntry<'_>) -> Result<Uuid>
where
    E: Executor<'e, Database = Sqlite>,
{
    let id = uuid_utils::generate();

    sqlx::query(
        r#"
        INSERT INTO score_adjustment_history (
            id, group_id, entity_tier, score_id, user_id, previous_score, new_score,
            adjustment_value, reason, adjusted_by, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(entry.group_id.to_string())
    .bind(entry.tier.as_str())
    .bind(entry.score_id.to_string())
    .bind(entry.user_id.to_string())
    .bind(entry.previous_score)
    .bind(entry.new_score)
    .bind(entry.adjustment_value)
    .bind(entry.reason)
    .bind(entry.adjusted_by.to_string())
    .bind(entry.created_at)
    .execute(executor)
    .await?;

    Ok(id)
}

/// A page of history, newest first
#[derive(Debug, Clone)]
pub struct HistoryPage {
    pub entries: Vec<AdjustmentHistory>,
    pub total: i64,
    pub pagination: Pagination,
}

pub async fn list(
    pool: &SqlitePool,
    group_id: Uuid,
    filter: HistoryFilter,
    requested_page: i64,
) -> Result<HistoryPage> {
    const WHERE: &str = r#"
        WHERE group_id = ?1
          AND (?2 IS NULL OR entity_tier = ?2)
          AND (?3 IS NULL OR score_id = ?3)
          AND (?4 IS NULL OR user_id = ?4)
    "#;

    let tier = filter.tier.map(|t| t.as_str());
    let score_id = filter.score_id.map(|id| id.to_string());
    let user_id = filter.user_id.map(|id| id.to_string());

    let total: i64 =
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM score_adjustment_history {}", WHERE))
            .bind(group_id.to_string())
            .bind(tier)
            .bind(&score_id)
            .bind(&user_id)
            .fetch_one(pool)
            .await?;

    let pagination = calculate_pagination(total, requested_page);

    let rows = sqlx::query(&format!(
        "SELECT * FROM score_adjustment_history {} ORDER BY created_at DESC, id LIMIT ?5 OFFSET ?6",
        WHERE
    ))
    .bind(group_id.to_string())
    .bind(tier)
    .bind(&score_id)
    .bind(&user_id)
    .bind(PAGE_SIZE)
    .bind(pagination.offset)
    .fetch_all(pool)
    .await?;

    let entries = rows
        .iter()
        .map(AdjustmentHistory::from_row)
        .collect::<Result<Vec<_>>>()?;

    Ok(HistoryPage {
        entries,
        total,
        pagination,
    })
}
