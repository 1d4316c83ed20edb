//! Stage weights

use chrono::{DateTime, Utc};
use pscore_common::db::models::StageWeight;
use pscore_common::uuid_utils::parse_stored;
use pscore_common::Result;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use uuid::Uuid;

pub async fn list_for_group(pool: &SqlitePool, group_id: Uuid) -> Result<Vec<StageWeight>> {
    let rows = sqlx::query("SELECT * FROM stage_weights WHERE group_id = ? ORDER BY stage_id")
        .bind(group_id.to_string())
        .fetch_all(pool)
        .await?;

    rows.iter().map(StageWeight::from_row).collect()
}

/// Explicit weights keyed by stage; stages absent from the map weigh 1
pub async fn weight_map(pool: &SqlitePool, group_id: Uuid) -> Result<HashMap<Uuid, f64>> {
    let rows = sqlx::query("SELECT stage_id, weight FROM stage_weights WHERE group_id = ?")
        .bind(group_id.to_string())
        .fetch_all(pool)
        .await?;

    rows.iter()
        .map(|row| -> Result<(Uuid, f64)> {
            let stage_id = parse_stored("stage_id", &row.try_get::<String, _>("stage_id")?)?;
            Ok((stage_id, row.try_get::<f64, _>("weight")?))
        })
        .collect()
}

pub async fn upsert(
    pool: &SqlitePool,
    group_id: Uuid,
    stage_id: Uuid,
    weight: f64,
    updated_by: Uuid,
    now: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO stage_weights (stage_id, group_id, weight, updated_by, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(stage_id) DO UPDATE SET
            weight = excluded.weight,
            updated_by = excluded.updated_by,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(stage_id.to_string())
    .bind(group_id.to_string())
    .bind(weight)
    .bind(updated_by.to_string())
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

/// Returns true when a row was removed
pub async fn delete(pool: &SqlitePool, stage_id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM stage_weights WHERE stage_id = ?")
        .bind(stage_id.to_string())
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
