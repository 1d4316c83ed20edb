//! Tier-generic score row access
//!
//! Column and table names come from [`ScoreTier`], never from callers.

use chrono::{DateTime, Utc};
use pscore_common::db::models::{ScoreRow, ScoreTier};
use pscore_common::Result;
use sqlx::{Executor, Sqlite};
use uuid::Uuid;

fn select_sql(tier: ScoreTier, predicate: &str) -> String {
    format!(
        r#"
        SELECT id, group_id, {entity} AS entity_id, user_id, {base} AS base, adjustment,
               adjustment_reason, adjusted_by, adjusted_at, {final_col} AS final_value
        FROM {table}
        WHERE {predicate}
        "#,
        entity = tier.entity_column(),
        base = tier.base_column(),
        final_col = tier.final_column(),
        table = tier.table(),
        predicate = predicate,
    )
}

/// Load a score row by id
pub async fn get_row<'e, E>(executor: E, tier: ScoreTier, id: Uuid) -> Result<Option<ScoreRow>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(&select_sql(tier, "id = ?"))
        .bind(id.to_string())
        .fetch_optional(executor)
        .await?;

    row.map(|r| ScoreRow::from_row(tier, &r)).transpose()
}

/// Load a score row by its natural key (task/stage/group id + user)
pub async fn find_by_pair<'e, E>(
    executor: E,
    tier: ScoreTier,
    entity_id: Uuid,
    user_id: Uuid,
) -> Result<Option<ScoreRow>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let predicate = format!("{} = ? AND user_id = ?", tier.entity_column());
    let row = sqlx::query(&select_sql(tier, &predicate))
        .bind(entity_id.to_string())
        .bind(user_id.to_string())
        .fetch_optional(executor)
        .await?;

    row.map(|r| ScoreRow::from_row(tier, &r)).transpose()
}

/// Overwrite the adjustment fields of one row
///
/// The final column is generated by SQLite, so it follows automatically.
pub async fn write_adjustment<'e, E>(
    executor: E,
    tier: ScoreTier,
    id: Uuid,
    adjustment: f64,
    reason: Option<&str>,
    adjusted_by: Uuid,
    adjusted_at: DateTime<Utc>,
) -> Result<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        r#"
        UPDATE {table}
        SET adjustment = ?, adjustment_reason = ?, adjusted_by = ?, adjusted_at = ?,
            updated_at = ?
        WHERE id = ?
        "#,
        table = tier.table()
    );

    let result = sqlx::query(&sql)
        .bind(adjustment)
        .bind(reason)
        .bind(adjusted_by.to_string())
        .bind(adjusted_at)
        .bind(adjusted_at)
        .bind(id.to_string())
        .execute(executor)
        .await?;

    Ok(result.rows_affected())
}
