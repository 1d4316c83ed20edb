//! Task score rows

use chrono::{DateTime, Utc};
use pscore_common::db::models::{TaskScore, DEFAULT_TASK_BASE_SCORE};
use pscore_common::{uuid_utils, Result};
use serde::Deserialize;
use sqlx::{Executor, Sqlite, SqlitePool};
use uuid::Uuid;

/// Optional filters for group-scoped reads
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct TaskScoreFilter {
    pub task_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
}

/// Create the default row for (task, user) unless one exists
///
/// Returns true when a row was created.
pub async fn ensure<'e, E>(
    executor: E,
    group_id: Uuid,
    task_id: Uuid,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO task_scores (id, group_id, task_id, user_id, base_score, adjustment,
                                 created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, 0, ?, ?)
        ON CONFLICT(task_id, user_id) DO NOTHING
        "#,
    )
    .bind(uuid_utils::generate().to_string())
    .bind(group_id.to_string())
    .bind(task_id.to_string())
    .bind(user_id.to_string())
    .bind(DEFAULT_TASK_BASE_SCORE)
    .bind(now)
    .bind(now)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Task scores of a group, ordered by (task, user)
pub async fn list(
    pool: &SqlitePool,
    group_id: Uuid,
    filter: TaskScoreFilter,
) -> Result<Vec<TaskScore>> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM task_scores
        WHERE group_id = ?1
          AND (?2 IS NULL OR task_id = ?2)
          AND (?3 IS NULL OR user_id = ?3)
        ORDER BY task_id, user_id
        "#,
    )
    .bind(group_id.to_string())
    .bind(filter.task_id.map(|id| id.to_string()))
    .bind(filter.user_id.map(|id| id.to_string()))
    .fetch_all(pool)
    .await?;

    rows.iter().map(TaskScore::from_row).collect()
}

/// All task scores for a set of tasks (reconciliation input)
pub async fn list_for_tasks(pool: &SqlitePool, task_ids: &[Uuid]) -> Result<Vec<TaskScore>> {
    if task_ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut builder = sqlx::QueryBuilder::<Sqlite>::new("SELECT * FROM task_scores WHERE task_id IN (");
    let mut separated = builder.separated(", ");
    for id in task_ids {
        separated.push_bind(id.to_string());
    }
    separated.push_unseparated(") ORDER BY task_id, user_id");

    let rows = builder.build().fetch_all(pool).await?;
    rows.iter().map(TaskScore::from_row).collect()
}
