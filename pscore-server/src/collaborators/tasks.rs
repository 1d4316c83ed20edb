//! Task/assignment provider

use async_trait::async_trait;
use pscore_common::uuid_utils::{parse_stored, parse_stored_opt};
use pscore_common::Result;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// A unit of work that members are assigned to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub group_id: Uuid,
    /// Tasks outside any stage still get task scores but feed no stage score
    pub stage_id: Option<Uuid>,
    pub title: String,
}

/// A phase of a group's project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub id: Uuid,
    pub group_id: Uuid,
    pub name: String,
    pub position: i64,
}

/// Source of truth for tasks, stages, assignments and membership
#[async_trait]
pub trait TaskProvider: Send + Sync {
    async fn list_tasks(&self, group_id: Uuid) -> Result<Vec<Task>>;

    async fn list_assignees(&self, task_id: Uuid) -> Result<Vec<Uuid>>;

    async fn list_stages(&self, group_id: Uuid) -> Result<Vec<Stage>>;

    async fn list_group_members(&self, group_id: Uuid) -> Result<Vec<Uuid>>;

    async fn get_task(&self, task_id: Uuid) -> Result<Option<Task>>;

    async fn get_stage(&self, stage_id: Uuid) -> Result<Option<Stage>>;

    /// Whether the group exists at all
    async fn group_exists(&self, group_id: Uuid) -> Result<bool>;
}

/// [`TaskProvider`] over the `groups`, `group_members`, `stages`, `tasks` and
/// `task_assignees` tables
#[derive(Clone)]
pub struct SqliteTaskProvider {
    db: SqlitePool,
}

impl SqliteTaskProvider {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

fn task_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Task> {
    Ok(Task {
        id: parse_stored("id", &row.try_get::<String, _>("id")?)?,
        group_id: parse_stored("group_id", &row.try_get::<String, _>("group_id")?)?,
        stage_id: parse_stored_opt("stage_id", row.try_get("stage_id")?)?,
        title: row.try_get("title")?,
    })
}

fn stage_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Stage> {
    Ok(Stage {
        id: parse_stored("id", &row.try_get::<String, _>("id")?)?,
        group_id: parse_stored("group_id", &row.try_get::<String, _>("group_id")?)?,
        name: row.try_get("name")?,
        position: row.try_get("position")?,
    })
}

fn user_ids(rows: Vec<String>) -> Result<Vec<Uuid>> {
    rows.iter().map(|s| parse_stored("user_id", s)).collect()
}

#[async_trait]
impl TaskProvider for SqliteTaskProvider {
    async fn list_tasks(&self, group_id: Uuid) -> Result<Vec<Task>> {
        let rows = sqlx::query(
            "SELECT id, group_id, stage_id, title FROM tasks WHERE group_id = ? ORDER BY id",
        )
        .bind(group_id.to_string())
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(task_from_row).collect()
    }

    async fn list_assignees(&self, task_id: Uuid) -> Result<Vec<Uuid>> {
        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT user_id FROM task_assignees WHERE task_id = ? ORDER BY user_id",
        )
        .bind(task_id.to_string())
        .fetch_all(&self.db)
        .await?;

        user_ids(rows)
    }

    async fn list_stages(&self, group_id: Uuid) -> Result<Vec<Stage>> {
        let rows = sqlx::query(
            "SELECT id, group_id, name, position FROM stages WHERE group_id = ? ORDER BY position, id",
        )
        .bind(group_id.to_string())
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(stage_from_row).collect()
    }

    async fn list_group_members(&self, group_id: Uuid) -> Result<Vec<Uuid>> {
        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT user_id FROM group_members WHERE group_id = ? ORDER BY user_id",
        )
        .bind(group_id.to_string())
        .fetch_all(&self.db)
        .await?;

        user_ids(rows)
    }

    async fn get_task(&self, task_id: Uuid) -> Result<Option<Task>> {
        let row = sqlx::query("SELECT id, group_id, stage_id, title FROM tasks WHERE id = ?")
            .bind(task_id.to_string())
            .fetch_optional(&self.db)
            .await?;

        row.as_ref().map(task_from_row).transpose()
    }

    async fn get_stage(&self, stage_id: Uuid) -> Result<Option<Stage>> {
        let row = sqlx::query("SELECT id, group_id, name, position FROM stages WHERE id = ?")
            .bind(stage_id.to_string())
            .fetch_optional(&self.db)
            .await?;

        row.as_ref().map(stage_from_row).transpose()
    }

    async fn group_exists(&self, group_id: Uuid) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM groups WHERE id = ?)")
            .bind(group_id.to_string())
            .fetch_one(&self.db)
            .await?;

        Ok(exists)
    }
}
