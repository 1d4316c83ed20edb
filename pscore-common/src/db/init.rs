//! Database initialization
//!
//! Opens (or creates) the SQLite database and brings the schema up to date:
//! 1. `CREATE TABLE IF NOT EXISTS` for collaborator and score tables
//! 2. Versioned migrations (see [`crate::db::migrations`])
//!
//! Storage-level guarantees for the score tables:
//! - final columns are generated as `base + adjustment`
//! - a non-zero adjustment requires a non-blank reason
//! - the adjustment history rejects UPDATE and DELETE

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Busy timeout applied to every pooled connection
const BUSY_TIMEOUT_MS: u64 = 5000;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Pragmas are per connection, so they go on the connect options
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS));

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables and run pending migrations (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_settings_table(pool).await?;

    // Collaborator tables (groups, membership, stages, tasks, assignments)
    create_groups_table(pool).await?;
    create_group_members_table(pool).await?;
    create_stages_table(pool).await?;
    create_tasks_table(pool).await?;
    create_task_assignees_table(pool).await?;

    // Score Store
    create_task_scores_table(pool).await?;
    create_member_stage_scores_table(pool).await?;
    create_member_final_scores_table(pool).await?;
    create_stage_weights_table(pool).await?;
    create_score_appeals_table(pool).await?;
    create_appeal_attachments_table(pool).await?;
    create_adjustment_history_table(pool).await?;

    crate::db::migrations::run_migrations(pool).await?;

    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Key/value settings (signing secret and similar)
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_groups_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS groups (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            leader_id TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_group_members_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS group_members (
            group_id TEXT NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
            user_id TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'member' CHECK (role IN ('leader', 'member')),
            joined_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (group_id, user_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_stages_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS stages (
            id TEXT PRIMARY KEY,
            group_id TEXT NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            position INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_tasks_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tasks (
            id TEXT PRIMARY KEY,
            group_id TEXT NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
            stage_id TEXT REFERENCES stages(id) ON DELETE SET NULL,
            title TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_task_assignees_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS task_assignees (
            task_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
            user_id TEXT NOT NULL,
            PRIMARY KEY (task_id, user_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Per-(task, assignee) scores; deleted only by task cascade
pub async fn create_task_scores_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS task_scores (
            id TEXT PRIMARY KEY,
            group_id TEXT NOT NULL,
            task_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
            user_id TEXT NOT NULL,
            base_score REAL NOT NULL DEFAULT 100,
            adjustment REAL NOT NULL DEFAULT 0,
            adjustment_reason TEXT,
            adjusted_by TEXT,
            adjusted_at TIMESTAMP,
            final_score REAL GENERATED ALWAYS AS (base_score + adjustment) STORED,
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL,
            UNIQUE (task_id, user_id),
            CHECK (adjustment = 0 OR length(trim(coalesce(adjustment_reason, ''))) > 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_member_stage_scores_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS member_stage_scores (
            id TEXT PRIMARY KEY,
            group_id TEXT NOT NULL,
            stage_id TEXT NOT NULL REFERENCES stages(id) ON DELETE CASCADE,
            user_id TEXT NOT NULL,
            average_score REAL NOT NULL DEFAULT 0,
            adjustment REAL NOT NULL DEFAULT 0,
            adjustment_reason TEXT,
            adjusted_by TEXT,
            adjusted_at TIMESTAMP,
            final_stage_score REAL GENERATED ALWAYS AS (average_score + adjustment) STORED,
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL,
            UNIQUE (stage_id, user_id),
            CHECK (adjustment = 0 OR length(trim(coalesce(adjustment_reason, ''))) > 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_member_final_scores_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS member_final_scores (
            id TEXT PRIMARY KEY,
            group_id TEXT NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
            user_id TEXT NOT NULL,
            calculated_score REAL NOT NULL DEFAULT 0,
            adjustment REAL NOT NULL DEFAULT 0,
            adjustment_reason TEXT,
            adjusted_by TEXT,
            adjusted_at TIMESTAMP,
            final_score REAL GENERATED ALWAYS AS (calculated_score + adjustment) STORED,
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL,
            UNIQUE (group_id, user_id),
            CHECK (adjustment = 0 OR length(trim(coalesce(adjustment_reason, ''))) > 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn create_stage_weights_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS stage_weights (
            stage_id TEXT PRIMARY KEY REFERENCES stages(id) ON DELETE CASCADE,
            group_id TEXT NOT NULL,
            weight REAL NOT NULL CHECK (weight > 0),
            updated_by TEXT,
            updated_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// DDL for the tagged-target appeals layout under a given table name
///
/// Shared with the legacy-layout migration, which builds the new table
/// under a temporary name before swapping it in.
pub(crate) fn score_appeals_ddl(table: &str) -> String {
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            id TEXT PRIMARY KEY,
            group_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            target_tier TEXT NOT NULL CHECK (target_tier IN ('task', 'stage', 'final')),
            target_id TEXT NOT NULL,
            content TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'approved', 'rejected')),
            response TEXT,
            responded_by TEXT,
            responded_at TIMESTAMP,
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL,
            CHECK (
                status = 'pending'
                OR (length(trim(coalesce(response, ''))) > 0
                    AND responded_by IS NOT NULL
                    AND responded_at IS NOT NULL)
            )
        )
        "#
    )
}

pub async fn create_score_appeals_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(&score_appeals_ddl("score_appeals"))
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn create_appeal_attachments_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS appeal_attachments (
            id TEXT PRIMARY KEY,
            appeal_id TEXT NOT NULL REFERENCES score_appeals(id) ON DELETE CASCADE,
            file_name TEXT NOT NULL,
            file_path TEXT NOT NULL,
            file_size INTEGER NOT NULL,
            content_type TEXT,
            created_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Append-only audit log of adjustment actions
pub async fn create_adjustment_history_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS score_adjustment_history (
            id TEXT PRIMARY KEY,
            group_id TEXT NOT NULL,
            entity_tier TEXT NOT NULL CHECK (entity_tier IN ('task', 'stage', 'final')),
            score_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            previous_score REAL NOT NULL,
            new_score REAL NOT NULL,
            adjustment_value REAL NOT NULL,
            reason TEXT,
            adjusted_by TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL,
            CHECK (abs((new_score - previous_score) - adjustment_value) < 1e-6)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS score_adjustment_history_no_update
        BEFORE UPDATE ON score_adjustment_history
        BEGIN
            SELECT RAISE(ABORT, 'score_adjustment_history is append-only');
        END
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS score_adjustment_history_no_delete
        BEFORE DELETE ON score_adjustment_history
        BEGIN
            SELECT RAISE(ABORT, 'score_adjustment_history is append-only');
        END
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
