//! Database schema migrations
//!
//! Versioned, idempotent schema migrations tracked in `schema_version`.
//!
//! # Migration Guidelines
//!
//! 1. **Never modify existing migrations** - databases in the field were upgraded by them
//! 2. **Always add new migrations** - one function per schema change
//! 3. **Keep them idempotent** - check for the old shape before changing anything
//! 4. **Preserve data** - rebuild tables by copy, never by drop-and-recreate

use crate::db::init::score_appeals_ddl;
use crate::Result;
use sqlx::{Connection, SqlitePool};
use tracing::{info, warn};

/// Current schema version
///
/// **IMPORTANT:** Increment this when adding new migrations
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Get current schema version from database
///
/// Returns 0 if schema_version table doesn't exist or has no rows
pub async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let table_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM sqlite_master
            WHERE type='table' AND name='schema_version'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    Ok(version.unwrap_or(0))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;

    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current_version = get_schema_version(pool).await?;

    if current_version == CURRENT_SCHEMA_VERSION {
        info!("Database schema is up to date (v{})", current_version);
        return Ok(());
    }

    if current_version > CURRENT_SCHEMA_VERSION {
        warn!(
            "Database schema version ({}) is newer than code version ({})",
            current_version, CURRENT_SCHEMA_VERSION
        );
        warn!("This may indicate a downgrade. Proceeding with caution.");
        return Ok(());
    }

    info!(
        "Running database migrations: v{} -> v{}",
        current_version, CURRENT_SCHEMA_VERSION
    );

    if current_version < 1 {
        migrate_v1(pool).await?;
        set_schema_version(pool, 1).await?;
        info!("✓ Migration v1 completed");
    }

    if current_version < 2 {
        migrate_v2(pool).await?;
        set_schema_version(pool, 2).await?;
        info!("✓ Migration v2 completed");
    }

    info!("All migrations completed successfully");
    Ok(())
}

async fn has_column(pool: &SqlitePool, table: &str, column: &str) -> Result<bool> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM pragma_table_info(?) WHERE name = ?")
            .bind(table)
            .bind(column)
            .fetch_one(pool)
            .await?;

    Ok(count > 0)
}

/// Migration v1: tagged appeal targets
///
/// **Background:** appeals originally pointed at their score through three
/// mutually exclusive nullable columns (`task_score_id`, `stage_score_id`,
/// `final_score_id`). Nothing prevented two of them being set at once. The
/// table is rebuilt with a single `(target_tier, target_id)` pair.
///
/// Rows with more than one key keep the first in task, stage, final order.
/// Rows with no key reference no score and are not carried over.
///
/// Runs on a dedicated connection with foreign keys off so dropping the old
/// table does not cascade into `appeal_attachments`.
async fn migrate_v1(pool: &SqlitePool) -> Result<()> {
    info!("Running migration v1: tagged appeal targets");

    if !has_column(pool, "score_appeals", "task_score_id").await? {
        info!("  score_appeals already uses tagged targets - skipping");
        return Ok(());
    }

    let ambiguous: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM score_appeals
        WHERE (task_score_id IS NOT NULL) + (stage_score_id IS NOT NULL)
              + (final_score_id IS NOT NULL) > 1
        "#,
    )
    .fetch_one(pool)
    .await?;

    let orphaned: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM score_appeals
        WHERE task_score_id IS NULL AND stage_score_id IS NULL AND final_score_id IS NULL
        "#,
    )
    .fetch_one(pool)
    .await?;

    if ambiguous > 0 {
        warn!(
            "  {} appeal(s) referenced more than one score; keeping the most specific",
            ambiguous
        );
    }
    if orphaned > 0 {
        warn!("  {} appeal(s) referenced no score and are dropped", orphaned);
    }

    let mut conn = pool.acquire().await?;
    sqlx::query("PRAGMA foreign_keys = OFF")
        .execute(&mut *conn)
        .await?;

    let rebuild = async {
        let mut tx = conn.begin().await?;

        sqlx::query("DROP TABLE IF EXISTS score_appeals_v1")
            .execute(&mut *tx)
            .await?;
        sqlx::query(&score_appeals_ddl("score_appeals_v1"))
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO score_appeals_v1 (
                id, group_id, user_id, target_tier, target_id, content, status,
                response, responded_by, responded_at, created_at, updated_at
            )
            SELECT
                id, group_id, user_id,
                CASE
                    WHEN task_score_id IS NOT NULL THEN 'task'
                    WHEN stage_score_id IS NOT NULL THEN 'stage'
                    ELSE 'final'
                END,
                COALESCE(task_score_id, stage_score_id, final_score_id),
                content, status, response, responded_by, responded_at,
                created_at, COALESCE(updated_at, created_at)
            FROM score_appeals
            WHERE COALESCE(task_score_id, stage_score_id, final_score_id) IS NOT NULL
            "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query("DROP TABLE score_appeals")
            .execute(&mut *tx)
            .await?;
        sqlx::query("ALTER TABLE score_appeals_v1 RENAME TO score_appeals")
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok::<(), sqlx::Error>(())
    }
    .await;

    // Restore before the connection goes back to the pool, even on failure
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&mut *conn)
        .await?;
    rebuild?;

    info!("  ✓ Rebuilt score_appeals with (target_tier, target_id)");
    Ok(())
}

/// Migration v2: read-path indexes
///
/// Indexes for group-filtered score reads, history listing and appeal lookup.
async fn migrate_v2(pool: &SqlitePool) -> Result<()> {
    info!("Running migration v2: read-path indexes");

    let statements = [
        "CREATE INDEX IF NOT EXISTS idx_task_scores_group ON task_scores (group_id, user_id)",
        "CREATE INDEX IF NOT EXISTS idx_stage_scores_group ON member_stage_scores (group_id, user_id)",
        "CREATE INDEX IF NOT EXISTS idx_history_group ON score_adjustment_history (group_id, created_at)",
        "CREATE INDEX IF NOT EXISTS idx_history_score ON score_adjustment_history (entity_tier, score_id)",
        "CREATE INDEX IF NOT EXISTS idx_appeals_group ON score_appeals (group_id, status)",
        "CREATE INDEX IF NOT EXISTS idx_appeals_target ON score_appeals (target_tier, target_id)",
        "CREATE INDEX IF NOT EXISTS idx_attachments_appeal ON appeal_attachments (appeal_id)",
    ];

    for sql in statements {
        sqlx::query(sql).execute(pool).await?;
    }

    info!("  ✓ Created {} indexes", statements.len());
    Ok(())
}
