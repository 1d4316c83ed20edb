//! Tests for database initialization, storage-level invariants and migrations

use pscore_common::db::init::init_database;
use pscore_common::db::migrations::{get_schema_version, CURRENT_SCHEMA_VERSION};
use sqlx::SqlitePool;
use std::path::Path;

async fn fresh_db(dir: &Path) -> SqlitePool {
    init_database(&dir.join("pscore.db")).await.unwrap()
}

async fn seed_task(pool: &SqlitePool) {
    sqlx::query("INSERT INTO groups (id, name) VALUES ('g1', 'Group')")
        .execute(pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO tasks (id, group_id, title) VALUES ('t1', 'g1', 'Task')")
        .execute(pool)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_database_creation_when_missing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("sub").join("pscore.db");

    let result = init_database(&db_path).await;
    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("pscore.db");

    let pool1 = init_database(&db_path).await.unwrap();
    pool1.close().await;

    let pool2 = init_database(&db_path).await;
    assert!(pool2.is_ok(), "Failed to open existing database: {:?}", pool2.err());
}

#[tokio::test]
async fn test_schema_version_is_current() {
    let dir = tempfile::tempdir().unwrap();
    let pool = fresh_db(dir.path()).await;

    assert_eq!(get_schema_version(&pool).await.unwrap(), CURRENT_SCHEMA_VERSION);
}

#[tokio::test]
async fn test_final_score_is_generated_from_base_and_adjustment() {
    let dir = tempfile::tempdir().unwrap();
    let pool = fresh_db(dir.path()).await;
    seed_task(&pool).await;

    sqlx::query(
        r#"
        INSERT INTO task_scores (id, group_id, task_id, user_id, base_score, adjustment,
                                 adjustment_reason, created_at, updated_at)
        VALUES ('s1', 'g1', 't1', 'u1', 100, -7.5, 'late', '2026-01-01T00:00:00Z',
                '2026-01-01T00:00:00Z')
        "#,
    )
    .execute(&pool)
    .await
    .unwrap();

    let final_score: f64 = sqlx::query_scalar("SELECT final_score FROM task_scores WHERE id = 's1'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(final_score, 92.5);
}

#[tokio::test]
async fn test_nonzero_adjustment_requires_reason() {
    let dir = tempfile::tempdir().unwrap();
    let pool = fresh_db(dir.path()).await;
    seed_task(&pool).await;

    let result = sqlx::query(
        r#"
        INSERT INTO task_scores (id, group_id, task_id, user_id, adjustment, adjustment_reason,
                                 created_at, updated_at)
        VALUES ('s1', 'g1', 't1', 'u1', 5, '   ', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')
        "#,
    )
    .execute(&pool)
    .await;

    assert!(result.is_err(), "CHECK constraint should reject blank reason");
}

#[tokio::test]
async fn test_history_is_append_only() {
    let dir = tempfile::tempdir().unwrap();
    let pool = fresh_db(dir.path()).await;

    sqlx::query(
        r#"
        INSERT INTO score_adjustment_history (id, group_id, entity_tier, score_id, user_id,
            previous_score, new_score, adjustment_value, reason, adjusted_by, created_at)
        VALUES ('h1', 'g1', 'task', 's1', 'u1', 100, 90, -10, 'late', 'lead',
                '2026-01-01T00:00:00Z')
        "#,
    )
    .execute(&pool)
    .await
    .unwrap();

    let update = sqlx::query("UPDATE score_adjustment_history SET new_score = 95")
        .execute(&pool)
        .await;
    assert!(update.is_err());

    let delete = sqlx::query("DELETE FROM score_adjustment_history")
        .execute(&pool)
        .await;
    assert!(delete.is_err());

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM score_adjustment_history")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_history_rejects_inconsistent_delta() {
    let dir = tempfile::tempdir().unwrap();
    let pool = fresh_db(dir.path()).await;

    let result = sqlx::query(
        r#"
        INSERT INTO score_adjustment_history (id, group_id, entity_tier, score_id, user_id,
            previous_score, new_score, adjustment_value, reason, adjusted_by, created_at)
        VALUES ('h1', 'g1', 'task', 's1', 'u1', 100, 90, -5, 'late', 'lead',
                '2026-01-01T00:00:00Z')
        "#,
    )
    .execute(&pool)
    .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_resolved_appeal_requires_response() {
    let dir = tempfile::tempdir().unwrap();
    let pool = fresh_db(dir.path()).await;

    let result = sqlx::query(
        r#"
        INSERT INTO score_appeals (id, group_id, user_id, target_tier, target_id, content,
                                   status, created_at, updated_at)
        VALUES ('a1', 'g1', 'u1', 'task', 's1', 'please', 'approved',
                '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')
        "#,
    )
    .execute(&pool)
    .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_task_scores_cascade_on_task_delete() {
    let dir = tempfile::tempdir().unwrap();
    let pool = fresh_db(dir.path()).await;
    seed_task(&pool).await;

    sqlx::query(
        r#"
        INSERT INTO task_scores (id, group_id, task_id, user_id, created_at, updated_at)
        VALUES ('s1', 'g1', 't1', 'u1', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')
        "#,
    )
    .execute(&pool)
    .await
    .unwrap();

    sqlx::query("DELETE FROM tasks WHERE id = 't1'")
        .execute(&pool)
        .await
        .unwrap();

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM task_scores")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn test_migration_v1_converts_legacy_appeal_keys() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("pscore.db");

    // Legacy layout with three mutually exclusive foreign keys
    {
        let pool = SqlitePool::connect(&format!("sqlite://{}?mode=rwc", db_path.display()))
            .await
            .unwrap();
        sqlx::query(
            r#"
            CREATE TABLE score_appeals (
                id TEXT PRIMARY KEY,
                group_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                task_score_id TEXT,
                stage_score_id TEXT,
                final_score_id TEXT,
                content TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                response TEXT,
                responded_by TEXT,
                responded_at TIMESTAMP,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP
            )
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();

        sqlx::query(
            r#"
            INSERT INTO score_appeals (id, group_id, user_id, task_score_id, stage_score_id,
                                       final_score_id, content, created_at)
            VALUES
                ('a-task', 'g1', 'u1', 'ts1', NULL, NULL, 'task appeal', '2026-01-01T00:00:00Z'),
                ('a-stage', 'g1', 'u1', NULL, 'ss1', NULL, 'stage appeal', '2026-01-01T00:00:00Z'),
                ('a-none', 'g1', 'u1', NULL, NULL, NULL, 'dangling', '2026-01-01T00:00:00Z')
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();
        pool.close().await;
    }

    let pool = init_database(&db_path).await.unwrap();

    let rows: Vec<(String, String, String)> = sqlx::query_as(
        "SELECT id, target_tier, target_id FROM score_appeals ORDER BY id",
    )
    .fetch_all(&pool)
    .await
    .unwrap();

    assert_eq!(
        rows,
        vec![
            ("a-stage".to_string(), "stage".to_string(), "ss1".to_string()),
            ("a-task".to_string(), "task".to_string(), "ts1".to_string()),
        ]
    );

    let legacy_column: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM pragma_table_info('score_appeals') WHERE name = 'task_score_id'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(legacy_column, 0);
}
