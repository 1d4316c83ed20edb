//! Appeals and their attachments

use chrono::{DateTime, Utc};
use pscore_common::db::models::{AppealAttachment, AppealStatus, AppealTarget, ScoreAppeal};
use pscore_common::{uuid_utils, Result};
use sqlx::{Executor, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::collaborators::StoredFile;

/// Attachment metadata recorded alongside a new appeal
#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub file_name: String,
    pub content_type: Option<String>,
    pub stored: StoredFile,
}

/// Insert a pending appeal together with its attachment rows
pub async fn insert(
    pool: &SqlitePool,
    group_id: Uuid,
    user_id: Uuid,
    target: AppealTarget,
    content: &str,
    attachments: &[NewAttachment],
    now: DateTime<Utc>,
) -> Result<Uuid> {
    let id = uuid_utils::generate();
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO score_appeals (id, group_id, user_id, target_tier, target_id, content,
                                   status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, 'pending', ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(group_id.to_string())
    .bind(user_id.to_string())
    .bind(target.tier.as_str())
    .bind(target.target_id.to_string())
    .bind(content)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    for attachment in attachments {
        sqlx::query(
            r#"
            INSERT INTO appeal_attachments (id, appeal_id, file_name, file_path, file_size,
                                            content_type, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(uuid_utils::generate().to_string())
        .bind(id.to_string())
        .bind(&attachment.file_name)
        .bind(&attachment.stored.path)
        .bind(attachment.stored.size)
        .bind(&attachment.content_type)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(id)
}

pub async fn get<'e, E>(executor: E, appeal_id: Uuid) -> Result<Option<ScoreAppeal>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query("SELECT * FROM score_appeals WHERE id = ?")
        .bind(appeal_id.to_string())
        .fetch_optional(executor)
        .await?;

    row.as_ref().map(ScoreAppeal::from_row).transpose()
}

pub async fn attachments(pool: &SqlitePool, appeal_id: Uuid) -> Result<Vec<AppealAttachment>> {
    let rows = sqlx::query(
        "SELECT * FROM appeal_attachments WHERE appeal_id = ? ORDER BY created_at, file_name",
    )
    .bind(appeal_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(AppealAttachment::from_row).collect()
}

/// Appeals of a group, newest first, optionally by status
pub async fn list_for_group(
    pool: &SqlitePool,
    group_id: Uuid,
    status: Option<AppealStatus>,
) -> Result<Vec<ScoreAppeal>> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM score_appeals
        WHERE group_id = ?1 AND (?2 IS NULL OR status = ?2)
        ORDER BY created_at DESC, id
        "#,
    )
    .bind(group_id.to_string())
    .bind(status.map(|s| s.as_str()))
    .fetch_all(pool)
    .await?;

    rows.iter().map(ScoreAppeal::from_row).collect()
}

/// Appeals filed by one member, newest first
pub async fn list_for_user(pool: &SqlitePool, user_id: Uuid) -> Result<Vec<ScoreAppeal>> {
    let rows = sqlx::query(
        "SELECT * FROM score_appeals WHERE user_id = ? ORDER BY created_at DESC, id",
    )
    .bind(user_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(ScoreAppeal::from_row).collect()
}

/// Close a pending appeal
///
/// Guarded on `status = 'pending'`; returns false when the appeal was no
/// longer pending (already resolved by someone else).
pub async fn resolve(
    pool: &SqlitePool,
    appeal_id: Uuid,
    status: AppealStatus,
    response: &str,
    responded_by: Uuid,
    now: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE score_appeals
        SET status = ?, response = ?, responded_by = ?, responded_at = ?, updated_at = ?
        WHERE id = ? AND status = 'pending'
        "#,
    )
    .bind(status.as_str())
    .bind(response)
    .bind(responded_by.to_string())
    .bind(now)
    .bind(now)
    .bind(appeal_id.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}
