//! Identity and authorization provider

use async_trait::async_trait;
use axum::http::HeaderMap;
use pscore_common::{Error, Result};
use sqlx::SqlitePool;
use uuid::Uuid;

/// Header carrying the caller's user id, set by the fronting auth proxy
pub const USER_ID_HEADER: &str = "x-user-id";

/// Who is calling, and may they act as a reviewer for a group
#[async_trait]
pub trait AccessControl: Send + Sync {
    /// Identity of the caller of the current request
    fn current_user(&self, headers: &HeaderMap) -> Result<Uuid>;

    /// Whether `user_id` leads `group_id` (may adjust scores, set weights,
    /// resolve appeals)
    async fn is_leader(&self, group_id: Uuid, user_id: Uuid) -> Result<bool>;
}

/// Fail with [`Error::Authorization`] unless `user_id` leads `group_id`
pub async fn require_leader(
    access: &dyn AccessControl,
    group_id: Uuid,
    user_id: Uuid,
) -> Result<()> {
    if access.is_leader(group_id, user_id).await? {
        Ok(())
    } else {
        Err(Error::Authorization(format!(
            "user {} is not a leader of group {}",
            user_id, group_id
        )))
    }
}

/// Trusts the `x-user-id` header; leadership comes from `group_members.role`
/// or `groups.leader_id`
#[derive(Clone)]
pub struct HeaderAccessControl {
    db: SqlitePool,
}

impl HeaderAccessControl {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AccessControl for HeaderAccessControl {
    fn current_user(&self, headers: &HeaderMap) -> Result<Uuid> {
        let value = headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| Error::Unauthenticated(format!("missing {} header", USER_ID_HEADER)))?;

        let text = value
            .to_str()
            .map_err(|_| Error::Unauthenticated(format!("{} is not valid text", USER_ID_HEADER)))?;

        Uuid::parse_str(text.trim())
            .map_err(|_| Error::Unauthenticated(format!("{} is not a UUID", USER_ID_HEADER)))
    }

    async fn is_leader(&self, group_id: Uuid, user_id: Uuid) -> Result<bool> {
        let is_leader: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM group_members
                WHERE group_id = ?1 AND user_id = ?2 AND role = 'leader'
            ) OR EXISTS(
                SELECT 1 FROM groups WHERE id = ?1 AND leader_id = ?2
            )
            "#,
        )
        .bind(group_id.to_string())
        .bind(user_id.to_string())
        .fetch_one(&self.db)
        .await?;

        Ok(is_leader)
    }
}
