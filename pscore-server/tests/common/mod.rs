//! Shared fixture: a temporary database with one group and its leader

#![allow(dead_code)]

use pscore_common::db::init_database;
use pscore_server::collaborators::FsAttachmentStorage;
use pscore_server::AppState;
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

pub const TEST_SECRET: &str = "test-signing-secret";
pub const TEST_BASE_URL: &str = "http://pscore.test";

pub struct Fixture {
    pub dir: TempDir,
    pub pool: SqlitePool,
    pub state: AppState,
    pub group_id: Uuid,
    pub leader: Uuid,
}

impl Fixture {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_database(&dir.path().join("pscore.db")).await.unwrap();
        let storage = FsAttachmentStorage::new(
            dir.path().join("attachments"),
            TEST_SECRET.to_string(),
            300,
            TEST_BASE_URL.to_string(),
        );
        let state = AppState::with_sqlite_collaborators(pool.clone(), Arc::new(storage));

        let group_id = Uuid::new_v4();
        let leader = Uuid::new_v4();
        sqlx::query("INSERT INTO groups (id, name, leader_id) VALUES (?, 'Project', ?)")
            .bind(group_id.to_string())
            .bind(leader.to_string())
            .execute(&pool)
            .await
            .unwrap();

        let fixture = Self {
            dir,
            pool,
            state,
            group_id,
            leader,
        };
        fixture.join(leader, "leader").await;
        fixture
    }

    async fn join(&self, user_id: Uuid, role: &str) {
        sqlx::query("INSERT INTO group_members (group_id, user_id, role) VALUES (?, ?, ?)")
            .bind(self.group_id.to_string())
            .bind(user_id.to_string())
            .bind(role)
            .execute(&self.pool)
            .await
            .unwrap();
    }

    pub async fn add_member(&self) -> Uuid {
        let user_id = Uuid::new_v4();
        self.join(user_id, "member").await;
        user_id
    }

    pub async fn add_members(&self, count: usize) -> Vec<Uuid> {
        let mut members = Vec::with_capacity(count);
        for _ in 0..count {
            members.push(self.add_member().await);
        }
        members
    }

    pub async fn add_stage(&self, name: &str, position: i64) -> Uuid {
        let stage_id = Uuid::new_v4();
        sqlx::query("INSERT INTO stages (id, group_id, name, position) VALUES (?, ?, ?, ?)")
            .bind(stage_id.to_string())
            .bind(self.group_id.to_string())
            .bind(name)
            .bind(position)
            .execute(&self.pool)
            .await
            .unwrap();
        stage_id
    }

    pub async fn add_task(&self, stage_id: Option<Uuid>, assignees: &[Uuid]) -> Uuid {
        let task_id = Uuid::new_v4();
        sqlx::query("INSERT INTO tasks (id, group_id, stage_id, title) VALUES (?, ?, ?, 'Task')")
            .bind(task_id.to_string())
            .bind(self.group_id.to_string())
            .bind(stage_id.map(|id| id.to_string()))
            .execute(&self.pool)
            .await
            .unwrap();

        for user_id in assignees {
            self.assign(task_id, *user_id).await;
        }
        task_id
    }

    pub async fn assign(&self, task_id: Uuid, user_id: Uuid) {
        sqlx::query("INSERT INTO task_assignees (task_id, user_id) VALUES (?, ?)")
            .bind(task_id.to_string())
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await
            .unwrap();
    }

    pub async fn delete_task(&self, task_id: Uuid) {
        sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(task_id.to_string())
            .execute(&self.pool)
            .await
            .unwrap();
    }

    pub async fn move_task(&self, task_id: Uuid, stage_id: Uuid) {
        sqlx::query("UPDATE tasks SET stage_id = ? WHERE id = ?")
            .bind(stage_id.to_string())
            .bind(task_id.to_string())
            .execute(&self.pool)
            .await
            .unwrap();
    }

    /// Drop a member from the group and from every task they were assigned
    pub async fn remove_member(&self, user_id: Uuid) {
        sqlx::query("DELETE FROM group_members WHERE group_id = ? AND user_id = ?")
            .bind(self.group_id.to_string())
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await
            .unwrap();
        sqlx::query("DELETE FROM task_assignees WHERE user_id = ?")
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await
            .unwrap();
    }

    /// Regular files under the attachment root
    pub fn stored_file_count(&self) -> usize {
        fn walk(dir: &Path) -> usize {
            let Ok(entries) = std::fs::read_dir(dir) else {
                return 0;
            };
            entries
                .flatten()
                .map(|entry| {
                    let path = entry.path();
                    if path.is_dir() {
                        walk(&path)
                    } else {
                        1
                    }
                })
                .sum()
        }
        walk(&self.dir.path().join("attachments"))
    }

    pub async fn history_count(&self) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM score_adjustment_history")
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }

    pub async fn count(&self, table: &str) -> i64 {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }
}
