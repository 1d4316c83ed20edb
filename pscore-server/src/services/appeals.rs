//! Appeal Workflow
//!
//! A member contests one of their own score rows; a leader of the group
//! approves or rejects it with a written response. Resolving an appeal never
//! changes a score; a reviewer who agrees applies a separate adjustment.

use pscore_common::db::models::{AppealAttachment, AppealStatus, AppealTarget, ScoreAppeal};
use pscore_common::{time, Error, Result};
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::collaborators::access::require_leader;
use crate::collaborators::{AccessControl, AttachmentStorage, AttachmentUpload};
use crate::store::appeals::{self, NewAttachment};
use crate::store::scores;

/// Attachment metadata plus a short-lived download link
#[derive(Debug, Clone, Serialize)]
pub struct AttachmentView {
    #[serde(flatten)]
    pub attachment: AppealAttachment,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppealDetails {
    #[serde(flatten)]
    pub appeal: ScoreAppeal,
    pub attachments: Vec<AttachmentView>,
}

#[derive(Clone)]
pub struct AppealService {
    db: SqlitePool,
    access: Arc<dyn AccessControl>,
    storage: Arc<dyn AttachmentStorage>,
}

impl AppealService {
    pub fn new(
        db: SqlitePool,
        access: Arc<dyn AccessControl>,
        storage: Arc<dyn AttachmentStorage>,
    ) -> Self {
        Self {
            db,
            access,
            storage,
        }
    }

    /// File a pending appeal against a score row owned by `user_id`
    pub async fn submit_appeal(
        &self,
        user_id: Uuid,
        target: AppealTarget,
        content: &str,
        uploads: Vec<AttachmentUpload>,
    ) -> Result<ScoreAppeal> {
        let content = content.trim();
        if content.is_empty() {
            return Err(Error::validation("appeal content is required"));
        }

        let row = scores::get_row(&self.db, target.tier, target.target_id)
            .await?
            .ok_or_else(|| {
                Error::validation(format!(
                    "{} score {} does not exist",
                    target.tier, target.target_id
                ))
            })?;
        if row.user_id != user_id {
            return Err(Error::validation(format!(
                "{} score {} does not belong to the appellant",
                target.tier, target.target_id
            )));
        }

        for upload in &uploads {
            upload.validate()?;
        }

        let mut attachments = Vec::with_capacity(uploads.len());
        for upload in uploads {
            let file_name = upload.file_name.clone();
            let content_type = upload.content_type.clone();
            match self.storage.store(upload).await {
                Ok(stored) => attachments.push(NewAttachment {
                    file_name,
                    content_type,
                    stored,
                }),
                Err(e) => {
                    self.discard(&attachments).await;
                    return Err(e);
                }
            }
        }

        let inserted = appeals::insert(
            &self.db,
            row.group_id,
            user_id,
            target,
            content,
            &attachments,
            time::now(),
        )
        .await;
        let appeal_id = match inserted {
            Ok(id) => id,
            Err(e) => {
                self.discard(&attachments).await;
                return Err(e);
            }
        };

        info!(
            appeal_id = %appeal_id,
            user_id = %user_id,
            tier = %target.tier,
            target_id = %target.target_id,
            attachments = attachments.len(),
            "Appeal submitted"
        );

        self.load(appeal_id).await
    }

    /// Approve or reject a pending appeal
    pub async fn resolve_appeal(
        &self,
        appeal_id: Uuid,
        reviewer: Uuid,
        approve: bool,
        response: &str,
    ) -> Result<ScoreAppeal> {
        let appeal = self.load(appeal_id).await?;
        require_leader(self.access.as_ref(), appeal.group_id, reviewer).await?;

        if appeal.status.is_terminal() {
            return Err(Error::InvalidState(format!(
                "appeal {} is already {}",
                appeal_id, appeal.status
            )));
        }

        let response = response.trim();
        if response.is_empty() {
            return Err(Error::validation("a response is required to resolve an appeal"));
        }

        let status = if approve {
            AppealStatus::Approved
        } else {
            AppealStatus::Rejected
        };
        if !appeals::resolve(&self.db, appeal_id, status, response, reviewer, time::now()).await? {
            return Err(Error::InvalidState(format!(
                "appeal {} was resolved concurrently",
                appeal_id
            )));
        }

        info!(appeal_id = %appeal_id, reviewer = %reviewer, %status, "Appeal resolved");
        self.load(appeal_id).await
    }

    /// Appeals of a group for its leaders
    pub async fn list_group_appeals(
        &self,
        group_id: Uuid,
        status: Option<AppealStatus>,
        requester: Uuid,
    ) -> Result<Vec<ScoreAppeal>> {
        require_leader(self.access.as_ref(), group_id, requester).await?;
        appeals::list_for_group(&self.db, group_id, status).await
    }

    pub async fn list_own_appeals(&self, user_id: Uuid) -> Result<Vec<ScoreAppeal>> {
        appeals::list_for_user(&self.db, user_id).await
    }

    /// One appeal with signed attachment links, for its appellant or a leader
    pub async fn get_appeal(&self, appeal_id: Uuid, requester: Uuid) -> Result<AppealDetails> {
        let appeal = self.load(appeal_id).await?;
        self.require_viewer(&appeal, requester).await?;

        let attachments = self.attachment_urls(appeal_id).await?;
        Ok(AppealDetails {
            appeal,
            attachments,
        })
    }

    async fn attachment_urls(&self, appeal_id: Uuid) -> Result<Vec<AttachmentView>> {
        let stored = appeals::attachments(&self.db, appeal_id).await?;
        let mut views = Vec::with_capacity(stored.len());
        for attachment in stored {
            match self.storage.retrieve(&attachment.file_path) {
                Ok(url) => views.push(AttachmentView { attachment, url }),
                Err(e) => {
                    warn!(
                        appeal_id = %appeal_id,
                        path = %attachment.file_path,
                        "Cannot sign attachment link: {}",
                        e
                    );
                    return Err(e);
                }
            }
        }
        Ok(views)
    }

    async fn require_viewer(&self, appeal: &ScoreAppeal, requester: Uuid) -> Result<()> {
        if appeal.user_id == requester {
            return Ok(());
        }
        require_leader(self.access.as_ref(), appeal.group_id, requester).await
    }

    async fn load(&self, appeal_id: Uuid) -> Result<ScoreAppeal> {
        appeals::get(&self.db, appeal_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("appeal {}", appeal_id)))
    }

    /// Remove files stored for a submission that did not go through
    async fn discard(&self, attachments: &[NewAttachment]) {
        for attachment in attachments {
            if let Err(e) = self.storage.delete(&attachment.stored.path).await {
                warn!(path = %attachment.stored.path, "Failed to remove attachment: {}", e);
            }
        }
    }
}
