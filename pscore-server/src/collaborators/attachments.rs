//! Attachment storage provider

use async_trait::async_trait;
use pscore_common::signing::{self, SignatureError};
use pscore_common::{time, Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Largest accepted single attachment
pub const MAX_ATTACHMENT_BYTES: usize = 5 * 1024 * 1024;

/// A file handed in with an appeal
#[derive(Debug, Clone)]
pub struct AttachmentUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl AttachmentUpload {
    /// Name and size checks, independent of where the file ends up
    pub fn validate(&self) -> Result<()> {
        if self.file_name.trim().is_empty() {
            return Err(Error::validation("attachment file_name is required"));
        }
        if self.bytes.len() > MAX_ATTACHMENT_BYTES {
            return Err(Error::validation(format!(
                "attachment {} exceeds {} bytes",
                self.file_name, MAX_ATTACHMENT_BYTES
            )));
        }
        Ok(())
    }
}

/// Where an upload ended up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    /// Storage-relative path recorded on the attachment row
    pub path: String,
    pub size: i64,
}

#[async_trait]
pub trait AttachmentStorage: Send + Sync {
    async fn store(&self, file: AttachmentUpload) -> Result<StoredFile>;

    /// Time-limited URL for downloading a stored file
    fn retrieve(&self, path: &str) -> Result<String>;

    /// Read a file through a signed link previously issued by [`retrieve`]
    ///
    /// [`retrieve`]: AttachmentStorage::retrieve
    async fn open_signed(&self, path: &str, expires: i64, signature: &str) -> Result<Vec<u8>>;

    /// Remove a stored file; a path that is already gone is not an error
    async fn delete(&self, path: &str) -> Result<()>;
}

/// Files under a local directory, served back through signed links
#[derive(Debug, Clone)]
pub struct FsAttachmentStorage {
    root: PathBuf,
    secret: String,
    url_ttl_secs: u64,
    base_url: String,
}

impl FsAttachmentStorage {
    pub fn new(root: PathBuf, secret: String, url_ttl_secs: u64, base_url: String) -> Self {
        Self {
            root,
            secret,
            url_ttl_secs,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Resolve a stored relative path, refusing anything that escapes the root
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let safe = !path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(Error::validation(format!("Invalid attachment path: {}", path)));
        }
        Ok(self.root.join(relative))
    }
}

/// Keep a recognisable file name while removing separators and oddities
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

#[async_trait]
impl AttachmentStorage for FsAttachmentStorage {
    async fn store(&self, file: AttachmentUpload) -> Result<StoredFile> {
        file.validate()?;

        let relative = format!(
            "appeals/{}/{}",
            Uuid::new_v4(),
            sanitize_file_name(&file.file_name)
        );
        let full = self.resolve(&relative)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, &file.bytes).await?;

        debug!(path = %relative, size = file.bytes.len(), "Stored attachment");
        Ok(StoredFile {
            path: relative,
            size: file.bytes.len() as i64,
        })
    }

    fn retrieve(&self, path: &str) -> Result<String> {
        self.resolve(path)?;
        let expires = time::expiry_from_now(self.url_ttl_secs);
        let signature = signing::sign(&self.secret, path, expires);
        Ok(format!(
            "{}/attachments/{}?expires={}&signature={}",
            self.base_url, path, expires, signature
        ))
    }

    async fn open_signed(&self, path: &str, expires: i64, signature: &str) -> Result<Vec<u8>> {
        let full = self.resolve(path)?;

        signing::verify(&self.secret, path, expires, signature, time::now().timestamp()).map_err(
            |e| {
                warn!(path = %path, "Rejected attachment link: {}", e);
                match e {
                    SignatureError::Expired { .. } => Error::Authorization("link expired".into()),
                    SignatureError::Mismatch => Error::Authorization("invalid signature".into()),
                }
            },
        )?;

        match tokio::fs::read(&full).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::not_found(format!("attachment {}", path)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        match tokio::fs::remove_file(&full).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        // Each upload has its own directory; removal only succeeds once it is empty
        if let Some(parent) = full.parent().filter(|p| *p != self.root.as_path()) {
            let _ = tokio::fs::remove_dir(parent).await;
        }

        debug!(path = %path, "Deleted attachment");
        Ok(())
    }
}
