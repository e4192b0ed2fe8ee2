use std::path::PathBuf;

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedObject {
    pub url: String,
}

/// Raw file received from a client.
#[derive(Debug, Clone)]
pub struct FilePart {
    pub bytes: Vec<u8>,
    pub filename: Option<String>,
}

impl FilePart {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes, filename: None }
    }
}

/// Binary object storage. Implementations must reject empty buffers.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, bytes: Vec<u8>, filename_hint: Option<&str>) -> AppResult<UploadedObject>;
}

/// Stores objects on local disk and serves them under a base URL.
#[derive(Debug, Clone)]
pub struct LocalDiskUploader {
    root: PathBuf,
    base_url: String,
}

impl LocalDiskUploader {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_env() -> Self {
        let root = std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads".to_string());
        let base_url = std::env::var("UPLOAD_BASE_URL").unwrap_or_else(|_| "/uploads".to_string());
        Self::new(root, base_url)
    }
}

fn extension_of(hint: Option<&str>) -> Option<String> {
    let ext = hint?.rsplit_once('.')?.1;
    let clean = !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric());
    clean.then(|| ext.to_ascii_lowercase())
}

#[async_trait]
impl Uploader for LocalDiskUploader {
    async fn upload(&self, bytes: Vec<u8>, filename_hint: Option<&str>) -> AppResult<UploadedObject> {
        if bytes.is_empty() {
            return Err(AppError::upload("refusing to store an empty file"));
        }

        let name = match extension_of(filename_hint) {
            Some(ext) => format!("{}.{}", Uuid::new_v4(), ext),
            None => Uuid::new_v4().to_string(),
        };

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|err| AppError::upload(format!("cannot prepare upload dir: {err}")))?;
        tokio::fs::write(self.root.join(&name), &bytes).await.map_err(|err| {
            tracing::error!(error = %err, "upload write failed");
            AppError::upload(format!("cannot store file: {err}"))
        })?;

        Ok(UploadedObject {
            url: format!("{}/{}", self.base_url, name),
        })
    }
}
