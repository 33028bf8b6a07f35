//! Collaborator traits for the progress server and blob storage.

use std::sync::Arc;

use async_trait::async_trait;
use crayon_core::{CanvasAction, CanvasProgress, ProgressKey};
use serde::{Deserialize, Serialize};

use crate::error::RemoteResult;

/// Body of a save request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpload {
    /// Full action log.
    pub actions: Vec<CanvasAction>,
    /// Server version the log was built on.
    pub base_version: u64,
    /// Canvas width the actions were recorded at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canvas_width: Option<u32>,
    /// Canvas height the actions were recorded at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canvas_height: Option<u32>,
    /// URL of an already stored thumbnail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
}

impl ProgressUpload {
    /// Upload `actions` on top of `base_version`.
    #[must_use]
    pub const fn new(actions: Vec<CanvasAction>, base_version: u64) -> Self {
        Self {
            actions,
            base_version,
            canvas_width: None,
            canvas_height: None,
            preview_url: None,
        }
    }

    /// Attach canvas dimensions.
    #[must_use]
    pub fn with_dimensions(mut self, dimensions: Option<(u32, u32)>) -> Self {
        self.canvas_width = dimensions.map(|(w, _)| w);
        self.canvas_height = dimensions.map(|(_, h)| h);
        self
    }

    /// Attach a preview URL.
    #[must_use]
    pub fn with_preview_url(mut self, url: Option<String>) -> Self {
        self.preview_url = url;
        self
    }
}

/// Versioned progress storage.
///
/// Implementations must apply the version rule: an upload whose
/// `base_version` is below the stored version fails with
/// [`crate::RemoteError::StaleVersion`]; otherwise the record is stored at
/// `stored + 1` (so the first upload yields version 1).
#[async_trait]
pub trait ProgressRemote: Send + Sync {
    /// Fetch the stored record; `None` when nothing has been saved.
    async fn fetch(&self, key: &ProgressKey) -> RemoteResult<Option<CanvasProgress>>;

    /// Store a new version and return the stored record.
    async fn save(&self, key: &ProgressKey, upload: ProgressUpload) -> RemoteResult<CanvasProgress>;

    /// Delete the stored record. Deleting a missing record succeeds.
    async fn delete(&self, key: &ProgressKey) -> RemoteResult<()>;
}

/// Storage for preview images.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` at `path` and return a URL serving them.
    async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> RemoteResult<String>;
}

#[async_trait]
impl<T: ProgressRemote + ?Sized> ProgressRemote for Arc<T> {
    async fn fetch(&self, key: &ProgressKey) -> RemoteResult<Option<CanvasProgress>> {
        (**self).fetch(key).await
    }

    async fn save(&self, key: &ProgressKey, upload: ProgressUpload) -> RemoteResult<CanvasProgress> {
        (**self).save(key, upload).await
    }

    async fn delete(&self, key: &ProgressKey) -> RemoteResult<()> {
        (**self).delete(key).await
    }
}

#[async_trait]
impl<T: BlobStore + ?Sized> BlobStore for Arc<T> {
    async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> RemoteResult<String> {
        (**self).put(path, bytes, content_type).await
    }
}

/// Blob path for a key's preview, e.g. `previews/u1.dino.png`.
#[must_use]
pub fn preview_path(key: &ProgressKey, extension: &str) -> String {
    format!("previews/{}.{extension}", key.file_stem())
}
