//! In-process progress server and blob store.
//!
//! Used for tests, demos and single-device offline play. Both apply the
//! same rules as the HTTP server.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use crayon_core::{CanvasProgress, ProgressKey};

use crate::error::{RemoteError, RemoteResult};
use crate::remote::{BlobStore, ProgressRemote, ProgressUpload};

/// Progress server holding records in memory.
#[derive(Debug, Default)]
pub struct InMemoryProgressServer {
    records: RwLock<HashMap<String, CanvasProgress>>,
    offline: AtomicBool,
    saves: AtomicUsize,
}

impl InMemoryProgressServer {
    /// Create an empty server.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the network going away (or coming back).
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of accepted uploads.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Stored record for `key`, bypassing the network simulation.
    #[must_use]
    pub fn get(&self, key: &ProgressKey) -> Option<CanvasProgress> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key.to_string())
            .cloned()
    }

    /// Overwrite the stored record for `key`.
    pub fn insert(&self, key: &ProgressKey, progress: CanvasProgress) {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), progress);
    }

    fn check_online(&self) -> RemoteResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(RemoteError::Offline("in-memory server set offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ProgressRemote for InMemoryProgressServer {
    async fn fetch(&self, key: &ProgressKey) -> RemoteResult<Option<CanvasProgress>> {
        self.check_online()?;
        Ok(self.get(key))
    }

    async fn save(&self, key: &ProgressKey, upload: ProgressUpload) -> RemoteResult<CanvasProgress> {
        self.check_online()?;
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let stored_version = records.get(&key.to_string()).map_or(0, |p| p.version);

        if upload.base_version < stored_version {
            let stored = records
                .get(&key.to_string())
                .cloned()
                .unwrap_or_default();
            tracing::debug!(
                key = %key,
                base_version = upload.base_version,
                stored_version,
                "Rejecting stale upload"
            );
            return Err(RemoteError::StaleVersion {
                base_version: upload.base_version,
                stored: Box::new(stored),
            });
        }

        let progress = CanvasProgress {
            actions: upload.actions,
            version: stored_version + 1,
            last_updated: Utc::now(),
            canvas_width: upload.canvas_width,
            canvas_height: upload.canvas_height,
            preview_url: upload.preview_url,
        };
        records.insert(key.to_string(), progress.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(progress)
    }

    async fn delete(&self, key: &ProgressKey) -> RemoteResult<()> {
        self.check_online()?;
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key.to_string());
        Ok(())
    }
}

/// Blob store keeping bytes in memory and handing out `memory://` URLs.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, (Vec<u8>, String)>>,
}

impl MemoryBlobStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored bytes and content type at `path`.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<(Vec<u8>, String)> {
        self.blobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> RemoteResult<String> {
        self.blobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_string(), (bytes, content_type.to_string()));
        Ok(format!("memory://{path}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crayon_core::{CanvasAction, Color};

    fn key() -> ProgressKey {
        ProgressKey::new("u1", "dino")
    }

    #[tokio::test]
    async fn test_versions_count_uploads() {
        let server = InMemoryProgressServer::new();
        let mut version = 0;
        for i in 0..5 {
            let actions = vec![CanvasAction::fill(1.0, 1.0, Color::rgb(i, 0, 0))];
            let stored = server
                .save(&key(), ProgressUpload::new(actions, version))
                .await
                .expect("accepted");
            version = stored.version;
        }
        assert_eq!(version, 5);
        assert_eq!(server.save_count(), 5);
    }

    #[tokio::test]
    async fn test_stale_upload_rejected() {
        let server = InMemoryProgressServer::new();
        server
            .save(&key(), ProgressUpload::new(Vec::new(), 0))
            .await
            .expect("v1");
        server
            .save(&key(), ProgressUpload::new(Vec::new(), 1))
            .await
            .expect("v2");

        let err = server
            .save(&key(), ProgressUpload::new(Vec::new(), 1))
            .await
            .expect_err("stale");
        match err {
            RemoteError::StaleVersion {
                base_version,
                stored,
            } => {
                assert_eq!(base_version, 1);
                assert_eq!(stored.version, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(server.get(&key()).map(|p| p.version), Some(2));
    }

    #[tokio::test]
    async fn test_fetch_missing_is_none() {
        let server = InMemoryProgressServer::new();
        assert!(server.fetch(&key()).await.expect("fetch").is_none());
    }

    #[tokio::test]
    async fn test_offline_fails_every_call() {
        let server = InMemoryProgressServer::new();
        server.set_offline(true);
        let err = server.fetch(&key()).await.expect_err("offline");
        assert!(err.is_offline());
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_blob_put() {
        let store = MemoryBlobStore::new();
        let url = store
            .put("previews/u1/dino.png", vec![1, 2], "image/png")
            .await
            .expect("put");
        assert_eq!(url, "memory://previews/u1/dino.png");
        assert_eq!(
            store.get("previews/u1/dino.png"),
            Some((vec![1, 2], "image/png".to_string()))
        );
    }
}
