//! On-disk offline cache of progress.
//!
//! Each key is stored as one JSON file in a data directory, holding the
//! local log, the server version it was built on and how many changes are
//! still unsynced. This is what lets a session survive a restart while
//! offline.

use std::path::{Path, PathBuf};

use crayon_core::{CanvasProgress, ProgressKey};
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;

/// One cached entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedProgress {
    /// Local log; `version` is the last server version observed.
    pub progress: CanvasProgress,
    /// Local changes the server has not acknowledged.
    pub pending_changes: usize,
}

/// JSON-file cache rooted at a data directory.
#[derive(Debug, Clone)]
pub struct LocalProgressCache {
    data_dir: PathBuf,
}

impl LocalProgressCache {
    /// Open a cache in `data_dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub async fn open(data_dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let data_dir = data_dir.into();
        tokio::fs::create_dir_all(&data_dir).await?;
        Ok(Self { data_dir })
    }

    /// Directory holding the cache files.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn path_for(&self, key: &ProgressKey) -> PathBuf {
        self.data_dir.join(format!("{}.json", key.file_stem()))
    }

    /// Write the entry for `key`, replacing any previous one.
    ///
    /// Writes to a temporary file first so a crash never leaves a torn file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub async fn save(&self, key: &ProgressKey, entry: &CachedProgress) -> StoreResult<()> {
        let json = serde_json::to_vec_pretty(entry)?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        tracing::trace!(key = %key, path = %path.display(), "Cached progress");
        Ok(())
    }

    /// Read the entry for `key`; `None` if nothing is cached.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load(&self, key: &ProgressKey) -> StoreResult<Option<CachedProgress>> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete the entry for `key`. Missing entries are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub async fn remove(&self, key: &ProgressKey) -> StoreResult<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// File stems of every cached entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub async fn entries(&self) -> StoreResult<Vec<String>> {
        let mut stems = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.data_dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    stems.push(stem.to_string());
                }
            }
        }
        stems.sort();
        Ok(stems)
    }
}
