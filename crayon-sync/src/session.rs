//! Canvas session: the client side of the sync protocol.
//!
//! A session owns the local action log for one [`ProgressKey`] and keeps it
//! in step with a [`ProgressRemote`]. Every save uploads the whole log
//! together with the server version it was built on; the server bumps the
//! version by one per accepted save. When both sides moved on, the session
//! stops and reports a [`VersionConflict`] instead of merging behind the
//! user's back.
//!
//! Syncs for one session never overlap. A sync that was overtaken by a
//! newer request while waiting for its turn returns
//! [`SyncOutcome::Superseded`] without touching the network.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use crayon_core::{
    ActionId, ActionLog, CanvasAction, CanvasProgress, GenerationGuard, PreviewImage,
    ProgressKey, SyncState,
};
use crayon_renderer::{render_preview, PixelBuffer, PreviewCache, PreviewConfig};

use crate::cache::{CachedProgress, LocalProgressCache};
use crate::conflict::{ConflictPolicy, ConflictResolution, ConflictStrategy, VersionConflict};
use crate::error::{RemoteError, RemoteResult, SyncError, SyncResult};
use crate::remote::{preview_path, BlobStore, ProgressRemote, ProgressUpload};
use crate::retry::RetryConfig;

/// Default period between autosave checks.
pub const DEFAULT_AUTOSAVE_SECS: u64 = 30;

/// Session settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How conflicts are handled.
    pub conflict_policy: ConflictPolicy,
    /// Period between autosave checks.
    pub autosave_interval: Duration,
    /// Directory for the offline cache; no cache when `None`.
    pub data_dir: Option<PathBuf>,
    /// Backoff for [`CanvasSession::sync_with_retry`].
    pub retry: RetryConfig,
    /// Preview thumbnail settings.
    pub preview: PreviewConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            conflict_policy: ConflictPolicy::default(),
            autosave_interval: Duration::from_secs(DEFAULT_AUTOSAVE_SECS),
            data_dir: None,
            retry: RetryConfig::default(),
            preview: PreviewConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Create a config from environment variables.
    ///
    /// Reads `CRAYON_CONFLICT_POLICY` (`manual`, `local` or `remote`),
    /// `CRAYON_AUTOSAVE_SECS`, `CRAYON_DATA_DIR` and `CRAYON_PREVIEW_EDGE`.
    #[must_use]
    pub fn from_env() -> Self {
        let conflict_policy = std::env::var("CRAYON_CONFLICT_POLICY")
            .ok()
            .and_then(|v| {
                v.parse::<ConflictPolicy>()
                    .map_err(|e| tracing::warn!("Ignoring CRAYON_CONFLICT_POLICY: {e}"))
                    .ok()
            })
            .unwrap_or_default();
        let autosave_secs = std::env::var("CRAYON_AUTOSAVE_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|secs: &u64| *secs > 0)
            .unwrap_or(DEFAULT_AUTOSAVE_SECS);
        let data_dir = std::env::var_os("CRAYON_DATA_DIR").map(PathBuf::from);

        Self {
            conflict_policy,
            autosave_interval: Duration::from_secs(autosave_secs),
            data_dir,
            retry: RetryConfig::default(),
            preview: PreviewConfig::from_env(),
        }
    }

    /// Set the conflict policy.
    #[must_use]
    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    /// Set the retry backoff.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set the offline cache directory.
    #[must_use]
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(data_dir.into());
        self
    }
}

/// Result of a sync or conflict resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The local log was uploaded and stored at `version`.
    Saved {
        /// Version assigned by the server.
        version: u64,
    },
    /// The server had newer work and no local changes were pending; the
    /// server log was adopted.
    Updated {
        /// Adopted server version.
        version: u64,
    },
    /// Nothing to do.
    UpToDate {
        /// Current server version.
        version: u64,
    },
    /// A conflict was settled.
    Resolved {
        /// How it was settled.
        strategy: ConflictStrategy,
        /// Server version afterwards.
        version: u64,
    },
    /// A newer sync request took over.
    Superseded,
}

impl SyncOutcome {
    /// Server version after this outcome, unless superseded.
    #[must_use]
    pub const fn version(&self) -> Option<u64> {
        match self {
            Self::Saved { version }
            | Self::Updated { version }
            | Self::UpToDate { version }
            | Self::Resolved { version, .. } => Some(*version),
            Self::Superseded => None,
        }
    }
}

/// How a session's starting log was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Nothing stored anywhere.
    Fresh,
    /// The server record was adopted.
    Remote {
        /// Adopted version.
        version: u64,
    },
    /// The offline cache was kept.
    Local {
        /// Server version the cached log builds on.
        version: u64,
        /// Unsynced changes carried over.
        pending: usize,
    },
    /// The server was unreachable; the offline cache (if any) was used.
    Offline {
        /// Server version the cached log builds on.
        version: u64,
        /// Unsynced changes carried over.
        pending: usize,
    },
    /// Both sides had changed and the conflict policy settled it.
    Resolved {
        /// How it was settled.
        strategy: ConflictStrategy,
        /// Server version afterwards.
        version: u64,
    },
}

#[derive(Debug, Default)]
struct SessionState {
    log: ActionLog,
    sync: SyncState,
    base_version: u64,
    dimensions: Option<(u32, u32)>,
    preview_url: Option<String>,
    conflict: Option<VersionConflict>,
}

impl SessionState {
    fn install(&mut self, progress: CanvasProgress, pending: usize) {
        self.base_version = progress.version;
        self.dimensions = progress.dimensions().or(self.dimensions);
        self.preview_url = progress.preview_url;
        self.log.replace_all(progress.actions);
        self.sync.set_pending(pending);
    }

    fn snapshot(&self) -> CanvasProgress {
        CanvasProgress {
            actions: self.log.actions().to_vec(),
            version: self.base_version,
            last_updated: Utc::now(),
            canvas_width: self.dimensions.map(|(w, _)| w),
            canvas_height: self.dimensions.map(|(_, h)| h),
            preview_url: self.preview_url.clone(),
        }
    }
}

/// One user's editing session on one coloring image.
pub struct CanvasSession {
    key: ProgressKey,
    remote: Arc<dyn ProgressRemote>,
    blobs: Option<Arc<dyn BlobStore>>,
    cache: Option<LocalProgressCache>,
    config: SessionConfig,
    state: Mutex<SessionState>,
    previews: Mutex<PreviewCache>,
    sync_lock: tokio::sync::Mutex<()>,
    persist_lock: tokio::sync::Mutex<()>,
    generations: GenerationGuard,
}

impl std::fmt::Debug for CanvasSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CanvasSession")
            .field("key", &self.key)
            .field("config", &self.config)
            .field("has_blob_store", &self.blobs.is_some())
            .field("has_cache", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}

impl CanvasSession {
    /// Create a session without an offline cache or blob store.
    #[must_use]
    pub fn new(key: ProgressKey, remote: Arc<dyn ProgressRemote>, config: SessionConfig) -> Self {
        Self {
            key,
            remote,
            blobs: None,
            cache: None,
            config,
            state: Mutex::new(SessionState::default()),
            previews: Mutex::new(PreviewCache::new()),
            sync_lock: tokio::sync::Mutex::new(()),
            persist_lock: tokio::sync::Mutex::new(()),
            generations: GenerationGuard::new(),
        }
    }

    /// Create a session, opening the offline cache when `config.data_dir`
    /// is set. Call [`Self::load`] next.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directory cannot be created.
    pub async fn open(
        key: ProgressKey,
        remote: Arc<dyn ProgressRemote>,
        config: SessionConfig,
    ) -> SyncResult<Self> {
        let cache = match &config.data_dir {
            Some(dir) => Some(LocalProgressCache::open(dir.clone()).await?),
            None => None,
        };
        let mut session = Self::new(key, remote, config);
        session.cache = cache;
        Ok(session)
    }

    /// Upload previews to `blobs` instead of embedding them as data URIs.
    #[must_use]
    pub fn with_blob_store(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    /// Use an already opened offline cache.
    #[must_use]
    pub fn with_cache(mut self, cache: LocalProgressCache) -> Self {
        self.cache = Some(cache);
        self
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Key this session syncs.
    #[must_use]
    pub const fn key(&self) -> &ProgressKey {
        &self.key
    }

    /// Session settings.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Copy of the current log.
    #[must_use]
    pub fn log(&self) -> ActionLog {
        self.lock_state().log.clone()
    }

    /// Applied actions, oldest first.
    #[must_use]
    pub fn actions(&self) -> Vec<CanvasAction> {
        self.lock_state().log.actions().to_vec()
    }

    /// Current sync state.
    #[must_use]
    pub fn sync_state(&self) -> SyncState {
        self.lock_state().sync.clone()
    }

    /// Last server version observed.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.lock_state().base_version
    }

    /// URL of the last uploaded preview.
    #[must_use]
    pub fn preview_url(&self) -> Option<String> {
        self.lock_state().preview_url.clone()
    }

    /// The unresolved conflict, if any.
    #[must_use]
    pub fn pending_conflict(&self) -> Option<VersionConflict> {
        self.lock_state().conflict.clone()
    }

    /// Set the canvas size sent with uploads.
    pub fn set_dimensions(&self, width: u32, height: u32) {
        self.lock_state().dimensions = Some((width, height));
    }

    // -----------------------------------------------------------------------
    // Editing
    // -----------------------------------------------------------------------

    /// Append an action and mark it unsynced.
    pub async fn record(&self, action: CanvasAction) -> ActionId {
        let id = {
            let mut state = self.lock_state();
            let id = state.log.append(action).id().clone();
            state.sync.record_change();
            id
        };
        tracing::debug!(key = %self.key, action = %id, "Recorded action");
        self.persist().await;
        id
    }

    /// Undo the newest action.
    pub async fn undo(&self) -> Option<CanvasAction> {
        let undone = {
            let mut state = self.lock_state();
            let undone = state.log.undo().cloned();
            if undone.is_some() {
                state.sync.record_change();
            }
            undone
        };
        if undone.is_some() {
            self.persist().await;
        }
        undone
    }

    /// Redo the most recently undone action.
    pub async fn redo(&self) -> Option<CanvasAction> {
        let redone = {
            let mut state = self.lock_state();
            let redone = state.log.redo().cloned();
            if redone.is_some() {
                state.sync.record_change();
            }
            redone
        };
        if redone.is_some() {
            self.persist().await;
        }
        redone
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    /// Choose the starting log from the offline cache and the server.
    ///
    /// - nothing anywhere: fresh
    /// - cache with pending work, server unchanged: keep local
    /// - cache with pending work, server moved on: conflict
    /// - otherwise the newer of cache and server wins
    ///
    /// When the server is unreachable the cache is used as is.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Conflict`] under the manual policy when both
    /// sides changed, or a remote error other than being offline.
    pub async fn load(&self) -> SyncResult<LoadOutcome> {
        let _turn = self.sync_lock.lock().await;

        let cached = match &self.cache {
            Some(cache) => cache.load(&self.key).await.unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable cache for {}: {e}", self.key);
                None
            }),
            None => None,
        };

        self.lock_state().sync.begin_sync()?;
        let remote = match self.remote.fetch(&self.key).await {
            Ok(remote) => remote,
            Err(e) if e.is_offline() => {
                let (version, pending) = {
                    let mut state = self.lock_state();
                    if let Some(cached) = cached {
                        state.install(cached.progress, cached.pending_changes);
                    }
                    (state.base_version, state.sync.pending_changes())
                };
                tracing::info!(key = %self.key, version, pending, "Server unreachable, using offline cache");
                drop(self.fail(e));
                return Ok(LoadOutcome::Offline { version, pending });
            }
            Err(e) => return Err(self.fail(e)),
        };

        let local_pending = cached.as_ref().map_or(0, |c| c.pending_changes);
        let local_version = cached.as_ref().map_or(0, |c| c.progress.version);

        let outcome = match (cached, remote) {
            (Some(cached), Some(remote)) if local_pending > 0 && remote.version > local_version => {
                let conflict = VersionConflict::new(
                    self.key.clone(),
                    local_version,
                    cached.progress.actions.clone(),
                    remote,
                );
                self.lock_state()
                    .install(cached.progress, cached.pending_changes);
                return match self.on_conflict(conflict, None).await? {
                    SyncOutcome::Resolved { strategy, version } => {
                        Ok(LoadOutcome::Resolved { strategy, version })
                    }
                    other => Ok(LoadOutcome::Remote {
                        version: other.version().unwrap_or(0),
                    }),
                };
            }
            (Some(cached), _) if local_pending > 0 => {
                self.lock_state()
                    .install(cached.progress, cached.pending_changes);
                LoadOutcome::Local {
                    version: local_version,
                    pending: local_pending,
                }
            }
            (_, Some(remote)) if remote.version >= local_version => {
                let version = remote.version;
                self.lock_state().install(remote, 0);
                LoadOutcome::Remote { version }
            }
            (Some(cached), _) => {
                self.lock_state().install(cached.progress, 0);
                LoadOutcome::Local {
                    version: local_version,
                    pending: 0,
                }
            }
            (None, _) => LoadOutcome::Fresh,
        };

        self.lock_state().sync.complete_sync(0, Utc::now())?;
        tracing::info!(key = %self.key, ?outcome, "Session loaded");
        self.persist().await;
        Ok(outcome)
    }

    // -----------------------------------------------------------------------
    // Syncing
    // -----------------------------------------------------------------------

    /// Upload the local log if it has unsynced changes.
    ///
    /// A `preview` is stored in the blob store first (or embedded as a data
    /// URI without one) and its URL saved with the record.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Conflict`] when the server moved on while local
    /// work was pending (unless the conflict policy settles it), or a remote
    /// error. The local log is never lost.
    pub async fn sync(&self, preview: Option<PreviewImage>) -> SyncResult<SyncOutcome> {
        let generation = self.generations.next();
        let _turn = self.sync_lock.lock().await;
        if !self.generations.is_current(generation) {
            tracing::debug!(key = %self.key, "Sync superseded while waiting");
            return Ok(SyncOutcome::Superseded);
        }

        let (actions, base_version, pending, dimensions) = {
            let mut state = self.lock_state();
            if let Some(conflict) = &state.conflict {
                return Err(SyncError::Conflict(Box::new(conflict.clone())));
            }
            if !state.sync.is_dirty() && !state.sync.needs_retry() && preview.is_none() {
                return Ok(SyncOutcome::UpToDate {
                    version: state.base_version,
                });
            }
            state.sync.begin_sync()?;
            (
                state.log.actions().to_vec(),
                state.base_version,
                state.sync.pending_changes(),
                state.dimensions,
            )
        };
        tracing::info!(key = %self.key, base_version, pending, "Syncing progress");

        let remote = match self.remote.fetch(&self.key).await {
            Ok(remote) => remote,
            Err(e) => return Err(self.fail(e)),
        };

        if let Some(remote) = remote.filter(|r| r.version > base_version) {
            if pending == 0 {
                let version = remote.version;
                {
                    let mut state = self.lock_state();
                    state.install(remote, 0);
                    state.sync.complete_sync(0, Utc::now())?;
                }
                tracing::info!(key = %self.key, version, "Adopted newer server progress");
                self.persist().await;
                return Ok(SyncOutcome::Updated { version });
            }
            let conflict = VersionConflict::new(self.key.clone(), base_version, actions, remote);
            return self.on_conflict(conflict, preview).await;
        }

        if pending == 0 && preview.is_none() {
            self.lock_state().sync.complete_sync(0, Utc::now())?;
            return Ok(SyncOutcome::UpToDate {
                version: base_version,
            });
        }

        match self.upload(actions, base_version, dimensions, preview).await {
            Ok(stored) => {
                let version = stored.version;
                self.finish_upload(&stored, pending)?;
                tracing::info!(key = %self.key, version, "Progress saved");
                self.persist().await;
                Ok(SyncOutcome::Saved { version })
            }
            Err(RemoteError::StaleVersion { stored, .. }) => {
                let local_actions = self.actions();
                let conflict =
                    VersionConflict::new(self.key.clone(), base_version, local_actions, *stored);
                self.on_conflict(conflict, None).await
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Render a preview of `snapshot` and sync with it.
    ///
    /// # Errors
    ///
    /// Same as [`Self::sync`], plus [`SyncError::Preview`] if rendering fails.
    pub async fn sync_snapshot(&self, snapshot: &PixelBuffer) -> SyncResult<SyncOutcome> {
        let preview = self.preview_for(snapshot)?;
        self.sync(Some(preview)).await
    }

    /// [`Self::sync`] with exponential backoff on transient failures.
    ///
    /// # Errors
    ///
    /// Returns the last error once retries are exhausted, or the first
    /// non-retryable error.
    pub async fn sync_with_retry(&self, preview: Option<PreviewImage>) -> SyncResult<SyncOutcome> {
        let retry = &self.config.retry;
        let mut attempt = 0u32;
        loop {
            match self.sync(preview.clone()).await {
                Err(e) if e.is_retryable() && attempt < retry.max_retries => {
                    let delay = retry.delay_for_attempt(attempt);
                    attempt += 1;
                    tracing::warn!(
                        key = %self.key,
                        attempt,
                        delay_ms = %delay.as_millis(),
                        error = %e,
                        "Sync failed, retrying after backoff"
                    );
                    tokio::time::sleep(delay).await;
                }
                result => return result,
            }
        }
    }

    /// Settle the pending conflict.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NoConflict`] if nothing is pending, or a remote
    /// error (the conflict stays pending so the call can be repeated).
    pub async fn resolve(&self, resolution: ConflictResolution) -> SyncResult<SyncOutcome> {
        let _turn = self.sync_lock.lock().await;
        let conflict = {
            let mut state = self.lock_state();
            let conflict = state.conflict.clone().ok_or(SyncError::NoConflict)?;
            state.sync.begin_sync()?;
            conflict
        };
        self.apply_resolution(conflict, resolution, None).await
    }

    /// Throw away all progress: local log, offline cache and server record.
    ///
    /// The local side is cleared first, so it is empty even if the server
    /// cannot be reached.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache entry or server record cannot be deleted.
    pub async fn start_over(&self) -> SyncResult<()> {
        let _turn = self.sync_lock.lock().await;
        {
            let mut state = self.lock_state();
            state.log.clear();
            state.base_version = 0;
            state.preview_url = None;
            state.conflict = None;
            state.sync.reset_pending();
        }
        self.previews
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .invalidate(&self.key.image_id);

        if let Some(cache) = &self.cache {
            cache.remove(&self.key).await?;
        }
        self.remote.delete(&self.key).await?;
        tracing::info!(key = %self.key, "Started over");
        Ok(())
    }

    /// End the session: flush the offline cache and drop cached previews.
    pub async fn close(&self) {
        self.persist().await;
        self.previews
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Thumbnail of `snapshot`, reused while the log is unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if the thumbnail cannot be rendered.
    pub fn preview_for(&self, snapshot: &PixelBuffer) -> SyncResult<PreviewImage> {
        let fingerprint = self.lock_state().log.fingerprint();
        let preview = self
            .previews
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_render(&self.key.image_id, fingerprint, || {
                render_preview(snapshot, &self.config.preview)
            })?;
        Ok(preview)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Record a failed attempt and convert the error.
    fn fail(&self, error: RemoteError) -> SyncError {
        let offline = error.is_offline();
        {
            let mut state = self.lock_state();
            if let Err(e) = state.sync.fail_sync(error.to_string(), offline) {
                tracing::warn!("Sync state out of step for {}: {e}", self.key);
            }
        }
        if offline {
            tracing::info!(key = %self.key, error = %error, "Server unreachable, keeping local progress");
        } else {
            tracing::warn!(key = %self.key, error = %error, "Sync failed");
        }
        SyncError::Remote(error)
    }

    /// Apply the conflict policy, or park the conflict for the caller.
    async fn on_conflict(
        &self,
        conflict: VersionConflict,
        preview: Option<PreviewImage>,
    ) -> SyncResult<SyncOutcome> {
        tracing::warn!(
            key = %self.key,
            local_version = conflict.local_version,
            remote_version = conflict.remote_version(),
            "Version conflict"
        );
        if let Some(resolution) = self.config.conflict_policy.auto_resolution() {
            tracing::info!(key = %self.key, strategy = %resolution.strategy(), "Resolving conflict by policy");
            return self.apply_resolution(conflict, resolution, preview).await;
        }

        {
            let mut state = self.lock_state();
            state.conflict = Some(conflict.clone());
            state.sync.fail_sync("version conflict", false)?;
        }
        self.persist().await;
        Err(SyncError::Conflict(Box::new(conflict)))
    }

    /// Carry out a resolution. The sync state must be `syncing`.
    async fn apply_resolution(
        &self,
        conflict: VersionConflict,
        resolution: ConflictResolution,
        preview: Option<PreviewImage>,
    ) -> SyncResult<SyncOutcome> {
        let strategy = resolution.strategy();

        let (actions, pending, dimensions) = match resolution {
            ConflictResolution::KeepRemote => {
                let version = conflict.remote_version();
                {
                    let mut state = self.lock_state();
                    state.install(conflict.remote, 0);
                    state.conflict = None;
                    state.sync.complete_sync(0, Utc::now())?;
                }
                tracing::info!(key = %self.key, version, "Conflict resolved, kept server progress");
                self.persist().await;
                return Ok(SyncOutcome::Resolved { strategy, version });
            }
            ConflictResolution::KeepLocal => {
                let state = self.lock_state();
                (
                    state.log.actions().to_vec(),
                    state.sync.pending_changes(),
                    state.dimensions,
                )
            }
            ConflictResolution::Merged(actions) => {
                let mut state = self.lock_state();
                state.log.replace_all(actions);
                (
                    state.log.actions().to_vec(),
                    state.sync.pending_changes(),
                    state.dimensions,
                )
            }
        };

        match self
            .upload(actions, conflict.remote_version(), dimensions, preview)
            .await
        {
            Ok(stored) => {
                let version = stored.version;
                self.lock_state().conflict = None;
                self.finish_upload(&stored, pending)?;
                tracing::info!(key = %self.key, %strategy, version, "Conflict resolved");
                self.persist().await;
                Ok(SyncOutcome::Resolved { strategy, version })
            }
            Err(RemoteError::StaleVersion { stored, .. }) => {
                // The server moved again while resolving
                let next = VersionConflict::new(
                    self.key.clone(),
                    conflict.local_version,
                    self.actions(),
                    *stored,
                );
                {
                    let mut state = self.lock_state();
                    state.conflict = Some(next.clone());
                    state.sync.fail_sync("version conflict", false)?;
                }
                Err(SyncError::Conflict(Box::new(next)))
            }
            Err(e) => {
                self.lock_state().conflict = Some(conflict);
                Err(self.fail(e))
            }
        }
    }

    /// Store the preview (if any) and upload the log.
    async fn upload(
        &self,
        actions: Vec<CanvasAction>,
        base_version: u64,
        dimensions: Option<(u32, u32)>,
        preview: Option<PreviewImage>,
    ) -> RemoteResult<CanvasProgress> {
        let mut preview_url = self.preview_url();
        if let Some(preview) = preview {
            match &self.blobs {
                Some(blobs) => {
                    let path = preview_path(&self.key, preview.extension());
                    match blobs.put(&path, preview.bytes, &preview.content_type).await {
                        Ok(url) => preview_url = Some(url),
                        Err(e) => tracing::warn!(
                            key = %self.key,
                            error = %e,
                            "Preview upload failed, saving without a new preview"
                        ),
                    }
                }
                None => preview_url = Some(preview.to_data_uri()),
            }
        }

        let upload = ProgressUpload::new(actions, base_version)
            .with_dimensions(dimensions)
            .with_preview_url(preview_url);
        self.remote.save(&self.key, upload).await
    }

    fn finish_upload(&self, stored: &CanvasProgress, acknowledged: usize) -> SyncResult<()> {
        let mut state = self.lock_state();
        state.base_version = stored.version;
        state.preview_url.clone_from(&stored.preview_url);
        state.sync.complete_sync(acknowledged, stored.last_updated)?;
        Ok(())
    }

    /// Write the current state to the offline cache, if there is one.
    async fn persist(&self) {
        let Some(cache) = &self.cache else {
            return;
        };
        let _write = self.persist_lock.lock().await;
        let entry = {
            let state = self.lock_state();
            CachedProgress {
                progress: state.snapshot(),
                pending_changes: state.sync.pending_changes(),
            }
        };
        if let Err(e) = cache.save(&self.key, &entry).await {
            tracing::warn!("Failed to cache progress for {}: {e}", self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryProgressServer;
    use crayon_core::{Color, SyncStatus};

    fn session() -> (Arc<InMemoryProgressServer>, CanvasSession) {
        let server = Arc::new(InMemoryProgressServer::new());
        let session = CanvasSession::new(
            ProgressKey::new("u1", "dino"),
            server.clone(),
            SessionConfig::default(),
        );
        (server, session)
    }

    #[tokio::test]
    async fn test_record_marks_pending() {
        let (_, session) = session();
        session
            .record(CanvasAction::fill(1.0, 1.0, Color::rgb(1, 1, 1)))
            .await;
        session.undo().await.expect("undo");
        assert_eq!(session.sync_state().pending_changes(), 2);
        assert!(session.actions().is_empty());
        assert!(session.undo().await.is_none());
        assert_eq!(session.sync_state().pending_changes(), 2);
    }

    #[tokio::test]
    async fn test_clean_sync_is_up_to_date() {
        let (server, session) = session();
        let outcome = session.sync(None).await.expect("sync");
        assert_eq!(outcome, SyncOutcome::UpToDate { version: 0 });
        assert_eq!(server.save_count(), 0);
    }

    #[tokio::test]
    async fn test_sync_saves_and_acknowledges() {
        let (server, session) = session();
        session.set_dimensions(800, 600);
        session
            .record(CanvasAction::fill(1.0, 1.0, Color::rgb(1, 1, 1)))
            .await;

        let outcome = session.sync(None).await.expect("sync");
        assert_eq!(outcome, SyncOutcome::Saved { version: 1 });
        assert_eq!(session.sync_state().status(), SyncStatus::Synced);
        assert_eq!(session.sync_state().pending_changes(), 0);

        let stored = server.get(session.key()).expect("stored");
        assert_eq!(stored.dimensions(), Some((800, 600)));
        assert_eq!(stored.actions, session.actions());
    }

    #[tokio::test]
    async fn test_preview_without_blob_store_is_data_uri() {
        let (server, session) = session();
        let preview = PreviewImage::png(vec![1, 2, 3], 1, 1);
        session.sync(Some(preview)).await.expect("sync");

        let stored = server.get(session.key()).expect("stored");
        assert_eq!(
            stored.preview_url.as_deref(),
            Some("data:image/png;base64,AQID")
        );
    }

    #[tokio::test]
    async fn test_offline_sync_keeps_log() {
        let (server, session) = session();
        session
            .record(CanvasAction::fill(1.0, 1.0, Color::rgb(1, 1, 1)))
            .await;
        server.set_offline(true);

        let err = session.sync(None).await.expect_err("offline");
        assert!(err.is_retryable());
        assert_eq!(session.sync_state().status(), SyncStatus::Offline);
        assert_eq!(session.actions().len(), 1);
        assert_eq!(session.sync_state().pending_changes(), 1);

        server.set_offline(false);
        let outcome = session.sync(None).await.expect("back online");
        assert_eq!(outcome.version(), Some(1));
    }

    #[tokio::test]
    async fn test_resolve_without_conflict() {
        let (_, session) = session();
        assert!(matches!(
            session.resolve(ConflictResolution::KeepLocal).await,
            Err(SyncError::NoConflict)
        ));
    }

    #[test]
    fn test_outcome_version() {
        assert_eq!(SyncOutcome::Superseded.version(), None);
        assert_eq!(
            SyncOutcome::Resolved {
                strategy: ConflictStrategy::KeepLocal,
                version: 6
            }
            .version(),
            Some(6)
        );
    }
}
