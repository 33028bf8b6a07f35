//! # Crayon Canvas Sync
//!
//! Keeps a coloring session's action log in step with the server-side
//! Canvas Progress record.
//!
//! ## Flow
//!
//! ```text
//! ┌──────────────┐  record   ┌──────────────┐  sync   ┌──────────────────┐
//! │  Action log  │──────────▶│ CanvasSession│────────▶│  ProgressRemote  │
//! │ (undo/redo)  │           │ (serialized) │◀────────│ (versioned save) │
//! └──────────────┘           └──────┬───────┘  fetch  └──────────────────┘
//!                                   │
//!                     ┌─────────────┼─────────────┐
//!                     ▼             ▼             ▼
//!              ┌────────────┐ ┌───────────┐ ┌────────────┐
//!              │  Offline   │ │ BlobStore │ │  Autosave  │
//!              │   cache    │ │ (preview) │ │   task     │
//!              └────────────┘ └───────────┘ └────────────┘
//! ```
//!
//! Every accepted upload bumps the server version by one. An upload built
//! on an older version is rejected, and when the local log also has
//! unsynced work the session reports a [`VersionConflict`] for the caller
//! to settle with a [`ConflictResolution`].

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod autosave;
pub mod cache;
pub mod conflict;
pub mod error;
pub mod http;
pub mod memory;
pub mod remote;
pub mod retry;
pub mod session;

pub use autosave::{spawn_autosave, AutosaveHandle};
pub use cache::{CachedProgress, LocalProgressCache};
pub use conflict::{
    merge_by_timestamp, ConflictPolicy, ConflictResolution, ConflictStrategy, VersionConflict,
};
pub use error::{RemoteError, RemoteResult, StoreError, StoreResult, SyncError, SyncResult};
pub use http::{HttpBlobStore, HttpProgressRemote, DEFAULT_TIMEOUT};
pub use memory::{InMemoryProgressServer, MemoryBlobStore};
pub use remote::{preview_path, BlobStore, ProgressRemote, ProgressUpload};
pub use retry::RetryConfig;
pub use session::{
    CanvasSession, LoadOutcome, SessionConfig, SyncOutcome, DEFAULT_AUTOSAVE_SECS,
};
