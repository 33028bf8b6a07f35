//! Sync error types.

use crayon_core::{CanvasError, CanvasProgress};
use crayon_renderer::RenderError;
use thiserror::Error;

use crate::conflict::VersionConflict;

/// Result type for remote calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Result type for the offline cache.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for session operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors reported by a [`crate::ProgressRemote`] or [`crate::BlobStore`].
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The server could not be reached.
    #[error("Server unreachable: {0}")]
    Offline(String),

    /// The upload was based on an older version than the server holds.
    #[error("Upload based on version {base_version}, server has {}", stored.version)]
    StaleVersion {
        /// Version the upload claimed to build on.
        base_version: u64,
        /// Record currently stored on the server.
        stored: Box<CanvasProgress>,
    },

    /// The server answered with an unexpected status.
    #[error("Server returned HTTP {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// The server's response could not be understood.
    #[error("Invalid server response: {0}")]
    InvalidResponse(String),

    /// The configured endpoint is not a usable URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl RemoteError {
    /// Whether the failure was a network outage rather than a server answer.
    #[must_use]
    pub const fn is_offline(&self) -> bool {
        matches!(self, Self::Offline(_))
    }

    /// Whether retrying the same request later may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Offline(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::StaleVersion { .. } | Self::InvalidResponse(_) | Self::InvalidUrl(_) => false,
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::InvalidResponse(e.to_string())
        } else if let Some(status) = e.status() {
            Self::Status {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            Self::Offline(e.to_string())
        }
    }
}

/// Errors from the on-disk offline cache.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A cached record could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors surfaced by a [`crate::CanvasSession`].
#[derive(Debug, Error)]
pub enum SyncError {
    /// Local and remote logs both changed; the caller must pick a resolution.
    #[error(
        "Version conflict: local v{} has unsynced work, server is at v{}",
        .0.local_version,
        .0.remote.version
    )]
    Conflict(Box<VersionConflict>),

    /// [`crate::CanvasSession::resolve`] was called with no conflict pending.
    #[error("No conflict to resolve")]
    NoConflict,

    /// A remote call failed.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The offline cache failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A sync state transition was rejected.
    #[error(transparent)]
    State(#[from] CanvasError),

    /// The preview thumbnail could not be rendered.
    #[error("Preview failed: {0}")]
    Preview(#[from] RenderError),
}

impl SyncError {
    /// Whether a retry with backoff is worthwhile.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Remote(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// The conflict, if this is one.
    #[must_use]
    pub fn conflict(&self) -> Option<&VersionConflict> {
        match self {
            Self::Conflict(c) => Some(c),
            _ => None,
        }
    }
}
