//! Error types for canvas model operations.

use thiserror::Error;

use crate::state::SyncStatus;

/// Result type for canvas model operations.
pub type CanvasResult<T> = Result<T, CanvasError>;

/// Errors that can occur in canvas model operations.
#[derive(Debug, Error)]
pub enum CanvasError {
    /// A color string could not be parsed.
    #[error("Invalid color: {0}")]
    InvalidColor(String),

    /// An action record does not match its declared type.
    #[error("Invalid action: {0}")]
    InvalidAction(String),

    /// Progress serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The sync state machine refused a transition.
    #[error("Invalid sync transition from {from} to {to}")]
    InvalidTransition {
        /// State the machine was in.
        from: SyncStatus,
        /// State that was requested.
        to: SyncStatus,
    },
}
