//! Process-local sync state.
//!
//! ```text
//!            ┌──────────────┐
//!   idle ───►│   syncing    ├───► synced
//!     ▲      └──────┬───────┘
//!     │             ├───────────► error ───┐
//!     │             └───────────► offline ─┤
//!     │                                    │
//!     └──── retry (next action / timer) ◄──┘
//! ```
//!
//! Never persisted; rebuilt each session.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CanvasError, CanvasResult};

/// Where the local log stands relative to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Nothing in flight.
    #[default]
    Idle,
    /// An upload or download is in flight.
    Syncing,
    /// The server acknowledged the current log.
    Synced,
    /// The last attempt failed for a non-network reason.
    Error,
    /// The last attempt could not reach the server.
    Offline,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Error => "error",
            Self::Offline => "offline",
        };
        f.write_str(name)
    }
}

/// Sync status plus bookkeeping shown as the "saved / not saved yet" indicator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    status: SyncStatus,
    /// Local log changes (appends, undos, redos) not yet acknowledged by the server.
    pending_changes: usize,
    last_synced_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl SyncState {
    /// Fresh state for a new session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> SyncStatus {
        self.status
    }

    /// Number of unacknowledged local changes.
    #[must_use]
    pub const fn pending_changes(&self) -> usize {
        self.pending_changes
    }

    /// Time of the last successful sync.
    #[must_use]
    pub const fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.last_synced_at
    }

    /// Message of the last failure, cleared on success.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Whether there is local work the server has not seen.
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.pending_changes > 0
    }

    /// Whether a background retry should be attempted.
    #[must_use]
    pub const fn needs_retry(&self) -> bool {
        matches!(self.status, SyncStatus::Error | SyncStatus::Offline)
    }

    /// Record a local log change.
    ///
    /// A `synced` log becomes `idle` again; `error`/`offline` stay as they are
    /// so the indicator keeps showing the failure until a retry succeeds.
    pub fn record_change(&mut self) {
        self.pending_changes += 1;
        if self.status == SyncStatus::Synced {
            self.status = SyncStatus::Idle;
        }
    }

    /// Enter `syncing`.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::InvalidTransition`] if a sync is already in flight.
    pub fn begin_sync(&mut self) -> CanvasResult<()> {
        self.transition(SyncStatus::Syncing)
    }

    /// Leave `syncing` successfully.
    ///
    /// `acknowledged` is the number of pending changes covered by the upload;
    /// changes recorded while the upload was in flight stay pending.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::InvalidTransition`] unless currently syncing.
    pub fn complete_sync(&mut self, acknowledged: usize, at: DateTime<Utc>) -> CanvasResult<()> {
        self.transition(SyncStatus::Synced)?;
        self.pending_changes = self.pending_changes.saturating_sub(acknowledged);
        self.last_synced_at = Some(at);
        self.last_error = None;
        if self.pending_changes > 0 {
            self.status = SyncStatus::Idle;
        }
        Ok(())
    }

    /// Leave `syncing` with a failure; `offline` when the server was unreachable.
    ///
    /// # Errors
    ///
    /// Returns [`CanvasError::InvalidTransition`] unless currently syncing.
    pub fn fail_sync(&mut self, message: impl Into<String>, offline: bool) -> CanvasResult<()> {
        let target = if offline {
            SyncStatus::Offline
        } else {
            SyncStatus::Error
        };
        self.transition(target)?;
        self.last_error = Some(message.into());
        Ok(())
    }

    /// Forget pending changes after adopting the server's log.
    pub fn reset_pending(&mut self) {
        self.pending_changes = 0;
    }

    /// Overwrite the pending count (restoring from the offline cache).
    pub fn set_pending(&mut self, pending: usize) {
        self.pending_changes = pending;
    }

    fn transition(&mut self, to: SyncStatus) -> CanvasResult<()> {
        let allowed = match (self.status, to) {
            (SyncStatus::Syncing, SyncStatus::Syncing) => false,
            (_, SyncStatus::Syncing) => true,
            (SyncStatus::Syncing, SyncStatus::Synced | SyncStatus::Error | SyncStatus::Offline) => {
                true
            }
            _ => false,
        };

        if !allowed {
            return Err(CanvasError::InvalidTransition {
                from: self.status,
                to,
            });
        }

        tracing::trace!(from = %self.status, to = %to, "Sync state transition");
        self.status = to;
        Ok(())
    }
}
