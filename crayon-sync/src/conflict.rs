//! Version conflicts and how to settle them.
//!
//! A conflict exists when the local log has unsynced work and the server
//! has moved past the version the local log was built on. Nothing is
//! merged silently; the caller (or a session-wide policy) decides.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crayon_core::{CanvasAction, CanvasProgress, ProgressKey};
use serde::{Deserialize, Serialize};

/// Both sides of a conflict.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionConflict {
    /// Progress the conflict is about.
    pub key: ProgressKey,
    /// Server version the local log was built on.
    pub local_version: u64,
    /// The local log, including unsynced actions.
    pub local_actions: Vec<CanvasAction>,
    /// The server's record as fetched, preview and dimensions included.
    pub remote: CanvasProgress,
}

impl VersionConflict {
    /// Pair the local log with the server record that overtook it.
    #[must_use]
    pub fn new(
        key: ProgressKey,
        local_version: u64,
        local_actions: Vec<CanvasAction>,
        remote: CanvasProgress,
    ) -> Self {
        Self {
            key,
            local_version,
            local_actions,
            remote,
        }
    }

    /// Current server version.
    #[must_use]
    pub const fn remote_version(&self) -> u64 {
        self.remote.version
    }

    /// The server's log.
    #[must_use]
    pub fn remote_actions(&self) -> &[CanvasAction] {
        &self.remote.actions
    }
}

/// Which way a conflict was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictStrategy {
    /// The local log replaced the server's.
    KeepLocal,
    /// The server's log replaced the local one.
    KeepRemote,
    /// A caller-supplied combination was uploaded.
    Merge,
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeepLocal => write!(f, "keep-local"),
            Self::KeepRemote => write!(f, "keep-remote"),
            Self::Merge => write!(f, "merge"),
        }
    }
}

/// A caller's decision for one conflict.
#[derive(Debug, Clone, PartialEq)]
pub enum ConflictResolution {
    /// Upload the local log on top of the server version.
    KeepLocal,
    /// Discard local work and adopt the server log.
    KeepRemote,
    /// Upload this action list on top of the server version.
    Merged(Vec<CanvasAction>),
}

impl ConflictResolution {
    /// Strategy this resolution applies.
    #[must_use]
    pub const fn strategy(&self) -> ConflictStrategy {
        match self {
            Self::KeepLocal => ConflictStrategy::KeepLocal,
            Self::KeepRemote => ConflictStrategy::KeepRemote,
            Self::Merged(_) => ConflictStrategy::Merge,
        }
    }
}

/// Session-wide handling of conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Surface every conflict to the caller.
    #[default]
    Manual,
    /// Always keep the local log.
    Local,
    /// Always adopt the server log.
    Remote,
}

impl ConflictPolicy {
    /// Resolution to apply without asking, if any.
    #[must_use]
    pub const fn auto_resolution(self) -> Option<ConflictResolution> {
        match self {
            Self::Manual => None,
            Self::Local => Some(ConflictResolution::KeepLocal),
            Self::Remote => Some(ConflictResolution::KeepRemote),
        }
    }
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manual" => Ok(Self::Manual),
            "local" => Ok(Self::Local),
            "remote" => Ok(Self::Remote),
            other => Err(format!("unknown conflict policy: {other}")),
        }
    }
}

/// Combine two logs into one, ordered by timestamp.
///
/// Actions present on both sides (same id) appear once. Ties keep remote
/// actions before local ones, so the result is deterministic.
#[must_use]
pub fn merge_by_timestamp(local: &[CanvasAction], remote: &[CanvasAction]) -> Vec<CanvasAction> {
    let mut seen = HashSet::new();
    let mut merged: Vec<CanvasAction> = remote
        .iter()
        .chain(local)
        .filter(|a| seen.insert(a.id().clone()))
        .cloned()
        .collect();
    merged.sort_by_key(CanvasAction::timestamp);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crayon_core::{ActionId, Color};

    fn fill_at(id: &str, ts: u64) -> CanvasAction {
        CanvasAction::fill(1.0, 1.0, Color::rgb(1, 2, 3))
            .with_id(ActionId::from_string(id))
            .with_timestamp(ts)
    }

    #[test]
    fn test_merge_interleaves_and_dedupes() {
        let shared = fill_at("shared", 10);
        let local = vec![shared.clone(), fill_at("l1", 30), fill_at("l2", 50)];
        let remote = vec![shared, fill_at("r1", 20), fill_at("r2", 40)];

        let merged = merge_by_timestamp(&local, &remote);
        let ids: Vec<&str> = merged.iter().map(|a| a.id().as_str()).collect();
        assert_eq!(ids, vec!["shared", "r1", "l1", "r2", "l2"]);
    }

    #[test]
    fn test_merge_tie_prefers_remote_first() {
        let merged = merge_by_timestamp(&[fill_at("l", 5)], &[fill_at("r", 5)]);
        assert_eq!(merged[0].id().as_str(), "r");
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("manual".parse::<ConflictPolicy>(), Ok(ConflictPolicy::Manual));
        assert_eq!(" Local ".parse::<ConflictPolicy>(), Ok(ConflictPolicy::Local));
        assert_eq!("remote".parse::<ConflictPolicy>(), Ok(ConflictPolicy::Remote));
        assert!("merge".parse::<ConflictPolicy>().is_err());
    }

    #[test]
    fn test_policy_auto_resolution() {
        assert_eq!(ConflictPolicy::Manual.auto_resolution(), None);
        assert_eq!(
            ConflictPolicy::Remote
                .auto_resolution()
                .map(|r| r.strategy()),
            Some(ConflictStrategy::KeepRemote)
        );
    }
}
