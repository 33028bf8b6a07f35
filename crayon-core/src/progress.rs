//! Canvas Progress - the persisted, versioned unit of synchronization.

use std::fmt;

use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

use crate::{ActionLog, CanvasAction, CanvasError, CanvasResult};

/// Identity a progress record is stored under.
///
/// Supplied by the auth/session collaborator; the core never authenticates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressKey {
    /// Account owning the progress.
    pub user_id: String,
    /// Child profile within the account, if profiles are in use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<String>,
    /// Coloring image the progress belongs to.
    pub image_id: String,
}

impl ProgressKey {
    /// Create a key without a profile.
    #[must_use]
    pub fn new(user_id: impl Into<String>, image_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            profile_id: None,
            image_id: image_id.into(),
        }
    }

    /// Scope the key to a profile.
    #[must_use]
    pub fn with_profile(mut self, profile_id: impl Into<String>) -> Self {
        self.profile_id = Some(profile_id.into());
        self
    }

    /// Raw ids identifying this key: `[user, image]` or `[user, profile, image]`.
    ///
    /// Callers building URLs must percent-encode each segment.
    #[must_use]
    pub fn path_segments(&self) -> Vec<&str> {
        let mut segments = vec![self.user_id.as_str()];
        if let Some(profile) = &self.profile_id {
            segments.push(profile.as_str());
        }
        segments.push(self.image_id.as_str());
        segments
    }

    /// Single flat name for this key, safe as a file name.
    ///
    /// Each segment is percent-encoded so only `[A-Za-z0-9_-]` and `%XX`
    /// remain, then joined with `.`. Distinct keys never share a stem.
    #[must_use]
    pub fn file_stem(&self) -> String {
        self.path_segments()
            .into_iter()
            .map(|segment| utf8_percent_encode(segment, STEM_SEGMENT).to_string())
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl fmt::Display for ProgressKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.profile_id {
            Some(profile) => write!(f, "{}/{}/{}", self.user_id, profile, self.image_id),
            None => write!(f, "{}/{}", self.user_id, self.image_id),
        }
    }
}

/// Everything but alphanumerics, `-` and `_` is escaped in file stems.
const STEM_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_');

/// The persisted progress of one user on one coloring image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasProgress {
    /// Ordered action log.
    pub actions: Vec<CanvasAction>,
    /// Server version; bumped by exactly one per accepted upload.
    pub version: u64,
    /// Time of the last accepted change.
    pub last_updated: DateTime<Utc>,
    /// Canvas width the actions were recorded at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canvas_width: Option<u32>,
    /// Canvas height the actions were recorded at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canvas_height: Option<u32>,
    /// URL of the last rendered thumbnail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
}

impl CanvasProgress {
    /// An empty record at version 0.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            actions: Vec::new(),
            version: 0,
            last_updated: Utc::now(),
            canvas_width: None,
            canvas_height: None,
            preview_url: None,
        }
    }

    /// Snapshot a log at the given version.
    #[must_use]
    pub fn from_log(log: &ActionLog, version: u64) -> Self {
        Self {
            actions: log.actions().to_vec(),
            version,
            ..Self::empty()
        }
    }

    /// Set the canvas dimensions.
    #[must_use]
    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.canvas_width = Some(width);
        self.canvas_height = Some(height);
        self
    }

    /// Canvas dimensions, when both are known.
    #[must_use]
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.canvas_width.zip(self.canvas_height)
    }

    /// Rebuild an action log from this record.
    #[must_use]
    pub fn to_log(&self) -> ActionLog {
        ActionLog::from_actions(self.actions.clone())
    }

    /// Serialize the record for transport or offline caching.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> CanvasResult<String> {
        serde_json::to_string(self).map_err(CanvasError::Serialization)
    }

    /// Deserialize a record.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or an action does not match its type.
    pub fn from_json(json: &str) -> CanvasResult<Self> {
        serde_json::from_str(json).map_err(CanvasError::Serialization)
    }
}

impl Default for CanvasProgress {
    fn default() -> Self {
        Self::empty()
    }
}
