//! Canvas actions - the discrete user edits recorded in the action log.
//!
//! On the wire an action is `{ "id", "type", "timestamp", "data" }` where the
//! shape of `data` depends on `type`. In memory the payload is a sum type so
//! a fill can never carry a brush and a stroke can never carry a seed.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

use crate::{CanvasError, Color};

/// Current time in milliseconds since the Unix epoch.
#[must_use]
#[allow(clippy::cast_possible_truncation)] // Timestamps won't exceed u64 for billions of years
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Opaque action identifier.
///
/// An empty identifier means "not assigned yet"; the action log assigns one
/// on append.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(String);

impl ActionId {
    /// Create a new unique action ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap an existing identifier.
    #[must_use]
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The unassigned placeholder.
    #[must_use]
    pub const fn unassigned() -> Self {
        Self(String::new())
    }

    /// Whether an identifier has been assigned.
    #[must_use]
    pub fn is_assigned(&self) -> bool {
        !self.0.is_empty()
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The type tag of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    /// A freehand brush stroke.
    Stroke,
    /// A flood fill from a single seed.
    Fill,
    /// A placed sticker.
    Sticker,
    /// An eraser stroke.
    Erase,
    /// Several seeded fills applied as one action.
    MagicFill,
}

impl ActionKind {
    /// Wire name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stroke => "stroke",
            Self::Fill => "fill",
            Self::Sticker => "sticker",
            Self::Erase => "erase",
            Self::MagicFill => "magic-fill",
        }
    }

    /// Whether actions of this kind are replayed by the fill compositor.
    #[must_use]
    pub const fn is_fill(self) -> bool {
        matches!(self, Self::Fill | Self::MagicFill)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = CanvasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stroke" => Ok(Self::Stroke),
            "fill" => Ok(Self::Fill),
            "sticker" => Ok(Self::Sticker),
            "erase" => Ok(Self::Erase),
            "magic-fill" => Ok(Self::MagicFill),
            other => Err(CanvasError::InvalidAction(format!(
                "unknown action type: {other}"
            ))),
        }
    }
}

/// A point in canvas coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// X position (pixels from left).
    pub x: f64,
    /// Y position (pixels from top).
    pub y: f64,
}

/// Brush used to draw a stroke or erase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrushDescriptor {
    /// Brush style name (crayon, marker, glitter, ...). Opaque to the core.
    pub kind: String,
    /// Brush diameter in canvas pixels.
    pub size: f64,
    /// Opacity from 0.0 to 1.0.
    #[serde(default = "BrushDescriptor::default_opacity")]
    pub opacity: f64,
}

impl BrushDescriptor {
    const fn default_opacity() -> f64 {
        1.0
    }
}

/// Payload of a `stroke` action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrokeData {
    /// Path geometry.
    pub path: Vec<Point>,
    /// Stroke color.
    pub color: Color,
    /// Brush descriptor.
    pub brush: BrushDescriptor,
}

/// Payload of an `erase` action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EraseData {
    /// Path geometry; prior strokes under it are occluded.
    pub path: Vec<Point>,
    /// Eraser brush.
    pub brush: BrushDescriptor,
}

/// Payload of a `fill` action, also one entry of a `magic-fill`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FillData {
    /// Seed X in canvas coordinates.
    pub x: f64,
    /// Seed Y in canvas coordinates.
    pub y: f64,
    /// Fill color.
    pub color: Color,
}

impl FillData {
    /// Create a fill seed.
    #[must_use]
    pub const fn new(x: f64, y: f64, color: Color) -> Self {
        Self { x, y, color }
    }

    /// Integer pixel the seed lands on, or `None` when negative or not finite.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn seed_pixel(&self) -> Option<(u32, u32)> {
        if !self.x.is_finite() || !self.y.is_finite() || self.x < 0.0 || self.y < 0.0 {
            return None;
        }
        Some((self.x.floor() as u32, self.y.floor() as u32))
    }
}

/// Placement transform of a sticker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StickerTransform {
    /// Center X in canvas coordinates.
    pub x: f64,
    /// Center Y in canvas coordinates.
    pub y: f64,
    /// Uniform scale factor.
    #[serde(default = "StickerTransform::default_scale")]
    pub scale: f64,
    /// Rotation in radians.
    #[serde(default)]
    pub rotation: f64,
}

impl StickerTransform {
    const fn default_scale() -> f64 {
        1.0
    }
}

/// Payload of a `sticker` action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StickerData {
    /// Sticker catalog identifier.
    pub sticker_id: String,
    /// Placement on the canvas.
    pub transform: StickerTransform,
}

/// Payload of a `magic-fill` action: many seeded fills applied in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MagicFillData {
    /// Seeds in application order.
    pub fills: Vec<FillData>,
}

/// Typed action payload, keyed by action kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionData {
    /// Brush stroke.
    Stroke(StrokeData),
    /// Single flood fill.
    Fill(FillData),
    /// Sticker placement.
    Sticker(StickerData),
    /// Eraser stroke.
    Erase(EraseData),
    /// Batch of flood fills.
    MagicFill(MagicFillData),
}

impl ActionData {
    /// The kind tag matching this payload.
    #[must_use]
    pub const fn kind(&self) -> ActionKind {
        match self {
            Self::Stroke(_) => ActionKind::Stroke,
            Self::Fill(_) => ActionKind::Fill,
            Self::Sticker(_) => ActionKind::Sticker,
            Self::Erase(_) => ActionKind::Erase,
            Self::MagicFill(_) => ActionKind::MagicFill,
        }
    }

    /// Fill seeds carried by this payload, in application order.
    ///
    /// Empty for strokes, erases and stickers.
    #[must_use]
    pub fn fill_seeds(&self) -> &[FillData] {
        match self {
            Self::Fill(fill) => std::slice::from_ref(fill),
            Self::MagicFill(magic) => &magic.fills,
            Self::Stroke(_) | Self::Sticker(_) | Self::Erase(_) => &[],
        }
    }
}

/// A single immutable entry of the action log.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "ActionRecord")]
pub struct CanvasAction {
    id: ActionId,
    timestamp: u64,
    data: ActionData,
}

impl CanvasAction {
    /// Create an action with a fresh id and the current time.
    #[must_use]
    pub fn new(data: ActionData) -> Self {
        Self {
            id: ActionId::new(),
            timestamp: now_ms(),
            data,
        }
    }

    /// Create an action whose id and timestamp are assigned on append.
    #[must_use]
    pub const fn draft(data: ActionData) -> Self {
        Self {
            id: ActionId::unassigned(),
            timestamp: 0,
            data,
        }
    }

    /// Set an explicit id.
    #[must_use]
    pub fn with_id(mut self, id: ActionId) -> Self {
        self.id = id;
        self
    }

    /// Set an explicit timestamp (ms since epoch).
    #[must_use]
    pub const fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Shorthand for a single fill action.
    #[must_use]
    pub fn fill(x: f64, y: f64, color: Color) -> Self {
        Self::new(ActionData::Fill(FillData::new(x, y, color)))
    }

    /// Shorthand for a magic-fill action.
    #[must_use]
    pub fn magic_fill(fills: Vec<FillData>) -> Self {
        Self::new(ActionData::MagicFill(MagicFillData { fills }))
    }

    /// Action identifier.
    #[must_use]
    pub fn id(&self) -> &ActionId {
        &self.id
    }

    /// Creation time (ms since epoch).
    #[must_use]
    pub const fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Kind tag.
    #[must_use]
    pub const fn kind(&self) -> ActionKind {
        self.data.kind()
    }

    /// Typed payload.
    #[must_use]
    pub const fn data(&self) -> &ActionData {
        &self.data
    }

    /// Fill seeds, empty for non-fill actions.
    #[must_use]
    pub fn fill_seeds(&self) -> &[FillData] {
        self.data.fill_seeds()
    }

    pub(crate) fn assign_missing(&mut self) {
        if !self.id.is_assigned() {
            self.id = ActionId::new();
        }
        if self.timestamp == 0 {
            self.timestamp = now_ms();
        }
    }
}

impl Serialize for CanvasAction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("CanvasAction", 4)?;
        state.serialize_field("id", &self.id)?;
        state.serialize_field("type", &self.kind())?;
        state.serialize_field("timestamp", &self.timestamp)?;
        match &self.data {
            ActionData::Stroke(d) => state.serialize_field("data", d)?,
            ActionData::Fill(d) => state.serialize_field("data", d)?,
            ActionData::Sticker(d) => state.serialize_field("data", d)?,
            ActionData::Erase(d) => state.serialize_field("data", d)?,
            ActionData::MagicFill(d) => state.serialize_field("data", d)?,
        }
        state.end()
    }
}

/// Wire form of an action before its payload is checked against its type.
#[derive(Debug, Deserialize)]
struct ActionRecord {
    #[serde(default)]
    id: Option<ActionId>,
    #[serde(rename = "type")]
    kind: ActionKind,
    #[serde(default)]
    timestamp: Option<u64>,
    data: serde_json::Value,
}

impl TryFrom<ActionRecord> for CanvasAction {
    type Error = CanvasError;

    fn try_from(record: ActionRecord) -> Result<Self, Self::Error> {
        let mismatch =
            |e: serde_json::Error| CanvasError::InvalidAction(format!("{} data: {e}", record.kind));

        let data = match record.kind {
            ActionKind::Stroke => {
                ActionData::Stroke(serde_json::from_value(record.data).map_err(mismatch)?)
            }
            ActionKind::Fill => {
                ActionData::Fill(serde_json::from_value(record.data).map_err(mismatch)?)
            }
            ActionKind::Sticker => {
                ActionData::Sticker(serde_json::from_value(record.data).map_err(mismatch)?)
            }
            ActionKind::Erase => {
                ActionData::Erase(serde_json::from_value(record.data).map_err(mismatch)?)
            }
            ActionKind::MagicFill => ActionData::MagicFill(
                serde_json::from_value(record.data).map_err(mismatch)?,
            ),
        };

        Ok(Self {
            id: record.id.unwrap_or_else(ActionId::unassigned),
            timestamp: record.timestamp.unwrap_or(0),
            data,
        })
    }
}
