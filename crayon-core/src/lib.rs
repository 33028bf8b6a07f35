//! # Crayon Canvas Core
//!
//! Data model for the coloring canvas: the ordered log of user actions,
//! the persisted progress record and the process-local sync state.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                crayon-core                  │
//! ├─────────────────────────────────────────────┤
//! │  Action Log        │  Canvas Progress       │
//! │  - Stroke / Erase  │  - Versioned record    │
//! │  - Fill / Magic    │  - Preview URL         │
//! │  - Sticker         │  - Progress key        │
//! │  - Undo / Redo     │                        │
//! ├─────────────────────────────────────────────┤
//! │  Sync State        │  Generation Guard      │
//! │  - Status machine  │  - Stale result check  │
//! │  - Pending changes │                        │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Rasterization and flood fill live in `crayon-renderer`, the network
//! protocol in `crayon-sync`.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod action;
pub mod color;
pub mod error;
pub mod generation;
pub mod log;
pub mod preview;
pub mod progress;
pub mod state;

pub use action::{
    now_ms, ActionData, ActionId, ActionKind, BrushDescriptor, CanvasAction, EraseData, FillData,
    MagicFillData, Point, StickerData, StickerTransform, StrokeData,
};
pub use color::Color;
pub use error::{CanvasError, CanvasResult};
pub use generation::{Generation, GenerationGuard};
pub use log::{ActionLog, ActionsOfType, FillActions};
pub use preview::PreviewImage;
pub use progress::{CanvasProgress, ProgressKey};
pub use state::{SyncState, SyncStatus};

/// Canvas core version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
