//! # Crayon Canvas Renderer
//!
//! Raster side of the coloring canvas: pixel buffers, the flood fill that
//! colors regions bounded by line art, and the fill layer compositor that
//! replays the fill history over freshly rasterized artwork.
//!
//! ## Pipeline
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ RasterSource │──▶│ Flatten onto │──▶│ Replay fills │──▶│  Composite   │
//! │ (SVG / PNG)  │   │    white     │   │ (log order)  │   │ (gen guard)  │
//! └──────────────┘   └──────────────┘   └──────────────┘   └──────────────┘
//!                                                                 │
//!                                                          ┌──────▼───────┐
//!                                                          │   Preview    │
//!                                                          │  thumbnail   │
//!                                                          └──────────────┘
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod compositor;
pub mod error;
pub mod flood_fill;
pub mod pixels;
pub mod preview;
pub mod source;

pub use compositor::{
    replay_fills, validate_dimensions, Composite, CompositeReport, FillLayerCompositor,
    SkippedFill, MAX_DIMENSION,
};
pub use error::{
    CompositeError, CompositeResult, FillError, FillResult, RenderError, RenderResult,
};
pub use flood_fill::{
    apply_seed, filled_copy, flood_fill, FillOutcome, FillStats, FloodFillConfig, PixelRect,
    SkipReason,
};
pub use pixels::PixelBuffer;
pub use preview::{
    decode_preview, render_preview, PreviewCache, PreviewCacheStats, PreviewConfig,
};
pub use source::{rasterize_blocking, rasterize_svg, Artwork, ArtworkRasterizer, RasterSource};
