//! Raster sources: turning an artwork reference into pixels.
//!
//! The compositor never decodes artwork itself. It asks a [`RasterSource`]
//! for a buffer at the target size and then flattens that buffer onto white
//! before any fill runs, so transparent paper is not mistaken for a wall.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{RenderError, RenderResult};
use crate::pixels::PixelBuffer;

/// Reference to a coloring page's line art.
#[derive(Debug, Clone)]
pub enum Artwork {
    /// SVG document text.
    Svg(Arc<str>),
    /// Encoded PNG, JPEG or WebP bytes.
    Encoded(Arc<[u8]>),
    /// Already decoded pixels.
    Raster(PixelBuffer),
}

impl Artwork {
    /// Wrap SVG text.
    #[must_use]
    pub fn svg(text: impl Into<Arc<str>>) -> Self {
        Self::Svg(text.into())
    }

    /// Wrap encoded image bytes.
    #[must_use]
    pub fn encoded(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self::Encoded(bytes.into())
    }

    /// Short label for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Svg(_) => "svg",
            Self::Encoded(_) => "encoded",
            Self::Raster(_) => "raster",
        }
    }
}

/// Produces a pixel buffer for artwork at a requested size.
///
/// Returned buffers may contain transparent pixels; callers that flood fill
/// must flatten them onto an opaque background first, because transparency
/// counts as a wall.
#[async_trait]
pub trait RasterSource: Send + Sync {
    /// Rasterize `artwork` to exactly `width` x `height` pixels.
    ///
    /// # Errors
    ///
    /// Returns an error if the artwork cannot be decoded or rendered, or the
    /// surface cannot be allocated.
    async fn rasterize(&self, artwork: &Artwork, width: u32, height: u32)
        -> RenderResult<PixelBuffer>;
}

/// Default source handling every [`Artwork`] variant.
///
/// Decoding and SVG rendering run on the blocking pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArtworkRasterizer;

impl ArtworkRasterizer {
    /// Create a rasterizer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RasterSource for ArtworkRasterizer {
    async fn rasterize(
        &self,
        artwork: &Artwork,
        width: u32,
        height: u32,
    ) -> RenderResult<PixelBuffer> {
        tracing::debug!(kind = artwork.kind(), width, height, "Rasterizing artwork");
        let artwork = artwork.clone();
        tokio::task::spawn_blocking(move || rasterize_blocking(&artwork, width, height))
            .await
            .map_err(|e| RenderError::Worker(format!("Task join error: {e}")))?
    }
}

/// Synchronous rasterization of any artwork variant.
///
/// # Errors
///
/// Returns an error if decoding or rendering fails.
pub fn rasterize_blocking(artwork: &Artwork, width: u32, height: u32) -> RenderResult<PixelBuffer> {
    match artwork {
        Artwork::Raster(buffer) => buffer.clone().resized(width, height),
        Artwork::Encoded(bytes) => PixelBuffer::decode(bytes)?.resized(width, height),
        Artwork::Svg(text) => rasterize_svg(text, width, height),
    }
}

/// Render SVG text scaled to fill `width` x `height`.
///
/// # Errors
///
/// Returns an error if the SVG cannot be parsed or the pixmap cannot be
/// allocated.
#[cfg(feature = "svg")]
#[allow(clippy::cast_precision_loss)]
pub fn rasterize_svg(svg: &str, width: u32, height: u32) -> RenderResult<PixelBuffer> {
    let opt = usvg::Options::default();
    let tree = usvg::Tree::from_str(svg, &opt)
        .map_err(|e| RenderError::Svg(format!("SVG parsing failed: {e}")))?;

    let mut pixmap =
        tiny_skia::Pixmap::new(width, height).ok_or(RenderError::Allocation { width, height })?;

    let size = tree.size();
    let transform = tiny_skia::Transform::from_scale(
        width as f32 / size.width(),
        height as f32 / size.height(),
    );
    resvg::render(&tree, transform, &mut pixmap.as_mut());

    // tiny-skia stores premultiplied alpha
    let data = pixmap
        .pixels()
        .iter()
        .flat_map(|px| {
            let c = px.demultiply();
            [c.red(), c.green(), c.blue(), c.alpha()]
        })
        .collect();
    PixelBuffer::from_raw(width, height, data)
}

/// Render SVG text scaled to fill `width` x `height`.
///
/// # Errors
///
/// Always fails: this build has no SVG support.
#[cfg(not(feature = "svg"))]
pub fn rasterize_svg(_svg: &str, _width: u32, _height: u32) -> RenderResult<PixelBuffer> {
    Err(RenderError::Unsupported(
        "SVG artwork requires the `svg` feature".to_string(),
    ))
}
