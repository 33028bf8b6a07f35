//! Renderer error types.

use thiserror::Error;

/// Result type for raster operations.
pub type RenderResult<T> = Result<T, RenderError>;

/// Result type for a single flood fill.
pub type FillResult<T> = Result<T, FillError>;

/// Result type for a fill-layer rebuild.
pub type CompositeResult<T> = Result<T, CompositeError>;

/// Errors that can occur producing or encoding raster data.
#[derive(Debug, Error)]
pub enum RenderError {
    /// A buffer or surface could not be allocated at the requested size.
    #[error("Failed to allocate {width}x{height} surface")]
    Allocation {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },

    /// Raw pixel data does not match the declared dimensions.
    #[error("Pixel data has {actual} bytes, expected {expected}")]
    BufferSize {
        /// Bytes required by the dimensions.
        expected: usize,
        /// Bytes supplied.
        actual: usize,
    },

    /// Encoded image could not be decoded.
    #[error("Failed to decode image: {0}")]
    Decode(String),

    /// SVG artwork could not be parsed or rendered.
    #[error("SVG rasterization failed: {0}")]
    Svg(String),

    /// Image encoding failed.
    #[error("Failed to encode image: {0}")]
    Encode(String),

    /// The artwork kind is not supported by this build.
    #[error("Unsupported artwork: {0}")]
    Unsupported(String),

    /// A blocking worker panicked or was cancelled.
    #[error("Raster worker failed: {0}")]
    Worker(String),
}

/// Errors that can occur in a single flood fill.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FillError {
    /// The seed lies outside the buffer.
    #[error("Seed ({x}, {y}) outside {width}x{height} buffer")]
    SeedOutOfBounds {
        /// Seed X.
        x: u32,
        /// Seed Y.
        y: u32,
        /// Buffer width.
        width: u32,
        /// Buffer height.
        height: u32,
    },

    /// The seed coordinates are negative or not finite.
    #[error("Invalid seed coordinates ({x}, {y})")]
    InvalidSeed {
        /// Seed X as recorded.
        x: f64,
        /// Seed Y as recorded.
        y: f64,
    },
}

/// Errors that abort a whole fill-layer rebuild.
#[derive(Debug, Error)]
pub enum CompositeError {
    /// Raster dimensions are not finite, not positive or too large.
    #[error("Invalid raster dimensions {width}x{height}")]
    InvalidDimensions {
        /// Requested width.
        width: f64,
        /// Requested height.
        height: f64,
    },

    /// The artwork could not be rasterized.
    #[error("Rasterization failed: {0}")]
    Raster(#[from] RenderError),
}
