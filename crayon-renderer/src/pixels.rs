//! CPU-readable RGBA pixel buffers.
//!
//! A [`PixelBuffer`] is owned by whichever stage is computing on it and is
//! moved (never shared mutably) between the rasterizer, the flood fill and
//! the compositor.

use crayon_core::Color;
use image::{ImageEncoder, RgbaImage};

use crate::error::{RenderError, RenderResult};

/// Row-major RGBA8 pixels (4 bytes per pixel, straight alpha).
#[derive(Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl std::fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Bytes needed for `width` x `height` RGBA pixels, `None` on overflow or zero size.
fn byte_len(width: u32, height: u32) -> Option<usize> {
    if width == 0 || height == 0 {
        return None;
    }
    usize::try_from(width)
        .ok()?
        .checked_mul(usize::try_from(height).ok()?)?
        .checked_mul(4)
}

impl PixelBuffer {
    /// Create a buffer filled with one color.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Allocation`] for zero or overflowing dimensions.
    pub fn filled(width: u32, height: u32, color: Color) -> RenderResult<Self> {
        let len = byte_len(width, height).ok_or(RenderError::Allocation { width, height })?;
        let rgba = color.to_array();
        let data = rgba.iter().copied().cycle().take(len).collect();
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Create a fully transparent buffer.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Allocation`] for zero or overflowing dimensions.
    pub fn transparent(width: u32, height: u32) -> RenderResult<Self> {
        Self::filled(width, height, Color::TRANSPARENT)
    }

    /// Wrap raw RGBA bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the byte count does not match the dimensions.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> RenderResult<Self> {
        let expected = byte_len(width, height).ok_or(RenderError::Allocation { width, height })?;
        if data.len() != expected {
            return Err(RenderError::BufferSize {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Take ownership of a decoded image.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty image.
    pub fn from_image(image: RgbaImage) -> RenderResult<Self> {
        let (width, height) = image.dimensions();
        Self::from_raw(width, height, image.into_raw())
    }

    /// Decode PNG/JPEG/WebP bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes cannot be decoded.
    pub fn decode(bytes: &[u8]) -> RenderResult<Self> {
        let img = image::load_from_memory(bytes)
            .map_err(|e| RenderError::Decode(e.to_string()))?;
        Self::from_image(img.to_rgba8())
    }

    /// Convert into an `image` crate buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the internal invariant on length is broken.
    pub fn into_image(self) -> RenderResult<RgbaImage> {
        let expected = self.data.len();
        RgbaImage::from_raw(self.width, self.height, self.data).ok_or(RenderError::BufferSize {
            expected,
            actual: expected,
        })
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Raw RGBA bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consume the buffer, returning raw RGBA bytes.
    #[must_use]
    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    /// Whether `(x, y)` lies inside the buffer.
    #[must_use]
    pub const fn contains(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height
    }

    /// Byte offset of pixel `(x, y)`. Caller checks bounds.
    pub(crate) fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }

    /// Pixel index (not byte offset) of `(x, y)`. Caller checks bounds.
    pub(crate) fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Read one pixel.
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> Option<Color> {
        if !self.contains(x, y) {
            return None;
        }
        let o = self.offset(x, y);
        Some(Color::rgba(
            self.data[o],
            self.data[o + 1],
            self.data[o + 2],
            self.data[o + 3],
        ))
    }

    /// Write one pixel. Returns `false` when out of bounds.
    pub fn set(&mut self, x: u32, y: u32, color: Color) -> bool {
        if !self.contains(x, y) {
            return false;
        }
        let o = self.offset(x, y);
        self.data[o..o + 4].copy_from_slice(&color.to_array());
        true
    }

    /// Number of pixels exactly equal to `color`.
    #[must_use]
    pub fn count_color(&self, color: Color) -> usize {
        let target = color.to_array();
        self.data.chunks_exact(4).filter(|px| *px == target).count()
    }

    /// Composite every pixel over an opaque background, leaving no transparency.
    ///
    /// Transparent regions become `background`; this is how the base raster
    /// gets its white paper before any fill runs.
    pub fn flatten_onto(&mut self, background: Color) {
        let bg = background.to_array();
        for px in self.data.chunks_exact_mut(4) {
            let alpha = u32::from(px[3]);
            if alpha == 255 {
                continue;
            }
            let inv = 255 - alpha;
            for c in 0..3 {
                let blended = (u32::from(px[c]) * alpha + u32::from(bg[c]) * inv + 127) / 255;
                #[allow(clippy::cast_possible_truncation)]
                {
                    px[c] = blended as u8;
                }
            }
            px[3] = 255;
        }
    }

    /// Resample to new dimensions.
    ///
    /// Returns the buffer unchanged when the size already matches.
    ///
    /// # Errors
    ///
    /// Returns an error for zero target dimensions.
    pub fn resized(self, width: u32, height: u32) -> RenderResult<Self> {
        if width == self.width && height == self.height {
            return Ok(self);
        }
        byte_len(width, height).ok_or(RenderError::Allocation { width, height })?;
        let img = self.into_image()?;
        let resized =
            image::imageops::resize(&img, width, height, image::imageops::FilterType::Triangle);
        Self::from_image(resized)
    }

    /// Encode as PNG.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn encode_png(&self) -> RenderResult<Vec<u8>> {
        let mut buf = std::io::Cursor::new(Vec::new());
        image::codecs::png::PngEncoder::new(&mut buf)
            .write_image(
                &self.data,
                self.width,
                self.height,
                image::ExtendedColorType::Rgba8,
            )
            .map_err(|e| RenderError::Encode(format!("PNG encoding failed: {e}")))?;
        Ok(buf.into_inner())
    }
}
