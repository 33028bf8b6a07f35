//! Region-growing flood fill over rendered line art.
//!
//! A fill spreads 4-connected from the seed through every pixel whose color
//! is within `tolerance` of the seed's original color, stopping at walls.
//! Walls are the artwork's lines: pixels that are near-black or close to
//! fully transparent. Walls are never repainted.
//!
//! The traversal uses an explicit work stack and a visited bitmap, so very
//! large regions cannot overflow the call stack.

use crayon_core::{Color, FillData};

use crate::error::{FillError, FillResult};
use crate::pixels::PixelBuffer;

/// Default per-channel tolerance when matching the seed color.
pub const DEFAULT_TOLERANCE: u8 = 48;

/// Default brightness at or below which an opaque pixel counts as line art.
pub const DEFAULT_WALL_LUMA: u8 = 50;

/// Default alpha below which a pixel counts as a transparent wall.
pub const DEFAULT_WALL_ALPHA: u8 = 32;

/// Tuning for wall detection and color matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloodFillConfig {
    /// Maximum per-channel difference from the seed color.
    pub tolerance: u8,
    /// A pixel with every RGB channel at or below this is a wall.
    pub wall_luma: u8,
    /// A pixel with alpha below this is a wall.
    pub wall_alpha: u8,
}

impl Default for FloodFillConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            wall_luma: DEFAULT_WALL_LUMA,
            wall_alpha: DEFAULT_WALL_ALPHA,
        }
    }
}

impl FloodFillConfig {
    /// Create a config from environment variables.
    ///
    /// Reads `CRAYON_FILL_TOLERANCE`, `CRAYON_WALL_LUMA` and
    /// `CRAYON_WALL_ALPHA`, falling back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        fn var(name: &str, default: u8) -> u8 {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        }
        Self {
            tolerance: var("CRAYON_FILL_TOLERANCE", DEFAULT_TOLERANCE),
            wall_luma: var("CRAYON_WALL_LUMA", DEFAULT_WALL_LUMA),
            wall_alpha: var("CRAYON_WALL_ALPHA", DEFAULT_WALL_ALPHA),
        }
    }

    /// Set the match tolerance.
    #[must_use]
    pub const fn with_tolerance(mut self, tolerance: u8) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Whether `color` stops propagation.
    #[must_use]
    pub const fn is_wall(&self, color: Color) -> bool {
        color.a < self.wall_alpha
            || (color.r <= self.wall_luma && color.g <= self.wall_luma && color.b <= self.wall_luma)
    }

    /// Whether `candidate` belongs to the same region as `seed`.
    #[must_use]
    pub fn matches(&self, seed: Color, candidate: Color) -> bool {
        seed.max_channel_distance(candidate) <= self.tolerance
    }
}

/// Axis-aligned pixel rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    /// Left edge.
    pub x: u32,
    /// Top edge.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// What a completed fill touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillStats {
    /// Number of pixels repainted.
    pub painted: usize,
    /// Bounding box of the repainted pixels.
    pub bounds: PixelRect,
}

/// Why a fill left the buffer untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The seed landed on line art.
    SeedIsWall,
    /// The seed pixel already has the fill color.
    AlreadyFilled,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SeedIsWall => write!(f, "seed is on a wall"),
            Self::AlreadyFilled => write!(f, "seed already has the fill color"),
        }
    }
}

/// Result of a fill that was not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillOutcome {
    /// The region was repainted.
    Filled(FillStats),
    /// Nothing was painted.
    Skipped(SkipReason),
}

impl FillOutcome {
    /// Pixels painted, zero when skipped.
    #[must_use]
    pub const fn painted(&self) -> usize {
        match self {
            Self::Filled(stats) => stats.painted,
            Self::Skipped(_) => 0,
        }
    }
}

/// Running bounding box while a region grows.
struct Bounds {
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
}

impl Bounds {
    const fn at(x: u32, y: u32) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
        }
    }

    fn include(&mut self, x: u32, y: u32) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    const fn rect(&self) -> PixelRect {
        PixelRect {
            x: self.min_x,
            y: self.min_y,
            width: self.max_x - self.min_x + 1,
            height: self.max_y - self.min_y + 1,
        }
    }
}

/// Fill the region containing `(x, y)` with `color`, in place.
///
/// # Errors
///
/// Returns [`FillError::SeedOutOfBounds`] if the seed is outside the
/// buffer; the buffer is left unchanged.
pub fn flood_fill(
    buffer: &mut PixelBuffer,
    x: u32,
    y: u32,
    color: Color,
    config: &FloodFillConfig,
) -> FillResult<FillOutcome> {
    let width = buffer.width();
    let height = buffer.height();
    let Some(seed_color) = buffer.get(x, y) else {
        return Err(FillError::SeedOutOfBounds {
            x,
            y,
            width,
            height,
        });
    };

    if config.is_wall(seed_color) {
        return Ok(FillOutcome::Skipped(SkipReason::SeedIsWall));
    }
    if seed_color == color {
        return Ok(FillOutcome::Skipped(SkipReason::AlreadyFilled));
    }

    let mut visited = vec![false; width as usize * height as usize];
    let mut stack = vec![(x, y)];
    visited[buffer.index(x, y)] = true;

    let mut painted = 0usize;
    let mut bounds = Bounds::at(x, y);

    while let Some((cx, cy)) = stack.pop() {
        buffer.set(cx, cy, color);
        painted += 1;
        bounds.include(cx, cy);

        let neighbors = [
            (cx.wrapping_sub(1), cy),
            (cx + 1, cy),
            (cx, cy.wrapping_sub(1)),
            (cx, cy + 1),
        ];
        for (nx, ny) in neighbors {
            if !buffer.contains(nx, ny) {
                continue;
            }
            let idx = buffer.index(nx, ny);
            if visited[idx] {
                continue;
            }
            visited[idx] = true;
            // Unvisited pixels have not been repainted yet
            let Some(candidate) = buffer.get(nx, ny) else {
                continue;
            };
            if !config.is_wall(candidate) && config.matches(seed_color, candidate) {
                stack.push((nx, ny));
            }
        }
    }

    Ok(FillOutcome::Filled(FillStats {
        painted,
        bounds: bounds.rect(),
    }))
}

/// Apply one recorded fill seed.
///
/// # Errors
///
/// Returns [`FillError::InvalidSeed`] for negative or non-finite
/// coordinates, or [`FillError::SeedOutOfBounds`].
pub fn apply_seed(
    buffer: &mut PixelBuffer,
    seed: &FillData,
    config: &FloodFillConfig,
) -> FillResult<FillOutcome> {
    let (x, y) = seed.seed_pixel().ok_or(FillError::InvalidSeed {
        x: seed.x,
        y: seed.y,
    })?;
    flood_fill(buffer, x, y, seed.color, config)
}

/// Fill a copy of `buffer`, leaving the input untouched.
///
/// # Errors
///
/// Same as [`flood_fill`].
pub fn filled_copy(
    buffer: &PixelBuffer,
    x: u32,
    y: u32,
    color: Color,
    config: &FloodFillConfig,
) -> FillResult<(PixelBuffer, FillOutcome)> {
    let mut copy = buffer.clone();
    let outcome = flood_fill(&mut copy, x, y, color, config)?;
    Ok((copy, outcome))
}
