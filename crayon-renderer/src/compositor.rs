//! Fill layer compositor.
//!
//! The fill layer is never edited incrementally. Every change to the fill
//! history triggers a full rebuild: rasterize the artwork, flatten it onto
//! white, then replay every fill in log order. Rebuilds are generation
//! guarded, so a slow rebuild that finishes after a newer request is
//! discarded rather than shown.

use std::sync::{Mutex, PoisonError};

use crayon_core::{ActionId, ActionLog, CanvasAction, Color, Generation, GenerationGuard};

use crate::error::{CompositeError, CompositeResult, FillError, RenderError};
use crate::flood_fill::{apply_seed, FillOutcome, FloodFillConfig};
use crate::pixels::PixelBuffer;
use crate::source::{Artwork, RasterSource};

/// Largest raster edge the compositor will allocate.
pub const MAX_DIMENSION: u32 = 8192;

/// A fill seed that could not be applied.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedFill {
    /// Action the seed belongs to.
    pub action_id: ActionId,
    /// Position of the seed within the action (always 0 for plain fills).
    pub seed_index: usize,
    /// Why it failed.
    pub error: FillError,
}

/// Result of a replay.
#[derive(Debug, Clone)]
pub struct CompositeReport {
    /// Artwork with every fill applied.
    pub buffer: PixelBuffer,
    /// Seeds that painted at least one pixel.
    pub applied: usize,
    /// Seeds that were no-ops (wall or same color).
    pub unchanged: usize,
    /// Seeds that failed and were skipped.
    pub skipped: Vec<SkippedFill>,
}

/// Outcome of [`FillLayerCompositor::rebuild`].
#[derive(Debug, Clone)]
pub enum Composite {
    /// The rebuilt fill layer.
    Ready(CompositeReport),
    /// No fills recorded; show the plain artwork.
    Empty,
    /// A newer rebuild was requested while this one ran.
    Superseded,
}

impl Composite {
    /// The report, when ready.
    #[must_use]
    pub const fn report(&self) -> Option<&CompositeReport> {
        match self {
            Self::Ready(report) => Some(report),
            Self::Empty | Self::Superseded => None,
        }
    }

    /// Consume into the report, when ready.
    #[must_use]
    pub fn into_report(self) -> Option<CompositeReport> {
        match self {
            Self::Ready(report) => Some(report),
            Self::Empty | Self::Superseded => None,
        }
    }
}

/// Validate and convert requested raster dimensions.
///
/// # Errors
///
/// Returns [`CompositeError::InvalidDimensions`] unless both values are
/// finite, at least one pixel and at most [`MAX_DIMENSION`].
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn validate_dimensions(width: f64, height: f64) -> CompositeResult<(u32, u32)> {
    let valid = |v: f64| v.is_finite() && v >= 1.0 && v <= f64::from(MAX_DIMENSION);
    if !valid(width) || !valid(height) {
        return Err(CompositeError::InvalidDimensions { width, height });
    }
    Ok((width.round() as u32, height.round() as u32))
}

/// Replay fills over a base raster, synchronously.
///
/// The base is flattened onto white first. Non-fill actions are ignored.
/// Seeds are applied in order; a failing seed is recorded and skipped.
#[must_use]
pub fn replay_fills<'a, I>(mut base: PixelBuffer, actions: I, config: &FloodFillConfig) -> CompositeReport
where
    I: IntoIterator<Item = &'a CanvasAction>,
{
    base.flatten_onto(Color::WHITE);

    let mut applied = 0;
    let mut unchanged = 0;
    let mut skipped = Vec::new();

    for action in actions.into_iter().filter(|a| a.kind().is_fill()) {
        for (seed_index, seed) in action.fill_seeds().iter().enumerate() {
            match apply_seed(&mut base, seed, config) {
                Ok(FillOutcome::Filled(stats)) => {
                    applied += 1;
                    tracing::debug!(
                        action = %action.id(),
                        seed_index,
                        painted = stats.painted,
                        "Applied fill"
                    );
                }
                Ok(FillOutcome::Skipped(reason)) => {
                    unchanged += 1;
                    tracing::debug!(action = %action.id(), seed_index, %reason, "Fill had no effect");
                }
                Err(error) => {
                    tracing::warn!(action = %action.id(), seed_index, %error, "Skipping fill");
                    skipped.push(SkippedFill {
                        action_id: action.id().clone(),
                        seed_index,
                        error,
                    });
                }
            }
        }
    }

    CompositeReport {
        buffer: base,
        applied,
        unchanged,
        skipped,
    }
}

/// Rebuilds the fill layer for one canvas.
pub struct FillLayerCompositor<S> {
    source: S,
    config: FloodFillConfig,
    generations: GenerationGuard,
    last_fingerprint: Mutex<Option<u64>>,
}

impl<S: RasterSource> FillLayerCompositor<S> {
    /// Create a compositor with the default fill config.
    #[must_use]
    pub fn new(source: S) -> Self {
        Self::with_config(source, FloodFillConfig::default())
    }

    /// Create a compositor with an explicit fill config.
    #[must_use]
    pub fn with_config(source: S, config: FloodFillConfig) -> Self {
        Self {
            source,
            config,
            generations: GenerationGuard::new(),
            last_fingerprint: Mutex::new(None),
        }
    }

    /// The fill config in use.
    #[must_use]
    pub const fn config(&self) -> &FloodFillConfig {
        &self.config
    }

    /// Guard shared with anyone who needs to supersede rebuilds.
    #[must_use]
    pub const fn generations(&self) -> &GenerationGuard {
        &self.generations
    }

    /// Whether the fill history differs from the last accepted rebuild.
    #[must_use]
    pub fn needs_rebuild(&self, log: &ActionLog) -> bool {
        let last = *self
            .last_fingerprint
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        last != Some(log.fill_fingerprint())
    }

    /// Rebuild from the fills currently in `log`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::rebuild`].
    pub async fn rebuild_from_log(
        &self,
        artwork: &Artwork,
        width: f64,
        height: f64,
        log: &ActionLog,
    ) -> CompositeResult<Composite> {
        let fingerprint = log.fill_fingerprint();
        let fills: Vec<CanvasAction> = log.fill_actions().cloned().collect();
        let composite = self.rebuild(artwork, width, height, fills).await?;
        if matches!(composite, Composite::Ready(_) | Composite::Empty) {
            *self
                .last_fingerprint
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(fingerprint);
        }
        Ok(composite)
    }

    /// Rebuild the fill layer from scratch.
    ///
    /// Every call supersedes earlier in-flight calls; their results come
    /// back as [`Composite::Superseded`].
    ///
    /// # Errors
    ///
    /// Returns [`CompositeError::InvalidDimensions`] for unusable sizes, or
    /// [`CompositeError::Raster`] if the artwork cannot be rasterized.
    pub async fn rebuild(
        &self,
        artwork: &Artwork,
        width: f64,
        height: f64,
        fills: Vec<CanvasAction>,
    ) -> CompositeResult<Composite> {
        let generation = self.generations.next();

        let fills: Vec<CanvasAction> = fills.into_iter().filter(|a| a.kind().is_fill()).collect();
        if fills.is_empty() {
            return Ok(self.settle(generation, Composite::Empty));
        }

        let (px_w, px_h) = validate_dimensions(width, height).inspect_err(|e| {
            tracing::error!(generation = generation.value(), error = %e, "Rejecting rebuild");
        })?;

        let base = self
            .source
            .rasterize(artwork, px_w, px_h)
            .await
            .map_err(|e| {
                tracing::error!(
                    generation = generation.value(),
                    artwork = artwork.kind(),
                    error = %e,
                    "Rasterization failed, fill layer not rebuilt"
                );
                CompositeError::Raster(e)
            })?;

        if !self.generations.is_current(generation) {
            return Ok(Composite::Superseded);
        }

        let config = self.config;
        let fill_count = fills.len();
        let report = tokio::task::spawn_blocking(move || replay_fills(base, &fills, &config))
            .await
            .map_err(|e| {
                tracing::error!(generation = generation.value(), error = %e, "Fill worker failed");
                CompositeError::Raster(RenderError::Worker(e.to_string()))
            })?;

        tracing::debug!(
            generation = generation.value(),
            fills = fill_count,
            applied = report.applied,
            skipped = report.skipped.len(),
            "Fill layer rebuilt"
        );
        Ok(self.settle(generation, Composite::Ready(report)))
    }

    fn settle(&self, generation: Generation, composite: Composite) -> Composite {
        self.generations
            .accept(generation, composite)
            .unwrap_or(Composite::Superseded)
    }
}
