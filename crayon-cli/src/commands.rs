//! Subcommand implementations.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use anyhow::{bail, Context};
use chrono::Utc;
use crayon_core::{CanvasProgress, Color, PreviewImage, ProgressKey};
use crayon_renderer::{
    render_preview, Artwork, ArtworkRasterizer, Composite, CompositeReport, FillLayerCompositor,
    FloodFillConfig, PixelBuffer, PreviewConfig, RasterSource,
};
use crayon_sync::{HttpProgressRemote, ProgressRemote, ProgressUpload};

use crate::{RemoteArgs, RenderArgs};

/// Read and parse a progress JSON file.
pub(crate) async fn read_progress(path: &Path) -> anyhow::Result<CanvasProgress> {
    let json = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    CanvasProgress::from_json(&json)
        .with_context(|| format!("Invalid progress file {}", path.display()))
}

/// Write a progress record as pretty JSON.
pub(crate) async fn write_progress(progress: &CanvasProgress, path: &Path) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(progress)?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Encode a buffer as PNG and write it.
pub(crate) async fn write_png(buffer: &PixelBuffer, path: &Path) -> anyhow::Result<()> {
    let png = buffer.encode_png()?;
    tokio::fs::write(path, png)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

async fn load_artwork(path: &Path) -> anyhow::Result<Artwork> {
    let is_svg = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("svg"));
    if is_svg {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(Artwork::svg(text))
    } else {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(Artwork::encoded(bytes))
    }
}

/// Pick the canvas size: flags, then the recorded size, then the natural
/// size of raster artwork.
fn canvas_size(
    args: &RenderArgs,
    progress: &CanvasProgress,
    artwork: &Artwork,
) -> anyhow::Result<(u32, u32)> {
    let recorded = progress.dimensions();
    let natural = match artwork {
        Artwork::Encoded(bytes) => PixelBuffer::decode(bytes)
            .ok()
            .map(|buf| (buf.width(), buf.height())),
        Artwork::Raster(buf) => Some((buf.width(), buf.height())),
        Artwork::Svg(_) => None,
    };

    let width = args.width.or(recorded.map(|(w, _)| w)).or(natural.map(|(w, _)| w));
    let height = args.height.or(recorded.map(|(_, h)| h)).or(natural.map(|(_, h)| h));
    match (width, height) {
        (Some(w), Some(h)) => Ok((w, h)),
        _ => bail!("Canvas size unknown; pass --width and --height"),
    }
}

/// Replay the progress file's fills over its artwork.
pub(crate) async fn composite(args: &RenderArgs) -> anyhow::Result<CompositeReport> {
    let progress = read_progress(&args.progress).await?;
    let artwork = load_artwork(&args.artwork).await?;
    let (width, height) = canvas_size(args, &progress, &artwork)?;

    let mut config = FloodFillConfig::from_env();
    if let Some(tolerance) = args.tolerance {
        config = config.with_tolerance(tolerance);
    }
    tracing::debug!(width, height, tolerance = config.tolerance, "Compositing");

    let compositor = FillLayerCompositor::with_config(ArtworkRasterizer::new(), config);
    let log = progress.to_log();
    match compositor
        .rebuild_from_log(&artwork, f64::from(width), f64::from(height), &log)
        .await?
    {
        Composite::Ready(report) => {
            for skipped in &report.skipped {
                tracing::warn!(
                    action = %skipped.action_id,
                    seed = skipped.seed_index,
                    "Skipped fill: {}",
                    skipped.error
                );
            }
            Ok(report)
        }
        Composite::Empty => {
            let mut buffer = ArtworkRasterizer::new()
                .rasterize(&artwork, width, height)
                .await?;
            buffer.flatten_onto(Color::WHITE);
            Ok(CompositeReport {
                buffer,
                applied: 0,
                unchanged: 0,
                skipped: Vec::new(),
            })
        }
        Composite::Superseded => bail!("Composite was superseded"),
    }
}

/// Composite and shrink to a preview thumbnail.
pub(crate) async fn preview(args: &RenderArgs, max_edge: u32) -> anyhow::Result<PreviewImage> {
    let report = composite(args).await?;
    let config = PreviewConfig { max_edge };
    Ok(render_preview(&report.buffer, &config)?)
}

/// Apply `undo` undos then `redo` redos. Returns the edited record and how
/// many of each actually happened.
#[must_use]
pub(crate) fn edit_history(
    progress: &CanvasProgress,
    undo: usize,
    redo: usize,
) -> (CanvasProgress, usize, usize) {
    let mut log = progress.to_log();
    let undone = (0..undo).take_while(|_| log.undo().is_some()).count();
    let redone = (0..redo).take_while(|_| log.redo().is_some()).count();

    let edited = CanvasProgress {
        actions: log.into_actions(),
        last_updated: Utc::now(),
        ..progress.clone()
    };
    (edited, undone, redone)
}

/// Per-kind counts and metadata of a progress record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ProgressSummary {
    /// Server version.
    pub version: u64,
    /// Last change, RFC 3339.
    pub last_updated: String,
    /// Recorded canvas size.
    pub dimensions: Option<(u32, u32)>,
    /// Stored preview URL.
    pub preview_url: Option<String>,
    /// Total actions.
    pub actions: usize,
    /// Actions per kind.
    pub by_kind: BTreeMap<&'static str, usize>,
    /// Fill seeds the compositor would replay.
    pub fill_seeds: usize,
}

impl ProgressSummary {
    /// Summarize `progress`.
    #[must_use]
    pub fn of(progress: &CanvasProgress) -> Self {
        let mut by_kind = BTreeMap::new();
        for action in &progress.actions {
            *by_kind.entry(action.kind().as_str()).or_insert(0) += 1;
        }
        let fill_seeds = progress
            .actions
            .iter()
            .map(|a| a.fill_seeds().len())
            .sum();

        Self {
            version: progress.version,
            last_updated: progress.last_updated.to_rfc3339(),
            dimensions: progress.dimensions(),
            preview_url: progress.preview_url.clone(),
            actions: progress.actions.len(),
            by_kind,
            fill_seeds,
        }
    }

    /// JSON form for `--json`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "version": self.version,
            "lastUpdated": self.last_updated,
            "canvasWidth": self.dimensions.map(|(w, _)| w),
            "canvasHeight": self.dimensions.map(|(_, h)| h),
            "previewUrl": self.preview_url,
            "actions": self.actions,
            "byKind": self.by_kind,
            "fillSeeds": self.fill_seeds,
        })
    }
}

impl fmt::Display for ProgressSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "version:      {}", self.version)?;
        writeln!(f, "last updated: {}", self.last_updated)?;
        match self.dimensions {
            Some((w, h)) => writeln!(f, "canvas:       {w}x{h}")?,
            None => writeln!(f, "canvas:       unknown")?,
        }
        if let Some(url) = &self.preview_url {
            writeln!(f, "preview:      {url}")?;
        }
        writeln!(f, "actions:      {}", self.actions)?;
        for (kind, count) in &self.by_kind {
            writeln!(f, "  {kind:<12}{count}")?;
        }
        writeln!(f, "fill seeds:   {}", self.fill_seeds)
    }
}

fn remote_key(args: &RemoteArgs) -> ProgressKey {
    let key = ProgressKey::new(args.user.clone(), args.image.clone());
    match &args.profile {
        Some(profile) => key.with_profile(profile.clone()),
        None => key,
    }
}

/// Fetch the stored record.
pub(crate) async fn pull(args: &RemoteArgs) -> anyhow::Result<CanvasProgress> {
    let remote = HttpProgressRemote::new(&args.server)?;
    let key = remote_key(args);
    remote
        .fetch(&key)
        .await?
        .with_context(|| format!("No progress stored for {key}"))
}

/// Upload `progress` on top of the server's current version.
///
/// Refuses when the server is ahead of the file unless `force` is set.
pub(crate) async fn push(
    args: &RemoteArgs,
    progress: &CanvasProgress,
    force: bool,
) -> anyhow::Result<CanvasProgress> {
    let remote = HttpProgressRemote::new(&args.server)?;
    let key = remote_key(args);

    let remote_version = remote.fetch(&key).await?.map_or(0, |p| p.version);
    if remote_version > progress.version && !force {
        bail!(
            "Server has version {remote_version}, file is at {}; pull first or pass --force",
            progress.version
        );
    }

    let upload = ProgressUpload::new(progress.actions.clone(), remote_version)
        .with_dimensions(progress.dimensions())
        .with_preview_url(progress.preview_url.clone());
    let stored = remote.save(&key, upload).await?;
    tracing::info!(key = %key, version = stored.version, "Pushed progress");
    Ok(stored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crayon_core::{CanvasAction, FillData};

    const RED: Color = Color::rgb(255, 0, 0);

    /// 40x40 white page with a black outline from (10,10) to (30,30).
    fn square_png() -> Vec<u8> {
        let mut buf = PixelBuffer::filled(40, 40, Color::WHITE).expect("alloc");
        for i in 10..=30 {
            buf.set(i, 10, Color::BLACK);
            buf.set(i, 30, Color::BLACK);
            buf.set(10, i, Color::BLACK);
            buf.set(30, i, Color::BLACK);
        }
        buf.encode_png().expect("png")
    }

    fn progress_with(actions: Vec<CanvasAction>) -> CanvasProgress {
        CanvasProgress {
            actions,
            version: 2,
            ..CanvasProgress::empty()
        }
    }

    async fn fixture(dir: &Path, actions: Vec<CanvasAction>) -> RenderArgs {
        let artwork = dir.join("square.png");
        let progress = dir.join("square.json");
        tokio::fs::write(&artwork, square_png()).await.expect("artwork");
        write_progress(&progress_with(actions), &progress)
            .await
            .expect("progress");
        RenderArgs {
            artwork,
            progress,
            width: None,
            height: None,
            tolerance: None,
        }
    }

    #[tokio::test]
    async fn test_composite_fills_square_interior() {
        let dir = tempfile::tempdir().expect("tempdir");
        let args = fixture(dir.path(), vec![CanvasAction::fill(20.0, 20.0, RED)]).await;

        let report = composite(&args).await.expect("composite");
        assert_eq!(report.applied, 1);
        assert_eq!(report.buffer.width(), 40);
        assert_eq!(report.buffer.get(20, 20), Some(RED));
        assert_eq!(report.buffer.get(5, 5), Some(Color::WHITE));
        // 19x19 interior
        assert_eq!(report.buffer.count_color(RED), 361);
    }

    #[tokio::test]
    async fn test_composite_without_fills_is_plain_artwork() {
        let dir = tempfile::tempdir().expect("tempdir");
        let args = fixture(dir.path(), Vec::new()).await;

        let report = composite(&args).await.expect("composite");
        assert_eq!(report.applied, 0);
        assert_eq!(report.buffer.get(20, 20), Some(Color::WHITE));
        assert_eq!(report.buffer.get(10, 10), Some(Color::BLACK));
    }

    #[tokio::test]
    async fn test_preview_is_png_within_edge() {
        let dir = tempfile::tempdir().expect("tempdir");
        let args = fixture(
            dir.path(),
            vec![CanvasAction::magic_fill(vec![FillData {
                x: 20.0,
                y: 20.0,
                color: RED,
            }])],
        )
        .await;

        let preview = preview(&args, 16).await.expect("preview");
        assert_eq!((preview.width, preview.height), (16, 16));
        assert_eq!(preview.content_type, "image/png");
    }

    #[tokio::test]
    async fn test_unknown_svg_size_is_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut args = fixture(dir.path(), Vec::new()).await;
        let svg = dir.path().join("page.svg");
        tokio::fs::write(&svg, "<svg xmlns=\"http://www.w3.org/2000/svg\"/>")
            .await
            .expect("svg");
        args.artwork = svg;

        let err = composite(&args).await.expect_err("no size");
        assert!(err.to_string().contains("--width"));
    }

    #[test]
    fn test_edit_history_undo_then_redo() {
        let actions: Vec<CanvasAction> = (0..4)
            .map(|i| CanvasAction::fill(1.0, 1.0, Color::rgb(i, i, i)))
            .collect();
        let progress = progress_with(actions.clone());

        let (edited, undone, redone) = edit_history(&progress, 3, 1);
        assert_eq!((undone, redone), (3, 1));
        assert_eq!(edited.actions, actions[..2].to_vec());
        assert_eq!(edited.version, 2);

        // Undo past the start stops at empty
        let (emptied, undone, _) = edit_history(&progress, 10, 0);
        assert_eq!(undone, 4);
        assert!(emptied.actions.is_empty());
    }

    #[test]
    fn test_summary_counts_kinds() {
        let progress = progress_with(vec![
            CanvasAction::fill(1.0, 1.0, RED),
            CanvasAction::fill(2.0, 2.0, RED),
            CanvasAction::magic_fill(vec![
                FillData {
                    x: 1.0,
                    y: 1.0,
                    color: RED,
                },
                FillData {
                    x: 3.0,
                    y: 3.0,
                    color: RED,
                },
            ]),
        ])
        .with_dimensions(800, 600);

        let summary = ProgressSummary::of(&progress);
        assert_eq!(summary.actions, 3);
        assert_eq!(summary.by_kind.get("fill"), Some(&2));
        assert_eq!(summary.by_kind.get("magic-fill"), Some(&1));
        assert_eq!(summary.fill_seeds, 4);

        let json = summary.to_json();
        assert_eq!(json["canvasWidth"], 800);
        assert!(summary.to_string().contains("canvas:       800x600"));
    }
}
