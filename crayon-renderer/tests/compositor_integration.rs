//! Fill layer compositor integration tests.
//!
//! Covers full rebuilds over rasterized artwork, fill ordering, the
//! generation guard and failure handling.

use std::time::Duration;

use async_trait::async_trait;
use crayon_core::{
    ActionData, ActionLog, BrushDescriptor, CanvasAction, Color, FillData, Point, StrokeData,
};
use crayon_renderer::{
    replay_fills, Artwork, ArtworkRasterizer, Composite, CompositeError, FillLayerCompositor,
    FloodFillConfig, PixelBuffer, RasterSource, RenderError, RenderResult,
};

const RED: Color = Color::rgb(255, 0, 0);
const BLUE: Color = Color::rgb(0, 0, 255);
const GREY: Color = Color::rgb(200, 200, 200);

// ============================================================================
// Fixtures
// ============================================================================

/// 100x100 white page with a black square outline from (20,20) to (80,80).
fn square_page() -> PixelBuffer {
    let mut buf = PixelBuffer::filled(100, 100, Color::WHITE).expect("alloc");
    for i in 20..=80 {
        buf.set(i, 20, Color::BLACK);
        buf.set(i, 80, Color::BLACK);
        buf.set(20, i, Color::BLACK);
        buf.set(80, i, Color::BLACK);
    }
    buf
}

/// Page split into two halves by a vertical line at x=50.
fn split_page() -> PixelBuffer {
    let mut buf = PixelBuffer::filled(100, 100, Color::WHITE).expect("alloc");
    for y in 0..100 {
        buf.set(50, y, Color::BLACK);
    }
    buf
}

/// Page with a white left half and a light grey right half, touching at
/// x=50 with no line between them.
fn two_tone_page() -> PixelBuffer {
    let mut buf = PixelBuffer::filled(100, 100, Color::WHITE).expect("alloc");
    for y in 0..100 {
        for x in 50..100 {
            buf.set(x, y, GREY);
        }
    }
    buf
}

fn stroke() -> CanvasAction {
    CanvasAction::new(ActionData::Stroke(StrokeData {
        path: vec![Point { x: 5.0, y: 5.0 }, Point { x: 95.0, y: 5.0 }],
        color: Color::rgb(0, 150, 0),
        brush: BrushDescriptor {
            kind: "crayon".to_string(),
            size: 6.0,
            opacity: 1.0,
        },
    }))
}

/// Source that fails every request.
struct BrokenSource;

#[async_trait]
impl RasterSource for BrokenSource {
    async fn rasterize(&self, _: &Artwork, width: u32, height: u32) -> RenderResult<PixelBuffer> {
        Err(RenderError::Allocation { width, height })
    }
}

/// Source that is slow for one particular width.
struct SlowSource {
    slow_width: u32,
}

#[async_trait]
impl RasterSource for SlowSource {
    async fn rasterize(
        &self,
        artwork: &Artwork,
        width: u32,
        height: u32,
    ) -> RenderResult<PixelBuffer> {
        if width == self.slow_width {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        ArtworkRasterizer::new().rasterize(artwork, width, height).await
    }
}

// ============================================================================
// Rebuilds
// ============================================================================

#[tokio::test]
async fn test_square_interior_fill() {
    let compositor = FillLayerCompositor::new(ArtworkRasterizer::new());
    let art = Artwork::Raster(square_page());
    let fills = vec![CanvasAction::fill(50.0, 50.0, RED)];

    let report = compositor
        .rebuild(&art, 100.0, 100.0, fills)
        .await
        .expect("rebuild")
        .into_report()
        .expect("ready");

    assert_eq!(report.applied, 1);
    assert!(report.skipped.is_empty());
    assert_eq!(report.buffer.count_color(RED), 59 * 59);
    for y in 21..=79 {
        for x in 21..=79 {
            assert_eq!(report.buffer.get(x, y), Some(RED), "({x}, {y})");
        }
    }
    assert_eq!(report.buffer.get(20, 20), Some(Color::BLACK));
    assert_eq!(report.buffer.get(0, 0), Some(Color::WHITE));
}

#[cfg(feature = "svg")]
#[tokio::test]
async fn test_svg_artwork_fill() {
    const PAGE: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" width="100" height="100">
        <rect x="20" y="20" width="60" height="60" fill="none" stroke="black" stroke-width="3"/>
    </svg>"#;

    let compositor = FillLayerCompositor::new(ArtworkRasterizer::new());
    let fills = vec![CanvasAction::fill(50.0, 50.0, RED)];
    let report = compositor
        .rebuild(&Artwork::svg(PAGE), 200.0, 200.0, fills)
        .await
        .expect("rebuild")
        .into_report()
        .expect("ready");

    // Scaled 2x: inside red, outside flattened white
    assert_eq!(report.buffer.width(), 200);
    assert_eq!(report.buffer.get(100, 100), Some(RED));
    assert_eq!(report.buffer.get(60, 100), Some(RED));
    assert_eq!(report.buffer.get(10, 10), Some(Color::WHITE));
}

#[tokio::test]
async fn test_double_composite_is_deterministic() {
    let compositor = FillLayerCompositor::new(ArtworkRasterizer::new());
    let art = Artwork::Raster(square_page());

    let mut log = ActionLog::new();
    log.append(stroke());
    log.append(CanvasAction::fill(50.0, 50.0, RED));
    log.append(CanvasAction::fill(5.0, 50.0, BLUE));

    let first = compositor
        .rebuild_from_log(&art, 100.0, 100.0, &log)
        .await
        .expect("rebuild")
        .into_report()
        .expect("ready");
    let second = compositor
        .rebuild_from_log(&art, 100.0, 100.0, &log)
        .await
        .expect("rebuild")
        .into_report()
        .expect("ready");

    assert_eq!(first.buffer, second.buffer);
    assert_eq!(first.applied, 2);
}

#[tokio::test]
async fn test_order_matters_for_same_region() {
    let compositor = FillLayerCompositor::new(ArtworkRasterizer::new());
    let art = Artwork::Raster(square_page());

    let red_then_blue = vec![
        CanvasAction::fill(50.0, 50.0, RED),
        CanvasAction::fill(40.0, 40.0, BLUE),
    ];
    let blue_then_red = vec![
        CanvasAction::fill(40.0, 40.0, BLUE),
        CanvasAction::fill(50.0, 50.0, RED),
    ];

    let a = compositor
        .rebuild(&art, 100.0, 100.0, red_then_blue)
        .await
        .expect("rebuild")
        .into_report()
        .expect("ready");
    let b = compositor
        .rebuild(&art, 100.0, 100.0, blue_then_red)
        .await
        .expect("rebuild")
        .into_report()
        .expect("ready");

    assert_eq!(a.buffer.get(50, 50), Some(BLUE));
    assert_eq!(b.buffer.get(50, 50), Some(RED));
}

#[test]
fn test_order_matters_for_adjacent_regions() {
    let config = FloodFillConfig::default();
    let left_grey = CanvasAction::fill(10.0, 10.0, GREY);
    let right_blue = CanvasAction::fill(90.0, 10.0, BLUE);

    // Left recolored to match its neighbour: the two halves merge
    let merged = replay_fills(two_tone_page(), [&left_grey, &right_blue], &config);
    assert_eq!(merged.buffer.count_color(BLUE), 100 * 100);

    let separate = replay_fills(two_tone_page(), [&right_blue, &left_grey], &config);
    assert_eq!(separate.buffer.count_color(BLUE), 50 * 100);
    assert_eq!(separate.buffer.get(10, 10), Some(GREY));
    assert_ne!(merged.buffer, separate.buffer);
}

#[test]
fn test_dark_fill_walls_off_adjacent_region() {
    let config = FloodFillConfig::default();
    let dark = Color::rgb(30, 30, 30);
    assert!(config.is_wall(dark));

    let right_white = CanvasAction::fill(90.0, 10.0, Color::WHITE);
    let left_dark = CanvasAction::fill(10.0, 10.0, dark);
    let blue_from_right = CanvasAction::fill(90.0, 10.0, BLUE);

    // Right half repainted white joins the left; a later fill spans the page
    let open = replay_fills(two_tone_page(), [&right_white, &blue_from_right], &config);
    assert_eq!(open.buffer.count_color(BLUE), 100 * 100);

    // Left painted dark first becomes line art the next fill cannot enter
    let walled = replay_fills(
        two_tone_page(),
        [&left_dark, &right_white, &blue_from_right],
        &config,
    );
    assert_eq!(walled.buffer.count_color(BLUE), 50 * 100);
    assert_eq!(walled.buffer.get(10, 10), Some(dark));
    assert!(walled.skipped.is_empty());
}

#[test]
fn test_disjoint_regions_commute() {
    let config = FloodFillConfig::default();
    let left = CanvasAction::fill(10.0, 10.0, RED);
    let right = CanvasAction::fill(90.0, 10.0, BLUE);

    let ab = replay_fills(split_page(), [&left, &right], &config);
    let ba = replay_fills(split_page(), [&right, &left], &config);

    assert_eq!(ab.buffer, ba.buffer);
    assert_eq!(ab.buffer.count_color(RED), 50 * 100);
    assert_eq!(ab.buffer.count_color(BLUE), 49 * 100);
}

#[test]
fn test_magic_fill_applies_seeds_in_order() {
    let magic = CanvasAction::magic_fill(vec![
        FillData::new(10.0, 10.0, RED),
        FillData::new(90.0, 10.0, BLUE),
        // Same region as the first seed: recolors it
        FillData::new(20.0, 90.0, Color::rgb(0, 200, 0)),
    ]);
    let report = replay_fills(split_page(), [&magic], &FloodFillConfig::default());

    assert_eq!(report.applied, 3);
    assert_eq!(report.buffer.get(10, 10), Some(Color::rgb(0, 200, 0)));
    assert_eq!(report.buffer.get(90, 10), Some(BLUE));
}

#[test]
fn test_non_fill_actions_are_ignored() {
    let actions = [stroke(), CanvasAction::fill(10.0, 10.0, RED)];
    let report = replay_fills(split_page(), &actions, &FloodFillConfig::default());
    assert_eq!(report.applied, 1);
}

// ============================================================================
// Failures and supersession
// ============================================================================

#[tokio::test]
async fn test_raster_failure_aborts_rebuild() {
    let compositor = FillLayerCompositor::new(BrokenSource);
    let fills = vec![CanvasAction::fill(1.0, 1.0, RED)];
    let result = compositor
        .rebuild(&Artwork::svg("<svg/>"), 10.0, 10.0, fills)
        .await;
    assert!(matches!(
        result,
        Err(CompositeError::Raster(RenderError::Allocation { .. }))
    ));
}

#[tokio::test]
async fn test_failed_seed_is_reported_not_fatal() {
    let compositor = FillLayerCompositor::new(ArtworkRasterizer::new());
    let art = Artwork::Raster(square_page());
    let fills = vec![
        CanvasAction::fill(500.0, 500.0, BLUE),
        CanvasAction::fill(50.0, 50.0, RED),
    ];

    let report = compositor
        .rebuild(&art, 100.0, 100.0, fills)
        .await
        .expect("rebuild")
        .into_report()
        .expect("ready");
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.buffer.count_color(RED), 59 * 59);
}

#[tokio::test]
async fn test_slow_rebuild_is_superseded() {
    let compositor = FillLayerCompositor::new(SlowSource { slow_width: 100 });
    let art = Artwork::Raster(square_page());
    let fills = vec![CanvasAction::fill(50.0, 50.0, RED)];

    let slow = compositor.rebuild(&art, 100.0, 100.0, fills.clone());
    let fast = compositor.rebuild(&art, 60.0, 60.0, fills);
    let (slow, fast) = tokio::join!(slow, fast);

    assert!(matches!(slow.expect("slow"), Composite::Superseded));
    let fast = fast.expect("fast").into_report().expect("ready");
    assert_eq!(fast.buffer.width(), 60);
}
