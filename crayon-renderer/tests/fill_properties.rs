//! Property tests for the flood fill.
//!
//! Random wall layouts are filled from random seeds and checked against an
//! independent reachability computation.

use std::collections::{HashSet, VecDeque};

use crayon_core::Color;
use crayon_renderer::{flood_fill, FillOutcome, FloodFillConfig, PixelBuffer, SkipReason};
use proptest::prelude::*;

const SIZE: u32 = 16;
const FILL: Color = Color::rgb(200, 30, 30);

/// Build a white grid with black walls where `walls[i]` is set.
fn grid(walls: &[bool]) -> PixelBuffer {
    let mut buf = PixelBuffer::filled(SIZE, SIZE, Color::WHITE).expect("alloc");
    for (i, wall) in walls.iter().enumerate() {
        if *wall {
            let i = u32::try_from(i).expect("small grid");
            buf.set(i % SIZE, i / SIZE, Color::BLACK);
        }
    }
    buf
}

/// Pixels 4-connected to the seed through non-wall cells.
fn reachable(walls: &[bool], seed: (u32, u32)) -> HashSet<(u32, u32)> {
    let is_wall = |x: u32, y: u32| walls[(y * SIZE + x) as usize];
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([seed]);
    seen.insert(seed);
    while let Some((x, y)) = queue.pop_front() {
        let mut next = Vec::new();
        if x > 0 {
            next.push((x - 1, y));
        }
        if x + 1 < SIZE {
            next.push((x + 1, y));
        }
        if y > 0 {
            next.push((x, y - 1));
        }
        if y + 1 < SIZE {
            next.push((x, y + 1));
        }
        for (nx, ny) in next {
            if !is_wall(nx, ny) && seen.insert((nx, ny)) {
                queue.push_back((nx, ny));
            }
        }
    }
    seen
}

fn arb_walls() -> impl Strategy<Value = Vec<bool>> {
    prop::collection::vec(prop::bool::weighted(0.3), (SIZE * SIZE) as usize)
}

proptest! {
    #[test]
    fn prop_fill_changes_exactly_the_reachable_component(
        walls in arb_walls(),
        sx in 0..SIZE,
        sy in 0..SIZE,
    ) {
        let mut buf = grid(&walls);
        let before = buf.clone();
        let outcome = flood_fill(&mut buf, sx, sy, FILL, &FloodFillConfig::default())
            .expect("seed in bounds");

        if walls[(sy * SIZE + sx) as usize] {
            prop_assert_eq!(outcome, FillOutcome::Skipped(SkipReason::SeedIsWall));
            prop_assert_eq!(buf, before);
            return Ok(());
        }

        let expected = reachable(&walls, (sx, sy));
        prop_assert_eq!(outcome.painted(), expected.len());
        for y in 0..SIZE {
            for x in 0..SIZE {
                let now = buf.get(x, y).expect("in bounds");
                if expected.contains(&(x, y)) {
                    prop_assert_eq!(now, FILL);
                } else {
                    prop_assert_eq!(Some(now), before.get(x, y));
                }
            }
        }
    }

    #[test]
    fn prop_refill_is_idempotent(
        walls in arb_walls(),
        sx in 0..SIZE,
        sy in 0..SIZE,
    ) {
        let config = FloodFillConfig::default();
        let mut buf = grid(&walls);
        flood_fill(&mut buf, sx, sy, FILL, &config).expect("seed in bounds");
        let once = buf.clone();

        let again = flood_fill(&mut buf, sx, sy, FILL, &config).expect("seed in bounds");
        prop_assert_eq!(again.painted(), 0);
        prop_assert_eq!(buf, once);
    }

    #[test]
    fn prop_walls_are_never_repainted(
        walls in arb_walls(),
        seeds in prop::collection::vec((0..SIZE, 0..SIZE), 1..6),
    ) {
        let config = FloodFillConfig::default();
        let mut buf = grid(&walls);
        for (i, (x, y)) in seeds.into_iter().enumerate() {
            let color = if i % 2 == 0 { FILL } else { Color::rgb(30, 200, 30) };
            flood_fill(&mut buf, x, y, color, &config).expect("seed in bounds");
        }
        let wall_count = walls.iter().filter(|w| **w).count();
        prop_assert_eq!(buf.count_color(Color::BLACK), wall_count);
    }

    #[test]
    fn prop_out_of_bounds_never_panics(x in any::<u32>(), y in any::<u32>()) {
        let mut buf = PixelBuffer::filled(SIZE, SIZE, Color::WHITE).expect("alloc");
        let result = flood_fill(&mut buf, x, y, FILL, &FloodFillConfig::default());
        prop_assert_eq!(result.is_err(), x >= SIZE || y >= SIZE);
    }
}
