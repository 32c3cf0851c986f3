//! Debug-only damage-plan validation, ported from the original
//! offscreen sanitizer display: catches double-covered tiles within one
//! snake-grid phase and out-of-bounds rect-snake spans.

use crate::{DamagePlan, Grid};
use std::collections::HashSet;

/// Panics in debug builds if `plan` violates a grid-coverage invariant.
/// A no-op in release builds; call sites still pay nothing on the hot path
/// when `debug_assertions` is off.
pub fn validate_plan(plan: &DamagePlan, grid: Grid) {
	if !cfg!(debug_assertions) {
		return;
	}
	match plan {
		DamagePlan::SnakeGrid(p) => {
			let mut seen = HashSet::with_capacity(p.tiles.len());
			for t in &p.tiles {
				assert!(t.row < grid.rows && t.col < grid.cols, "snake tile out of bounds: {t:?}");
				assert!(seen.insert((t.row, t.col)), "snake tile covered twice in one step: {t:?}");
			}
		}
		DamagePlan::RectSnake(p) => {
			assert!(p.rect.within_bounds(grid), "rect-snake rectangle escapes grid: {:?}", p.rect);
			let mut seen = HashSet::with_capacity(p.tiles.len());
			for t in &p.tiles {
				assert!(t.row < grid.rows && t.col < grid.cols, "rect tile out of bounds: {t:?}");
				assert!(seen.insert((t.row, t.col)), "rect tile covered twice in one step: {t:?}");
			}
		}
		DamagePlan::GradientSweep(p) | DamagePlan::GradientFill(p) => {
			for r in &p.rows {
				assert!(r.row < grid.rows, "gradient row out of bounds: {r:?}");
			}
		}
		DamagePlan::Bands(p) => {
			for b in &p.bands {
				assert!(b.band < 16, "band index out of range: {b:?}");
			}
		}
	}
}
