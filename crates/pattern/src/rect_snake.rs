use crate::{
	byte0, mix32, range_u32, window_blend, Color, Grid, PatternSeed, PHASE0_RGB, SALT_COLOR_B,
	SALT_COLOR_G, SALT_COLOR_R, SALT_ORIGIN_X, SALT_ORIGIN_Y, SALT_PALETTE,
	SNAKE_PHASE_WINDOW_TILES,
};

const RECT_INDEX_MUL: u32 = 0x85EB_CA77;
const REGION_SALT_HEIGHT: u32 = 0x63D8_3595;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect {
	pub x: u32,
	pub y: u32,
	pub width: u32,
	pub height: u32,
	pub color: Color,
}

impl Rect {
	pub fn tile_count(&self) -> u32 {
		self.width * self.height
	}

	/// Local `(row, col)` within the rectangle for serpentine step `step`.
	pub fn local_tile_from_step(&self, step: u32) -> (u32, u32) {
		let row = step / self.width;
		let col_in_row = step % self.width;
		let col = if row % 2 == 0 { col_in_row } else { self.width - 1 - col_in_row };
		(row, col)
	}

	pub fn global_tile(&self, local_row: u32, local_col: u32) -> (u32, u32) {
		(self.y + local_row, self.x + local_col)
	}

	pub fn within_bounds(&self, grid: Grid) -> bool {
		self.x + self.width <= grid.cols && self.y + self.height <= grid.rows
	}
}

/// Deterministic rectangle geometry and color for `(seed, rect_index)`.
pub fn rect_geometry(seed: PatternSeed, rect_index: u32, grid: Grid) -> Rect {
	let base = mix32(seed.0.wrapping_add(rect_index.wrapping_mul(RECT_INDEX_MUL)).wrapping_add(1));

	let cols = grid.cols.max(1);
	let rows = grid.rows.max(1);

	let min_w = if cols >= 16 { 8 } else { 1 };
	let max_w = min_w.max(cols / 3);
	let min_h = if rows >= 16 { 8 } else { 1 };
	let max_h = min_h.max(rows / 3);

	let width = range_u32(mix32(base ^ SALT_PALETTE), min_w, max_w.min(cols)).min(cols);
	let height = range_u32(mix32(base ^ REGION_SALT_HEIGHT), min_h, max_h.min(rows)).min(rows);
	let x = range_u32(mix32(base ^ SALT_ORIGIN_X), 0, cols - width);
	let y = range_u32(mix32(base ^ SALT_ORIGIN_Y), 0, rows - height);

	let channel = |salt: u32| 0.20 + (byte0(mix32(base ^ salt)) as f32 / 255.0) * 0.75;
	let color =
		Color::new(channel(SALT_COLOR_R), channel(SALT_COLOR_G), channel(SALT_COLOR_B), 1.0);

	Rect { x, y, width, height, color }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RectSnakeState {
	pub rect_index: u32,
	pub cursor: u32,
	pub prev_start: u32,
	pub prev_count: u32,
	pub reset_pending: bool,
}

impl Default for RectSnakeState {
	fn default() -> Self {
		Self { rect_index: 0, cursor: 0, prev_start: 0, prev_count: 0, reset_pending: false }
	}
}

impl RectSnakeState {
	/// Called by a renderer when it fails to preserve history across a
	/// swapchain/extent change mid-rectangle: forces a full-grid clear
	/// before the current rectangle resumes.
	pub fn request_reset(&mut self) {
		self.reset_pending = true;
	}
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RectTileColor {
	pub row: u32,
	pub col: u32,
	pub color: Color,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RectSnakePlan {
	/// Set when a prior frame requested a reset: the renderer must clear
	/// the whole grid to `clear_color` before anything else this frame.
	pub force_full_clear: bool,
	pub clear_color: Option<Color>,
	pub rect: Rect,
	pub active_cursor: u32,
	pub batch_size: u32,
	pub rect_completed: bool,
	pub tiles: Vec<RectTileColor>,
}

/// Paints an infinite sequence of pseudo-random rectangles, one at a time,
/// serpentine within each rectangle.
pub fn rect_snake_plan(
	state: RectSnakeState,
	seed: PatternSeed,
	grid: Grid,
) -> (RectSnakePlan, RectSnakeState) {
	let rect = rect_geometry(seed, state.rect_index, grid);
	debug_assert!(rect.within_bounds(grid));

	if state.reset_pending {
		let next = RectSnakeState {
			rect_index: state.rect_index,
			cursor: 0,
			prev_start: 0,
			prev_count: 0,
			reset_pending: false,
		};
		let plan = RectSnakePlan {
			force_full_clear: true,
			clear_color: Some(PHASE0_RGB),
			rect,
			active_cursor: 0,
			batch_size: 0,
			rect_completed: false,
			tiles: Vec::new(),
		};
		return (plan, next);
	}

	let total = rect.tile_count().max(1);
	let active_cursor = state.cursor.min(total);
	let remaining = total - active_cursor;
	let batch_size = remaining.min(SNAKE_PHASE_WINDOW_TILES);
	let rect_completed = active_cursor + batch_size >= total;

	let tiles = (0..batch_size)
		.map(|i| {
			let step = active_cursor + i;
			let (local_row, local_col) = rect.local_tile_from_step(step);
			let (row, col) = rect.global_tile(local_row, local_col);
			let blend = window_blend(i, batch_size);
			RectTileColor { row, col, color: Color::lerp(PHASE0_RGB, rect.color, blend) }
		})
		.collect();

	let next = if rect_completed {
		RectSnakeState {
			rect_index: state.rect_index.wrapping_add(1),
			cursor: 0,
			prev_start: active_cursor,
			prev_count: batch_size,
			reset_pending: false,
		}
	} else {
		RectSnakeState {
			rect_index: state.rect_index,
			cursor: active_cursor + batch_size,
			prev_start: active_cursor,
			prev_count: batch_size,
			reset_pending: false,
		}
	};

	let plan = RectSnakePlan {
		force_full_clear: false,
		clear_color: None,
		rect,
		active_cursor,
		batch_size,
		rect_completed,
		tiles,
	};
	(plan, next)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rectangles_never_exceed_grid_bounds() {
		let grid = Grid::default();
		for idx in 0..500 {
			let rect = rect_geometry(PatternSeed(0xDEAD_BEEF), idx, grid);
			assert!(rect.within_bounds(grid), "rect {idx} escapes grid: {rect:?}");
		}
	}

	#[test]
	fn rect_index_strictly_increases_between_completions() {
		let grid = Grid::new(32, 32);
		let seed = PatternSeed(7);
		let mut state = RectSnakeState::default();
		let mut last_index = state.rect_index;
		for _ in 0..2000 {
			let (plan, next) = rect_snake_plan(state, seed, grid);
			if plan.rect_completed {
				assert!(next.rect_index > last_index);
				last_index = next.rect_index;
			}
			state = next;
		}
	}

	#[test]
	fn reset_pending_forces_full_clear_once() {
		let grid = Grid::new(16, 16);
		let seed = PatternSeed(1);
		let mut state = RectSnakeState::default();
		state.request_reset();
		let (plan, next) = rect_snake_plan(state, seed, grid);
		assert!(plan.force_full_clear);
		assert!(!next.reset_pending);
	}
}
