use crate::{window_blend, Color, Grid, PHASE0_RGB, PHASE1_RGB, SNAKE_PHASE_WINDOW_TILES};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SnakeState {
	pub cursor: u32,
	pub prev_start: u32,
	pub prev_count: u32,
	pub clearing_phase: bool,
}

impl Default for SnakeState {
	fn default() -> Self {
		Self { cursor: 0, prev_start: 0, prev_count: 0, clearing_phase: false }
	}
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TileColor {
	pub row: u32,
	pub col: u32,
	pub color: Color,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SnakeGridPlan {
	pub active_cursor: u32,
	pub batch_size: u32,
	pub phase_completed: bool,
	/// Tiles touched this step, in boustrophedon order, fading from the
	/// previous phase's color to the new target (comet trail).
	pub tiles: Vec<TileColor>,
	/// Set when `phase_completed`: the renderer should fill the whole grid
	/// with this color as cleanup before the next phase begins.
	pub fill_color: Option<Color>,
}

fn phase_colors(clearing_phase: bool) -> (Color, Color) {
	// (previous-phase color, this-phase target color)
	if clearing_phase {
		(PHASE1_RGB, PHASE0_RGB)
	} else {
		(PHASE0_RGB, PHASE1_RGB)
	}
}

/// Advances the snake-grid cursor by up to `SNAKE_PHASE_WINDOW_TILES` tiles.
pub fn snake_grid_plan(state: SnakeState, grid: Grid) -> (SnakeGridPlan, SnakeState) {
	let total = grid.tile_count();
	let active_cursor = state.cursor.min(total);
	let remaining = total - active_cursor;
	let batch_size = remaining.min(SNAKE_PHASE_WINDOW_TILES);
	let phase_completed = active_cursor + batch_size >= total;

	let (prev_color, target) = phase_colors(state.clearing_phase);

	let tiles = (0..batch_size)
		.map(|i| {
			let step = active_cursor + i;
			let (row, col) = grid.tile_index_from_step(step);
			let blend = window_blend(i, batch_size);
			TileColor { row, col, color: Color::lerp(prev_color, target, blend) }
		})
		.collect();

	let fill_color = if phase_completed { Some(target) } else { None };

	let next = if phase_completed {
		SnakeState {
			cursor: 0,
			prev_start: active_cursor,
			prev_count: batch_size,
			clearing_phase: !state.clearing_phase,
		}
	} else {
		SnakeState {
			cursor: active_cursor + batch_size,
			prev_start: active_cursor,
			prev_count: batch_size,
			clearing_phase: state.clearing_phase,
		}
	};

	(SnakeGridPlan { active_cursor, batch_size, phase_completed, tiles, fill_color }, next)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn one_phase_covers_every_tile_exactly_once() {
		let grid = Grid::new(6, 10);
		let total = grid.tile_count();
		let mut state = SnakeState::default();
		let mut sum = 0u32;
		let mut steps = 0u32;
		loop {
			let (plan, next) = snake_grid_plan(state, grid);
			sum += plan.batch_size;
			steps += 1;
			state = next;
			if plan.phase_completed {
				break;
			}
		}
		assert_eq!(sum, total);
		let expected_steps = total.div_ceil(SNAKE_PHASE_WINDOW_TILES.min(total).max(1));
		assert_eq!(steps, expected_steps);
	}

	#[test]
	fn phase_toggles_clearing_and_resets_cursor() {
		let grid = Grid::new(4, 4);
		let mut state = SnakeState::default();
		loop {
			let (plan, next) = snake_grid_plan(state, grid);
			state = next;
			if plan.phase_completed {
				assert_eq!(state.cursor, 0);
				assert!(state.clearing_phase);
				break;
			}
		}
	}

	#[test]
	fn batches_stay_within_window() {
		let grid = Grid::default();
		let (plan, _) = snake_grid_plan(SnakeState::default(), grid);
		assert_eq!(plan.batch_size, SNAKE_PHASE_WINDOW_TILES);
		assert_eq!(plan.tiles.len(), SNAKE_PHASE_WINDOW_TILES as usize);
	}
}
