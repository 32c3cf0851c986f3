use crate::{Color, Grid, GRADIENT_WINDOW_ROWS, PHASE0_RGB, PHASE1_RGB};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RowColor {
	pub row: u32,
	pub color: Color,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GradientPlan {
	pub rows: Vec<RowColor>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GradientSweepState {
	pub head_row: u32,
	pub direction_down: bool,
}

impl Default for GradientSweepState {
	fn default() -> Self {
		Self { head_row: 0, direction_down: true }
	}
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GradientFillState {
	pub head_row: u32,
	pub cycle: u32,
}

impl Default for GradientFillState {
	fn default() -> Self {
		Self { head_row: 0, cycle: 0 }
	}
}

fn sweep_row_color(row: u32, head: u32, rows_n: u32, window: u32) -> Color {
	let delta = (row + rows_n - head) % rows_n;
	if delta >= window {
		return PHASE1_RGB;
	}
	let center = (window.saturating_sub(1)) as f32 / 2.0;
	if center <= 0.0 {
		return PHASE0_RGB;
	}
	let blend = ((delta as f32 - center).abs() / center).clamp(0.0, 1.0);
	Color::lerp(PHASE0_RGB, PHASE1_RGB, blend)
}

fn step_sweep_head(head: u32, direction_down: bool, rows_n: u32) -> (u32, bool) {
	if rows_n <= 1 {
		return (0, direction_down);
	}
	let new_head = if direction_down { (head + 1).min(rows_n - 1) } else { head.saturating_sub(1) };
	let mut new_direction = direction_down;
	if new_head == 0 || new_head == rows_n - 1 {
		new_direction = !direction_down;
	}
	(new_head, new_direction)
}

/// A 32-row band ping-pongs top to bottom. Damages the row that left the
/// window plus the `W` rows of the window at the new head.
pub fn gradient_sweep_plan(
	state: GradientSweepState,
	grid: Grid,
) -> (GradientPlan, GradientSweepState) {
	let rows_n = grid.rows;
	let window = GRADIENT_WINDOW_ROWS.min(rows_n);
	let old_head = state.head_row;
	let (new_head, new_direction) = step_sweep_head(old_head, state.direction_down, rows_n);

	let mut rows = Vec::with_capacity(window as usize + 1);
	rows.push(RowColor { row: old_head, color: sweep_row_color(old_head, new_head, rows_n, window) });
	for d in 0..window {
		let r = (new_head + d) % rows_n;
		if r == old_head {
			continue;
		}
		rows.push(RowColor { row: r, color: sweep_row_color(r, new_head, rows_n, window) });
	}

	(GradientPlan { rows }, GradientSweepState { head_row: new_head, direction_down: new_direction })
}

fn fill_row_color(row: u32, head: u32, window: u32) -> Color {
	if row >= head {
		return PHASE0_RGB;
	}
	let d = head - row;
	if d >= window {
		return PHASE1_RGB;
	}
	let blend = d as f32 / window as f32;
	Color::lerp(PHASE0_RGB, PHASE1_RGB, blend)
}

/// A one-directional top-down fill with a 32-row soft transition tail.
pub fn gradient_fill_plan(
	state: GradientFillState,
	grid: Grid,
) -> (GradientPlan, GradientFillState) {
	let rows_n = grid.rows;
	let window = GRADIENT_WINDOW_ROWS.min(rows_n);
	let mut new_head = state.head_row + 1;
	let mut new_cycle = state.cycle;
	let wrapped = new_head >= rows_n;
	if wrapped {
		new_head = 0;
		new_cycle = new_cycle.wrapping_add(1);
	}

	let rows = if wrapped {
		(0..rows_n).map(|r| RowColor { row: r, color: fill_row_color(r, new_head, window) }).collect()
	} else {
		let start = new_head.saturating_sub(window);
		(start..=new_head).map(|r| RowColor { row: r, color: fill_row_color(r, new_head, window) }).collect()
	};

	(GradientPlan { rows }, GradientFillState { head_row: new_head, cycle: new_cycle })
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn sweep_returns_to_initial_state_after_full_period() {
		let grid = Grid::new(20, 5);
		let mut state = GradientSweepState::default();
		let period = 2 * (grid.rows - 1);
		for _ in 0..period {
			let (_, next) = gradient_sweep_plan(state, grid);
			state = next;
		}
		assert_eq!(state, GradientSweepState::default());
	}

	#[test]
	fn sweep_head_always_in_bounds() {
		let grid = Grid::new(20, 5);
		let mut state = GradientSweepState::default();
		for _ in 0..500 {
			let (_, next) = gradient_sweep_plan(state, grid);
			assert!(next.head_row < grid.rows);
			state = next;
		}
	}

	#[test]
	fn fill_wraps_and_increments_cycle() {
		let grid = Grid::new(10, 5);
		let mut state = GradientFillState::default();
		let mut wrapped_once = false;
		for _ in 0..10 {
			let (plan, next) = gradient_fill_plan(state, grid);
			if next.head_row == 0 && state.head_row == grid.rows - 1 {
				wrapped_once = true;
				assert_eq!(next.cycle, state.cycle + 1);
				assert_eq!(plan.rows.len(), grid.rows as usize);
			}
			state = next;
		}
		assert!(wrapped_once);
	}
}
