//! Deterministic 2D animation patterns shared by every DriverBench renderer.
//!
//! Every pattern here is a pure function of `(RuntimeState, PatternSeed)` ->
//! `(DamagePlan, RuntimeState)`. No allocation on the hot path beyond the
//! `Vec`s the plan itself needs, no global state, no panics.

mod bands;
mod gradient;
mod rect_snake;
mod snake;

pub mod damage;

pub use bands::{bands_plan, BandsPlan};
pub use gradient::{
	gradient_fill_plan, gradient_sweep_plan, GradientFillState, GradientPlan, GradientSweepState,
};
pub use rect_snake::{rect_snake_plan, Rect, RectSnakePlan, RectSnakeState};
pub use snake::{snake_grid_plan, SnakeGridPlan, SnakeState};

/// Default logical grid used by every display/renderer combination.
pub const DEFAULT_ROWS: u32 = 600;
pub const DEFAULT_COLS: u32 = 1000;

/// Number of vertical bands in the `Bands` pattern.
pub const BANDS_COUNT: u32 = 16;

/// `BENCH_SNAKE_PHASE_WINDOW_TILES` — the number of tiles the snake-grid and
/// rect-snake patterns advance per step. Referenced but never defined in the
/// original source; this is the configuration constant implementers were
/// asked to surface explicitly.
pub const SNAKE_PHASE_WINDOW_TILES: u32 = 512;

/// Height in rows of the moving gradient band.
pub const GRADIENT_WINDOW_ROWS: u32 = 32;

/// Mixer constants (`mix32`) and salts, shared between RNG geometry and the
/// hash pipeline's 32-bit folding helper.
pub const MIX_MUL_A: u32 = 0x7FEB_352D;
pub const MIX_MUL_B: u32 = 0x846C_A68B;
pub const SALT_COLOR_R: u32 = 0x27D4_EB2F;
pub const SALT_COLOR_G: u32 = 0x1656_67B1;
pub const SALT_COLOR_B: u32 = 0x85EB_CA77;
pub const SALT_ORIGIN_Y: u32 = 0xC2B2_AE35;
pub const SALT_ORIGIN_X: u32 = 0x9E37_79B9;
pub const SALT_PALETTE: u32 = 0xA511_E9B3;

/// Dark-gray "phase 0" palette color.
pub const PHASE0_RGB: Color = Color { r: 0.08, g: 0.08, b: 0.09, a: 1.0 };
/// Green "phase 1" palette color.
pub const PHASE1_RGB: Color = Color { r: 0.15, g: 0.85, b: 0.35, a: 1.0 };

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Color {
	pub r: f32,
	pub g: f32,
	pub b: f32,
	pub a: f32,
}

impl Color {
	pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
		Self { r, g, b, a }
	}

	/// Linear interpolation, `t` is expected (but not required) in `[0, 1]`.
	pub fn lerp(a: Color, b: Color, t: f32) -> Color {
		Color {
			r: a.r + (b.r - a.r) * t,
			g: a.g + (b.g - a.g) * t,
			b: a.b + (b.b - a.b) * t,
			a: a.a + (b.a - a.a) * t,
		}
	}

	pub fn to_rgba8(self) -> [u8; 4] {
		let to_u8 = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
		[to_u8(self.r), to_u8(self.g), to_u8(self.b), to_u8(self.a)]
	}
}

/// Logical tile grid. All non-`Bands` patterns address tiles by `(row, col)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Grid {
	pub rows: u32,
	pub cols: u32,
}

impl Default for Grid {
	fn default() -> Self {
		Self { rows: DEFAULT_ROWS, cols: DEFAULT_COLS }
	}
}

impl Grid {
	pub fn new(rows: u32, cols: u32) -> Self {
		Self { rows, cols }
	}

	pub fn tile_count(self) -> u32 {
		self.rows * self.cols
	}

	/// Returns the tile visited at `step` in boustrophedon (serpentine)
	/// order across the whole grid.
	pub fn tile_index_from_step(self, step: u32) -> (u32, u32) {
		let row = step / self.cols;
		let col_in_row = step % self.cols;
		let col = if row % 2 == 0 { col_in_row } else { self.cols - 1 - col_in_row };
		(row, col)
	}

	/// Maps `(row, col)` to its NDC bounds: `(min_x, min_y) .. (max_x, max_y)`.
	pub fn tile_ndc_bounds(self, row: u32, col: u32) -> ([f32; 2], [f32; 2]) {
		let cols = self.cols as f32;
		let rows = self.rows as f32;
		let min_x = 2.0 * col as f32 / cols - 1.0;
		let max_x = 2.0 * (col + 1) as f32 / cols - 1.0;
		let max_y = 1.0 - 2.0 * row as f32 / rows;
		let min_y = 1.0 - 2.0 * (row + 1) as f32 / rows;
		([min_x, min_y], [max_x, max_y])
	}
}

/// Window-blend factor for a batch of size `n` at index `i`: the comet-trail
/// fade used by `SnakeGrid` and `RectSnake`.
pub fn window_blend(i: u32, n: u32) -> f32 {
	if n <= 1 {
		1.0
	} else {
		(n - 1 - i) as f32 / (n - 1) as f32
	}
}

/// 32-bit multiply-xor-shift mixer used for all pseudo-random geometry.
pub fn mix32(mut x: u32) -> u32 {
	x ^= x >> 16;
	x = x.wrapping_mul(MIX_MUL_A);
	x ^= x >> 15;
	x = x.wrapping_mul(MIX_MUL_B);
	x ^= x >> 16;
	x
}

/// Maps a mixed 32-bit value into `[lo, hi]` inclusive. `hi < lo` clamps to `lo`.
pub fn range_u32(mixed: u32, lo: u32, hi: u32) -> u32 {
	if hi <= lo {
		return lo;
	}
	lo + mixed % (hi - lo + 1)
}

/// Low byte of a mixed value, as used by the rect-snake color channels.
pub fn byte0(mixed: u32) -> u8 {
	(mixed & 0xFF) as u8
}

/// Seed driving all pseudo-random geometry for a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PatternSeed(pub u32);

/// The five deterministic animations this benchmark can drive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatternKind {
	Bands,
	SnakeGrid,
	GradientSweep,
	GradientFill,
	RectSnake,
}

impl PatternKind {
	pub fn work_unit_count(self, grid: Grid) -> u32 {
		match self {
			PatternKind::Bands => BANDS_COUNT,
			_ => grid.tile_count(),
		}
	}

	pub fn parse(s: &str) -> Option<Self> {
		match s {
			"bands" => Some(PatternKind::Bands),
			"snake_grid" => Some(PatternKind::SnakeGrid),
			"gradient_sweep" => Some(PatternKind::GradientSweep),
			"gradient_fill" => Some(PatternKind::GradientFill),
			"rect_snake" => Some(PatternKind::RectSnake),
			_ => None,
		}
	}
}

/// Per-pattern state carried between frames.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RuntimeState {
	Bands,
	SnakeGrid(SnakeState),
	GradientSweep(GradientSweepState),
	GradientFill(GradientFillState),
	RectSnake(RectSnakeState),
}

impl RuntimeState {
	pub fn initial(kind: PatternKind) -> Self {
		match kind {
			PatternKind::Bands => RuntimeState::Bands,
			PatternKind::SnakeGrid => RuntimeState::SnakeGrid(SnakeState::default()),
			PatternKind::GradientSweep => {
				RuntimeState::GradientSweep(GradientSweepState::default())
			}
			PatternKind::GradientFill => RuntimeState::GradientFill(GradientFillState::default()),
			PatternKind::RectSnake => RuntimeState::RectSnake(RectSnakeState::default()),
		}
	}

	pub fn kind(&self) -> PatternKind {
		match self {
			RuntimeState::Bands => PatternKind::Bands,
			RuntimeState::SnakeGrid(_) => PatternKind::SnakeGrid,
			RuntimeState::GradientSweep(_) => PatternKind::GradientSweep,
			RuntimeState::GradientFill(_) => PatternKind::GradientFill,
			RuntimeState::RectSnake(_) => PatternKind::RectSnake,
		}
	}
}

/// What changed since the previous frame, plus the colors needed to paint it.
#[derive(Clone, Debug, PartialEq)]
pub enum DamagePlan {
	Bands(BandsPlan),
	SnakeGrid(SnakeGridPlan),
	GradientSweep(GradientPlan),
	GradientFill(GradientPlan),
	RectSnake(RectSnakePlan),
}

impl DamagePlan {
	/// Number of work units (bands or tiles) touched by this plan, for the
	/// scheduler's per-draw `work_units` input.
	pub fn work_units(&self) -> u32 {
		match self {
			DamagePlan::Bands(p) => p.bands.len() as u32,
			DamagePlan::SnakeGrid(p) => p.batch_size,
			DamagePlan::GradientSweep(p) => p.rows.len() as u32,
			DamagePlan::GradientFill(p) => p.rows.len() as u32,
			DamagePlan::RectSnake(p) => p.batch_size,
		}
	}
}

/// `plan_next(state, seed, frame_index, grid) -> (plan, next_state)`.
///
/// Total, deterministic, reentrant. `frame_index` only matters for `Bands`
/// (it is the only pattern whose color depends on elapsed time rather than
/// cursor position).
pub fn plan_next(
	state: RuntimeState,
	seed: PatternSeed,
	frame_index: u64,
	grid: Grid,
) -> (DamagePlan, RuntimeState) {
	match state {
		RuntimeState::Bands => {
			let t = frame_index as f32 / 60.0;
			(DamagePlan::Bands(bands_plan(t)), RuntimeState::Bands)
		}
		RuntimeState::SnakeGrid(s) => {
			let (plan, next) = snake_grid_plan(s, grid);
			(DamagePlan::SnakeGrid(plan), RuntimeState::SnakeGrid(next))
		}
		RuntimeState::GradientSweep(s) => {
			let (plan, next) = gradient_sweep_plan(s, grid);
			(DamagePlan::GradientSweep(plan), RuntimeState::GradientSweep(next))
		}
		RuntimeState::GradientFill(s) => {
			let (plan, next) = gradient_fill_plan(s, grid);
			(DamagePlan::GradientFill(plan), RuntimeState::GradientFill(next))
		}
		RuntimeState::RectSnake(s) => {
			let (plan, next) = rect_snake_plan(s, seed, grid);
			(DamagePlan::RectSnake(plan), RuntimeState::RectSnake(next))
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn tile_index_bijection_one_phase() {
		let grid = Grid::new(6, 10);
		let mut seen = vec![false; grid.tile_count() as usize];
		for step in 0..grid.tile_count() {
			let (row, col) = grid.tile_index_from_step(step);
			assert!(row < grid.rows && col < grid.cols);
			let idx = (row * grid.cols + col) as usize;
			assert!(!seen[idx], "tile visited twice at step {step}");
			seen[idx] = true;
		}
		assert!(seen.iter().all(|&v| v));
	}

	#[test]
	fn tile_ndc_bounds_cover_full_range() {
		let grid = Grid::new(4, 4);
		let (min, _) = grid.tile_ndc_bounds(0, 0);
		assert_eq!(min, [-1.0, 1.0 - 2.0 * 1.0 / 4.0]);
		let (_, max) = grid.tile_ndc_bounds(3, 3);
		assert!((max[0] - 1.0).abs() < 1e-6);
		assert!((max[1] - 1.0).abs() < 1e-6);
	}

	#[test]
	fn mix32_is_deterministic() {
		assert_eq!(mix32(1), mix32(1));
		assert_ne!(mix32(1), mix32(2));
	}

	#[test]
	fn window_blend_endpoints() {
		assert_eq!(window_blend(0, 1), 1.0);
		assert_eq!(window_blend(0, 4), 1.0);
		assert_eq!(window_blend(3, 4), 0.0);
	}

	#[test]
	fn plan_next_is_pure() {
		let grid = Grid::default();
		let state = RuntimeState::initial(PatternKind::SnakeGrid);
		let seed = PatternSeed(42);
		let (p1, n1) = plan_next(state, seed, 0, grid);
		let (p2, n2) = plan_next(state, seed, 0, grid);
		assert_eq!(p1, p2);
		assert_eq!(n1, n2);
	}
}
