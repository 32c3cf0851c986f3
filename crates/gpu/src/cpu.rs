//! Reference CPU renderer: one RGBA8 buffer-object, one pixel per tile.
//! Every other backend's pixel output is expected to hash-match this one
//! (spec's testable property #1).

use dbhash::{hash_rgba8_canonical, HashMode};
use pattern::{Color, DamagePlan, Grid};

use crate::{Capability, Error, FrameOutput, Renderer};

pub struct CpuRenderer {
	grid: Grid,
	hash_mode: HashMode,
	/// Persistent image; damage plans mutate this in place so incremental
	/// patterns see their own previous frame, and it's hashed as-is.
	history: Vec<u8>,
}

impl CpuRenderer {
	pub fn new(grid: Grid, hash_mode: HashMode) -> Self {
		let stride = grid.cols as usize * 4;
		let background = pattern::PHASE0_RGB.to_rgba8();
		let mut buf = vec![0u8; stride * grid.rows as usize];
		for px in buf.chunks_exact_mut(4) {
			px.copy_from_slice(&background);
		}
		Self { grid, hash_mode, history: buf }
	}

	fn stride(&self) -> usize {
		self.grid.cols as usize * 4
	}

	fn set_pixel(&mut self, row: u32, col: u32, color: Color) {
		if row >= self.grid.rows || col >= self.grid.cols {
			return;
		}
		let stride = self.stride();
		let offset = row as usize * stride + col as usize * 4;
		self.history[offset..offset + 4].copy_from_slice(&color.to_rgba8());
	}

	fn fill_row(&mut self, row: u32, color: Color) {
		if row >= self.grid.rows {
			return;
		}
		let stride = self.stride();
		let bytes = color.to_rgba8();
		let row_start = row as usize * stride;
		for px in self.history[row_start..row_start + stride].chunks_exact_mut(4) {
			px.copy_from_slice(&bytes);
		}
	}

	fn fill_all(&mut self, color: Color) {
		let bytes = color.to_rgba8();
		for px in self.history.chunks_exact_mut(4) {
			px.copy_from_slice(&bytes);
		}
	}

	fn fill_band(&mut self, band: u32, color: Color) {
		let cols = self.grid.cols;
		let col_start = band * cols / pattern::BANDS_COUNT;
		let col_end = (band + 1) * cols / pattern::BANDS_COUNT;
		let bytes = color.to_rgba8();
		let stride = self.stride();
		for row in 0..self.grid.rows {
			let row_start = row as usize * stride;
			for col in col_start..col_end {
				let offset = row_start + col as usize * 4;
				self.history[offset..offset + 4].copy_from_slice(&bytes);
			}
		}
	}

	fn apply_plan(&mut self, plan: &DamagePlan) {
		pattern::damage::validate_plan(plan, self.grid);
		match plan {
			DamagePlan::Bands(p) => {
				for band in &p.bands {
					self.fill_band(band.band, band.color);
				}
			}
			DamagePlan::SnakeGrid(p) => {
				if let Some(fill) = p.fill_color {
					self.fill_all(fill);
				}
				for t in &p.tiles {
					self.set_pixel(t.row, t.col, t.color);
				}
			}
			DamagePlan::GradientSweep(p) | DamagePlan::GradientFill(p) => {
				for r in &p.rows {
					self.fill_row(r.row, r.color);
				}
			}
			DamagePlan::RectSnake(p) => {
				if p.force_full_clear {
					if let Some(c) = p.clear_color {
						self.fill_all(c);
					}
				}
				for t in &p.tiles {
					self.set_pixel(t.row, t.col, t.color);
				}
			}
		}
	}

	/// A cheap stand-in for "hash the renderer's internal vertex/uniform
	/// state": the CPU backend has no separate state from its pixels, so
	/// its state hash is the frame index mixed with the plan's touched
	/// work-unit count.
	fn state_hash(&self, plan: &DamagePlan, frame_index: u64) -> u64 {
		let h = dbhash::fnv1a64_bytes(&frame_index.to_le_bytes());
		dbhash::fnv1a64_mix_u64(h, plan.work_units() as u64)
	}
}

impl Renderer for CpuRenderer {
	fn capability(&self) -> Capability {
		Capability::CpuOffscreenBo
	}

	fn work_unit_count(&self) -> u32 {
		self.grid.tile_count()
	}

	fn render_frame(&mut self, plan: &DamagePlan, frame_index: u64) -> Result<FrameOutput, Error> {
		self.apply_plan(plan);

		let mut out = FrameOutput::default();
		if self.hash_mode.wants_state() {
			out.state_hash = Some(self.state_hash(plan, frame_index));
		}
		if self.hash_mode != HashMode::None {
			// The CPU backend's "bo_hash" is the content itself: always
			// compute it when any hashing is requested, state or pixel,
			// since for this backend they are the same thing.
			let h = hash_rgba8_canonical(
				&self.history,
				self.grid.cols,
				self.grid.rows,
				self.stride(),
				false,
			);
			if h == 0 {
				return Err(Error::HashReadback("zero-size cpu readback".into()));
			}
			out.pixel_hash = Some(h);
		}
		Ok(out)
	}

	fn shutdown(&mut self) {}
}

#[cfg(test)]
mod tests {
	use super::*;
	use pattern::{plan_next, PatternKind, PatternSeed, RuntimeState};

	#[test]
	fn bands_four_frames_hash_is_deterministic() {
		let grid = Grid::new(600, 1000);
		let mut renderer = CpuRenderer::new(grid, HashMode::Pixel);
		let mut state = RuntimeState::initial(PatternKind::Bands);
		let seed = PatternSeed(1);
		let mut final_hash = 0;
		let mut aggregate = dbhash::FNV_OFFSET_BASIS;
		for frame in 0..4u64 {
			let (plan, next) = plan_next(state, seed, frame, grid);
			state = next;
			let out = renderer.render_frame(&plan, frame).unwrap();
			let h = out.pixel_hash.unwrap();
			final_hash = h;
			aggregate = dbhash::fnv1a64_mix_u64(aggregate, h);
		}

		// Re-run independently; must reproduce bit-identical hashes.
		let mut renderer2 = CpuRenderer::new(grid, HashMode::Pixel);
		let mut state2 = RuntimeState::initial(PatternKind::Bands);
		let mut final_hash2 = 0;
		let mut aggregate2 = dbhash::FNV_OFFSET_BASIS;
		for frame in 0..4u64 {
			let (plan, next) = plan_next(state2, seed, frame, grid);
			state2 = next;
			let out = renderer2.render_frame(&plan, frame).unwrap();
			let h = out.pixel_hash.unwrap();
			final_hash2 = h;
			aggregate2 = dbhash::fnv1a64_mix_u64(aggregate2, h);
		}

		assert_eq!(final_hash, final_hash2);
		assert_eq!(aggregate, aggregate2);
	}

	#[test]
	fn snake_grid_two_phases_runs_to_completion() {
		let grid = Grid::new(600, 1000);
		let mut renderer = CpuRenderer::new(grid, HashMode::Pixel);
		let mut state = RuntimeState::initial(PatternKind::SnakeGrid);
		let seed = PatternSeed(1);
		for frame in 0..1200u64 {
			let (plan, next) = plan_next(state, seed, frame, grid);
			state = next;
			renderer.render_frame(&plan, frame).unwrap();
		}
	}
}
