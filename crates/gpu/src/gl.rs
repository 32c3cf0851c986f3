//! OpenGL renderers. Context creation, shader compilation, and window-system
//! glue (GLFW/EGL/WGL/CGL) are explicitly out of the core's scope; this
//! module only defines the capability surface the core expects from them
//! (`GlContext`) and the pattern-to-draw-call mapping that runs against it.

use dbhash::{hash_rgba8_canonical, HashMode};
use pattern::{Color, DamagePlan, Grid};

use crate::{Capability, Error, FrameOutput, Renderer};

/// What the core needs from an externally-created GL(ES) context: enough to
/// issue the benchmark's draw calls and read the framebuffer back. A real
/// integration backs this with actual `glDrawArrays`/`glReadPixels` calls
/// through a loaded function table; tests and the CPU/GL parity check use
/// `SoftwareGlContext` below.
pub trait GlContext {
	fn clear(&mut self, color: Color);
	fn draw_tile(&mut self, row: u32, col: u32, color: Color);
	fn draw_row(&mut self, row: u32, color: Color);
	fn draw_band(&mut self, band: u32, color: Color);
	/// Hash of whatever per-draw vertex/uniform state the context tracked
	/// this frame — cheap, doesn't require a readback.
	fn state_hash(&self, frame_index: u64) -> u64;
	/// `(pixels, width, height, stride_bytes, rows_bottom_to_top)` for a
	/// full framebuffer readback. GL's origin is bottom-left, so real
	/// backends set `rows_bottom_to_top = true`.
	fn read_pixels(&mut self) -> (&[u8], u32, u32, usize, bool);
}

/// In-memory `GlContext` with byte-identical math to `CpuRenderer`, used so
/// the GL3.3 renderer can be exercised (and hash-compared against the CPU
/// backend) without a real window-system context. A real build swaps this
/// for one backed by actual GL calls without changing `GlRenderer`.
pub struct SoftwareGlContext {
	grid: Grid,
	buffer: Vec<u8>,
	rows_bottom_to_top: bool,
}

impl SoftwareGlContext {
	pub fn new(grid: Grid, rows_bottom_to_top: bool) -> Self {
		let stride = grid.cols as usize * 4;
		let background = pattern::PHASE0_RGB.to_rgba8();
		let mut buf = vec![0u8; stride * grid.rows as usize];
		for px in buf.chunks_exact_mut(4) {
			px.copy_from_slice(&background);
		}
		Self { grid, buffer: buf, rows_bottom_to_top }
	}

	fn stride(&self) -> usize {
		self.grid.cols as usize * 4
	}

	fn storage_row(&self, logical_row: u32) -> u32 {
		if self.rows_bottom_to_top {
			self.grid.rows - 1 - logical_row
		} else {
			logical_row
		}
	}
}

impl GlContext for SoftwareGlContext {
	fn clear(&mut self, color: Color) {
		let bytes = color.to_rgba8();
		for px in self.buffer.chunks_exact_mut(4) {
			px.copy_from_slice(&bytes);
		}
	}

	fn draw_tile(&mut self, row: u32, col: u32, color: Color) {
		if row >= self.grid.rows || col >= self.grid.cols {
			return;
		}
		let stride = self.stride();
		let storage_row = self.storage_row(row);
		let offset = storage_row as usize * stride + col as usize * 4;
		self.buffer[offset..offset + 4].copy_from_slice(&color.to_rgba8());
	}

	fn draw_row(&mut self, row: u32, color: Color) {
		if row >= self.grid.rows {
			return;
		}
		let stride = self.stride();
		let bytes = color.to_rgba8();
		let storage_row = self.storage_row(row);
		let row_start = storage_row as usize * stride;
		for px in self.buffer[row_start..row_start + stride].chunks_exact_mut(4) {
			px.copy_from_slice(&bytes);
		}
	}

	fn draw_band(&mut self, band: u32, color: Color) {
		let cols = self.grid.cols;
		let col_start = band * cols / pattern::BANDS_COUNT;
		let col_end = (band + 1) * cols / pattern::BANDS_COUNT;
		let bytes = color.to_rgba8();
		let stride = self.stride();
		for row in 0..self.grid.rows {
			let storage_row = self.storage_row(row);
			let row_start = storage_row as usize * stride;
			for col in col_start..col_end {
				let offset = row_start + col as usize * 4;
				self.buffer[offset..offset + 4].copy_from_slice(&bytes);
			}
		}
	}

	fn state_hash(&self, frame_index: u64) -> u64 {
		dbhash::fnv1a64_bytes(&frame_index.to_le_bytes())
	}

	fn read_pixels(&mut self) -> (&[u8], u32, u32, usize, bool) {
		(&self.buffer, self.grid.cols, self.grid.rows, self.stride(), self.rows_bottom_to_top)
	}
}

pub struct GlRenderer<C: GlContext> {
	grid: Grid,
	capability: Capability,
	hash_mode: HashMode,
	ctx: C,
}

impl<C: GlContext> GlRenderer<C> {
	pub fn new(grid: Grid, capability: Capability, hash_mode: HashMode, ctx: C) -> Self {
		Self { grid, capability, hash_mode, ctx }
	}

	fn apply_plan(&mut self, plan: &DamagePlan) {
		pattern::damage::validate_plan(plan, self.grid);
		match plan {
			DamagePlan::Bands(p) => {
				for b in &p.bands {
					self.ctx.draw_band(b.band, b.color);
				}
			}
			DamagePlan::SnakeGrid(p) => {
				if let Some(fill) = p.fill_color {
					self.ctx.clear(fill);
				}
				for t in &p.tiles {
					self.ctx.draw_tile(t.row, t.col, t.color);
				}
			}
			DamagePlan::GradientSweep(p) | DamagePlan::GradientFill(p) => {
				for r in &p.rows {
					self.ctx.draw_row(r.row, r.color);
				}
			}
			DamagePlan::RectSnake(p) => {
				if p.force_full_clear {
					if let Some(c) = p.clear_color {
						self.ctx.clear(c);
					}
				}
				for t in &p.tiles {
					self.ctx.draw_tile(t.row, t.col, t.color);
				}
			}
		}
	}
}

impl<C: GlContext> Renderer for GlRenderer<C> {
	fn capability(&self) -> Capability {
		self.capability
	}

	fn work_unit_count(&self) -> u32 {
		self.grid.tile_count()
	}

	fn render_frame(&mut self, plan: &DamagePlan, frame_index: u64) -> Result<FrameOutput, Error> {
		self.apply_plan(plan);

		let mut out = FrameOutput::default();
		if self.hash_mode.wants_state() {
			out.state_hash = Some(self.ctx.state_hash(frame_index));
		}
		if self.hash_mode.wants_pixel() {
			let (pixels, w, h, stride, bottom_up) = self.ctx.read_pixels();
			let hash = hash_rgba8_canonical(pixels, w, h, stride, bottom_up);
			if hash == 0 {
				return Err(Error::HashReadback("glReadPixels returned zero-size".into()));
			}
			out.pixel_hash = Some(hash);
		}
		Ok(out)
	}

	fn shutdown(&mut self) {}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::cpu::CpuRenderer;
	use pattern::{plan_next, PatternKind, PatternSeed, RuntimeState};

	#[test]
	fn gl3_3_matches_cpu_for_bands() {
		let grid = Grid::new(60, 100);
		let mut cpu = CpuRenderer::new(grid, HashMode::Pixel);
		let mut gl = GlRenderer::new(
			grid,
			Capability::Gl3_3,
			HashMode::Pixel,
			SoftwareGlContext::new(grid, false),
		);

		let mut state_cpu = RuntimeState::initial(PatternKind::Bands);
		let mut state_gl = RuntimeState::initial(PatternKind::Bands);
		let seed = PatternSeed(1);

		for frame in 0..8u64 {
			let (plan_a, next_a) = plan_next(state_cpu, seed, frame, grid);
			state_cpu = next_a;
			let (plan_b, next_b) = plan_next(state_gl, seed, frame, grid);
			state_gl = next_b;

			let out_cpu = cpu.render_frame(&plan_a, frame).unwrap();
			let out_gl = gl.render_frame(&plan_b, frame).unwrap();
			assert_eq!(out_cpu.pixel_hash, out_gl.pixel_hash);
		}
	}
}
