//! Pure owner-selection and EWMA bookkeeping for the device-group
//! scheduler. No ash types here on purpose: this is the part of the
//! renderer whose correctness is checked by spec-level properties, and it
//! should be testable without a GPU.

pub const MAX_GPU_COUNT: usize = 8;
pub const EMA_KEEP: f64 = 0.9;
pub const EMA_NEW: f64 = 0.1;
pub const SLOW_GPU_RATIO_THRESHOLD: f64 = 1.5;
pub const EMA_SEED_MS_PER_UNIT: f64 = 0.2;
pub const DEFAULT_BUDGET_NS: u64 = 16_666_666;
pub const DEFAULT_SAFETY_NS: u64 = 2_000_000;

/// Per-GPU EWMA state for one logical device. A single GPU (index 0) is
/// always assumed capable of rendering the whole frame alone.
#[derive(Clone, Copy, Debug)]
pub struct SchedulerState {
	pub gpu_count: u32,
	pub ema_ms_per_work_unit: [f64; MAX_GPU_COUNT],
}

impl SchedulerState {
	pub fn new(gpu_count: u32) -> Self {
		let gpu_count = gpu_count.min(MAX_GPU_COUNT as u32).max(1);
		Self { gpu_count, ema_ms_per_work_unit: [EMA_SEED_MS_PER_UNIT; MAX_GPU_COUNT] }
	}

	/// Owner selection for one pending draw. `now_ns` and `frame_start_ns`
	/// are `CLOCK_MONOTONIC`-style timestamps in nanoseconds, passed in
	/// explicitly so the algorithm stays a pure function of its inputs.
	pub fn select_owner(
		&self,
		candidate_owner: u32,
		work_units: u32,
		frame_start_ns: u64,
		budget_ns: u64,
		safety_ns: u64,
		now_ns: u64,
	) -> u32 {
		let mut owner = candidate_owner;
		if owner >= self.gpu_count {
			owner = 0;
		}
		if owner == 0 || self.gpu_count <= 1 {
			return 0;
		}

		let base = self.ema_ms_per_work_unit[0];
		if base > 0.0 {
			let ratio = self.ema_ms_per_work_unit[owner as usize] / base;
			if ratio > SLOW_GPU_RATIO_THRESHOLD {
				return 0;
			}
		}

		let units = work_units.max(1) as f64;
		let predicted_ns = (self.ema_ms_per_work_unit[owner as usize] * 1.0e6 * units) as u64;
		let deadline = frame_start_ns + budget_ns.saturating_sub(safety_ns);
		if now_ns.saturating_add(predicted_ns) > deadline {
			return 0;
		}
		owner
	}

	/// Updates the EWMA for every GPU that did work last frame, from
	/// measured per-GPU elapsed nanoseconds (the timestamp-query path).
	pub fn update_from_timestamps(&mut self, elapsed_ns: &[u64], units: &[u32]) {
		for g in 0..self.gpu_count as usize {
			if units[g] == 0 {
				continue;
			}
			let elapsed_ms = elapsed_ns[g] as f64 / 1.0e6;
			let ms_per_unit = elapsed_ms / units[g] as f64;
			self.update_one(g, ms_per_unit);
		}
	}

	/// Fallback EWMA update when `timestampValidBits == 0`: attribute
	/// `frame_ms` to owners proportionally to the units they did.
	pub fn update_fallback(&mut self, frame_ms: f64, units: &[u32]) {
		let total: u32 = units.iter().take(self.gpu_count as usize).sum();
		if total == 0 {
			return;
		}
		let ms_per_unit = frame_ms / total as f64;
		for g in 0..self.gpu_count as usize {
			if units[g] == 0 {
				continue;
			}
			self.update_one(g, ms_per_unit);
		}
	}

	fn update_one(&mut self, gpu: usize, ms_per_unit: f64) {
		self.ema_ms_per_work_unit[gpu] =
			EMA_KEEP * self.ema_ms_per_work_unit[gpu] + EMA_NEW * ms_per_unit;
	}
}

/// Counts bands assigned to each GPU this frame, for the bands-pattern
/// fallback EWMA path (`renderer_vulkan..._scheduler.c`'s `bands_per_gpu`).
pub fn units_per_gpu_from_owners(owners: &[u32], gpu_count: u32) -> [u32; MAX_GPU_COUNT] {
	let mut units = [0u32; MAX_GPU_COUNT];
	for &owner in owners {
		let idx = (owner as usize).min(gpu_count as usize - 1);
		units[idx] += 1;
	}
	units
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn never_returns_out_of_range_owner() {
		let sched = SchedulerState::new(3);
		for candidate in 0..10u32 {
			let owner = sched.select_owner(candidate, 10, 0, DEFAULT_BUDGET_NS, DEFAULT_SAFETY_NS, 0);
			assert!(owner < sched.gpu_count);
		}
	}

	#[test]
	fn single_gpu_never_delegates() {
		let sched = SchedulerState::new(1);
		for candidate in 0..4u32 {
			assert_eq!(
				sched.select_owner(candidate, 10, 0, DEFAULT_BUDGET_NS, DEFAULT_SAFETY_NS, 0),
				0
			);
		}
	}

	#[test]
	fn fast_path_demotes_when_owner_much_slower() {
		let mut sched = SchedulerState::new(2);
		sched.ema_ms_per_work_unit[0] = 0.2;
		sched.ema_ms_per_work_unit[1] = 0.5; // ratio 2.5 > 1.5
		let owner = sched.select_owner(1, 1, 0, DEFAULT_BUDGET_NS, DEFAULT_SAFETY_NS, 0);
		assert_eq!(owner, 0);
	}

	#[test]
	fn keeps_owner_when_it_fits_the_budget() {
		let sched = SchedulerState::new(2); // both ema = 0.2
		let owner = sched.select_owner(1, 1, 0, DEFAULT_BUDGET_NS, DEFAULT_SAFETY_NS, 0);
		assert_eq!(owner, 1);
	}

	#[test]
	fn falls_back_to_zero_when_predicted_blows_budget() {
		let sched = SchedulerState::new(2);
		// now is already past the deadline.
		let owner =
			sched.select_owner(1, 1, 0, DEFAULT_BUDGET_NS, DEFAULT_SAFETY_NS, DEFAULT_BUDGET_NS);
		assert_eq!(owner, 0);
	}

	#[test]
	fn repeated_slow_frames_demote_permanently() {
		let mut sched = SchedulerState::new(2);
		// Drive GPU 1's ema above the 1.5x threshold via timestamp feedback.
		for _ in 0..50 {
			sched.update_from_timestamps(&[0, 2_000_000], &[0, 1]);
		}
		assert!(sched.ema_ms_per_work_unit[1] / sched.ema_ms_per_work_unit[0] > SLOW_GPU_RATIO_THRESHOLD);
		assert_eq!(sched.select_owner(1, 1, 0, DEFAULT_BUDGET_NS, DEFAULT_SAFETY_NS, 0), 0);
	}

	#[test]
	fn selection_respects_budget_invariant_when_nonzero() {
		let sched = SchedulerState::new(2);
		let frame_start = 1_000_000u64;
		let now = 1_000_100u64;
		let owner =
			sched.select_owner(1, 4, frame_start, DEFAULT_BUDGET_NS, DEFAULT_SAFETY_NS, now);
		if owner != 0 {
			let ratio = sched.ema_ms_per_work_unit[owner as usize] / sched.ema_ms_per_work_unit[0];
			assert!(ratio <= SLOW_GPU_RATIO_THRESHOLD);
			let predicted_ns = (sched.ema_ms_per_work_unit[owner as usize] * 1.0e6 * 4.0) as u64;
			assert!(now + predicted_ns <= frame_start + DEFAULT_BUDGET_NS - DEFAULT_SAFETY_NS);
		}
	}
}
