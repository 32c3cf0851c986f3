//! DriverBench core: pattern state, hash tracking, and the frame loop that
//! drives any `gpu::Renderer` (CPU, GL, Vulkan, or the KMS atomic
//! presenter, which also implements the trait). This crate never opens a
//! window, a GPU context, or a DRM node — `cli` builds the concrete
//! renderer and hands it to `DriverLoop::run`.

pub use gpu::Error;

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use dbhash::{HashMode, HashTracker, ReportMode};
use gpu::{Api, Capability, FrameOutput, Renderer, RendererKind};
use pattern::{plan_next, Grid, PatternKind, PatternSeed, RuntimeState};

/// `--display` selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Display {
	Offscreen,
	GlfwWindow,
	LinuxKmsAtomic,
}

impl Display {
	pub fn parse(s: &str) -> Option<Self> {
		match s {
			"offscreen" => Some(Display::Offscreen),
			"glfw_window" => Some(Display::GlfwWindow),
			"linux_kms_atomic" => Some(Display::LinuxKmsAtomic),
			_ => None,
		}
	}

	pub fn name(self) -> &'static str {
		match self {
			Display::Offscreen => "offscreen",
			Display::GlfwWindow => "glfw_window",
			Display::LinuxKmsAtomic => "linux_kms_atomic",
		}
	}
}

/// Fully-resolved run configuration; `cli::Args::into_config` is the only
/// place that builds one from flags/env.
#[derive(Clone, Debug)]
pub struct Config {
	pub display: Display,
	pub api: Api,
	pub renderer: RendererKind,
	pub kms_card: String,
	pub allow_remote_display: bool,
	pub benchmark_mode: PatternKind,
	pub fps_cap: f32,
	pub framebuffer_hash: bool,
	pub hash_every_frame: bool,
	pub frame_limit: u32,
	pub offscreen_frames: u32,
	pub random_seed: u32,
	pub vsync: bool,
	pub grid: Grid,
}

impl Config {
	/// `--framebuffer-hash` gates whether a renderer computes a pixel hash
	/// at all; when it's off only the (cheaper) state hash is requested.
	pub fn hash_mode(&self) -> HashMode {
		if self.framebuffer_hash {
			HashMode::Pixel
		} else {
			HashMode::State
		}
	}

	/// `--hash-every-frame` gates whether the shutdown line also reports
	/// the running aggregate (which requires the tracker to have folded in
	/// every frame) or just the last frame's hash.
	pub fn report_mode(&self) -> ReportMode {
		if self.hash_every_frame {
			ReportMode::Both
		} else {
			ReportMode::Final
		}
	}

	/// `0` from the CLI means "unlimited"; an offscreen run with no explicit
	/// `--frame-limit` stops after `--offscreen-frames` instead of running
	/// forever.
	pub fn effective_frame_limit(&self) -> u32 {
		if self.display == Display::Offscreen && self.frame_limit == 0 {
			self.offscreen_frames
		} else {
			self.frame_limit
		}
	}
}

/// Per-renderer hash key, preserved from the original implementation's
/// differing conventions (`bo_hash` vs `framebuffer_hash` vs `hash`).
pub fn hash_key(capability: Capability) -> &'static str {
	match capability {
		Capability::CpuOffscreenBo => "bo_hash",
		Capability::Gl1_5Gles1_1 | Capability::Gl3_3 => "framebuffer_hash",
		Capability::VulkanDeviceGroupMultiGpu => "hash",
	}
}

fn frame_hash(out: &FrameOutput) -> Option<u64> {
	out.pixel_hash.or(out.state_hash)
}

/// One backend's running totals, handed to the caller's logging closure
/// every 5s and once more at shutdown.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameStats {
	pub frames: u64,
	pub work_units: u64,
	pub elapsed_ms: f64,
}

impl FrameStats {
	pub fn fps(&self) -> f64 {
		if self.elapsed_ms > 0.0 {
			self.frames as f64 / (self.elapsed_ms / 1000.0)
		} else {
			0.0
		}
	}

	pub fn ms_per_frame(&self) -> f64 {
		if self.frames > 0 {
			self.elapsed_ms / self.frames as f64
		} else {
			0.0
		}
	}
}

const PERIODIC_LOG_INTERVAL: Duration = Duration::from_millis(5000);
const FPS_CAP_SLEEP_CHUNK: Duration = Duration::from_millis(100);

/// §4.5's orchestration layer: pattern state advance, frame cadence,
/// should-stop/frame-limit, periodic/final stats, and hash recording — all
/// independent of which `Renderer` is plugged in.
pub struct DriverLoop<'a> {
	config: &'a Config,
	should_stop: &'a AtomicBool,
}

impl<'a> DriverLoop<'a> {
	pub fn new(config: &'a Config, should_stop: &'a AtomicBool) -> Self {
		Self { config, should_stop }
	}

	/// Runs `renderer` to completion. `on_stats(stats, is_final)` is called
	/// every 5s of wall-clock and once more when the loop exits; the
	/// returned tracker has already folded in every committed frame.
	pub fn run(
		&self,
		renderer: &mut dyn Renderer,
		mut on_stats: impl FnMut(&FrameStats, bool),
	) -> Result<HashTracker, Error> {
		let grid = self.config.grid;
		let seed = PatternSeed(self.config.random_seed);
		let mut state = RuntimeState::initial(self.config.benchmark_mode);
		let mut tracker =
			HashTracker::new(hash_key(renderer.capability()), self.config.report_mode());

		let frame_limit = self.config.effective_frame_limit();
		let start = Instant::now();
		let mut last_log = start;
		let mut stats = FrameStats::default();
		let mut frame_index: u64 = 0;

		loop {
			if self.should_stop.load(Ordering::Relaxed) {
				break;
			}
			if frame_limit != 0 && frame_index >= frame_limit as u64 {
				break;
			}

			let frame_start = Instant::now();
			let (plan, next_state) = plan_next(state, seed, frame_index, grid);

			let out = loop {
				match renderer.render_frame(&plan, frame_index) {
					Ok(out) => break Some(out),
					Err(e) if e.is_recoverable() => {
						if self.should_stop.load(Ordering::Relaxed) {
							break None;
						}
						continue;
					}
					Err(e) => return Err(e),
				}
			};
			let Some(out) = out else { break };

			// Pattern state commits exactly once per frame, only after the
			// frame that state produced actually rendered successfully.
			state = next_state;
			if let Some(h) = frame_hash(&out) {
				tracker.record(h);
			}
			stats.frames += 1;
			stats.work_units += plan.work_units() as u64;
			stats.elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

			self.sleep_for_fps_cap(frame_start);

			if last_log.elapsed() >= PERIODIC_LOG_INTERVAL {
				on_stats(&stats, false);
				last_log = Instant::now();
			}
			frame_index += 1;
		}

		on_stats(&stats, true);
		renderer.shutdown();
		Ok(tracker)
	}

	fn sleep_for_fps_cap(&self, frame_start: Instant) {
		if self.config.fps_cap <= 0.0 {
			return;
		}
		let target = Duration::from_secs_f32(1.0 / self.config.fps_cap);
		loop {
			let elapsed = frame_start.elapsed();
			if elapsed >= target || self.should_stop.load(Ordering::Relaxed) {
				return;
			}
			let remaining = target - elapsed;
			std::thread::sleep(remaining.min(FPS_CAP_SLEEP_CHUNK));
		}
	}
}

/// §6 "Remote-display guard": refuse a forwarded X11 session over SSH
/// unless explicitly allowed.
pub fn remote_display_guard(allow_remote_display: bool) -> Result<(), Error> {
	let display = std::env::var("DISPLAY").unwrap_or_default();
	let is_forwarded = display.starts_with("localhost:") || display.starts_with("127.0.0.1:");
	let has_ssh_env = ["SSH_CONNECTION", "SSH_CLIENT", "SSH_TTY"]
		.iter()
		.any(|var| std::env::var_os(var).is_some());

	if is_forwarded && has_ssh_env && !allow_remote_display {
		return Err(Error::Config("Refusing forwarded X11 session".into()));
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use gpu::cpu::CpuRenderer;

	#[test]
	fn driver_loop_stops_at_frame_limit() {
		let config = Config {
			display: Display::Offscreen,
			api: Api::Cpu,
			renderer: RendererKind::Auto,
			kms_card: String::new(),
			allow_remote_display: false,
			benchmark_mode: PatternKind::Bands,
			fps_cap: 0.0,
			framebuffer_hash: true,
			hash_every_frame: true,
			frame_limit: 10,
			offscreen_frames: 10,
			random_seed: 1,
			vsync: false,
			grid: Grid::new(60, 100),
		};
		let should_stop = AtomicBool::new(false);
		let loop_ = DriverLoop::new(&config, &should_stop);
		let mut renderer = CpuRenderer::new(config.grid, config.hash_mode());
		let mut finals = 0;
		let tracker = loop_
			.run(&mut renderer, |stats, is_final| {
				if is_final {
					finals += 1;
					assert_eq!(stats.frames, 10);
				}
			})
			.unwrap();
		assert_eq!(finals, 1);
		assert!(tracker.report_line().unwrap().starts_with("bo_hash_final="));
	}

	#[test]
	fn remote_display_guard_blocks_forwarded_ssh_session() {
		std::env::set_var("DISPLAY", "localhost:10.0");
		std::env::set_var("SSH_CLIENT", "1.2.3.4 1 2");
		assert!(remote_display_guard(false).is_err());
		assert!(remote_display_guard(true).is_ok());
		std::env::remove_var("DISPLAY");
		std::env::remove_var("SSH_CLIENT");
	}
}
