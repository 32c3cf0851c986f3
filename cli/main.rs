//! `driverbench` binary: CLI/env parsing, signal handling, logging, and the
//! glue that builds the concrete `gpu::Renderer` the core's `DriverLoop`
//! drives. All of this lives outside the `driverbench` library crate on
//! purpose — see that crate's doc comment.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use clap::Parser;
use driverbench::{Config, Display, DriverLoop, Error, FrameStats};
use gpu::gl::{GlRenderer, SoftwareGlContext};
use gpu::{cpu::CpuRenderer, Api, Capability, Renderer, RendererKind};
use pattern::{Grid, PatternKind};

/// Flag table from spec §6, one field per flag, each with a matching
/// `DRIVERBENCH_*` env fallback via clap's `env` attribute.
#[derive(Parser, Debug)]
#[command(name = "driverbench", about = "Deterministic graphics driver benchmark")]
struct Args {
	#[arg(long, env = "DRIVERBENCH_DISPLAY")]
	display: String,

	#[arg(long, env = "DRIVERBENCH_API", default_value = "auto")]
	api: String,

	#[arg(long, env = "DRIVERBENCH_RENDERER", default_value = "auto")]
	renderer: String,

	#[arg(long = "kms-card", env = "DRIVERBENCH_KMS_CARD", default_value = "/dev/dri/card0")]
	kms_card: String,

	#[arg(long = "allow-remote-display", env = "DRIVERBENCH_ALLOW_REMOTE_DISPLAY", default_value_t = false)]
	allow_remote_display: bool,

	#[arg(long = "benchmark-mode", env = "DRIVERBENCH_BENCHMARK_MODE", default_value = "bands")]
	benchmark_mode: String,

	#[arg(long = "fps-cap", env = "DRIVERBENCH_FPS_CAP", default_value_t = 0.0)]
	fps_cap: f32,

	#[arg(long = "framebuffer-hash", env = "DRIVERBENCH_FRAMEBUFFER_HASH", default_value_t = true)]
	framebuffer_hash: bool,

	#[arg(long = "hash-every-frame", env = "DRIVERBENCH_HASH_EVERY_FRAME", default_value_t = false)]
	hash_every_frame: bool,

	#[arg(long = "frame-limit", env = "DRIVERBENCH_FRAME_LIMIT", default_value_t = 0)]
	frame_limit: u32,

	#[arg(long = "offscreen", env = "DRIVERBENCH_OFFSCREEN", default_value_t = false)]
	offscreen: bool,

	#[arg(long = "offscreen-frames", env = "DRIVERBENCH_OFFSCREEN_FRAMES", default_value_t = 600)]
	offscreen_frames: u32,

	#[arg(long = "random-seed", env = "DRIVERBENCH_RANDOM_SEED", default_value = "1")]
	random_seed: String,

	#[arg(long = "vsync", env = "DRIVERBENCH_VSYNC", default_value = "1")]
	vsync: String,
}

fn parse_seed(s: &str) -> Result<u32, Error> {
	if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
		u32::from_str_radix(hex, 16).map_err(|e| Error::Config(format!("--random-seed: {e}")))
	} else {
		s.parse().map_err(|e| Error::Config(format!("--random-seed: {e}")))
	}
}

fn parse_bool_like(s: &str) -> Result<bool, Error> {
	match s.to_ascii_lowercase().as_str() {
		"1" | "true" | "on" => Ok(true),
		"0" | "false" | "off" => Ok(false),
		_ => Err(Error::Config(format!("expected a boolean, got {s:?}"))),
	}
}

impl Args {
	fn into_config(self) -> Result<Config, Error> {
		let mut display = Display::parse(&self.display)
			.ok_or_else(|| Error::Config(format!("unknown --display {:?}", self.display)))?;
		if self.offscreen {
			display = Display::Offscreen;
		}
		let api = Api::parse(&self.api)
			.ok_or_else(|| Error::Config(format!("unknown --api {:?}", self.api)))?;
		let renderer = RendererKind::parse(&self.renderer)
			.ok_or_else(|| Error::Config(format!("unknown --renderer {:?}", self.renderer)))?;
		let benchmark_mode = PatternKind::parse(&self.benchmark_mode)
			.ok_or_else(|| Error::Config(format!("unknown --benchmark-mode {:?}", self.benchmark_mode)))?;

		Ok(Config {
			display,
			api,
			renderer,
			kms_card: self.kms_card,
			allow_remote_display: self.allow_remote_display,
			benchmark_mode,
			fps_cap: self.fps_cap,
			framebuffer_hash: self.framebuffer_hash,
			hash_every_frame: self.hash_every_frame,
			frame_limit: self.frame_limit,
			offscreen_frames: self.offscreen_frames,
			random_seed: parse_seed(&self.random_seed)?,
			vsync: parse_bool_like(&self.vsync)?,
			grid: Grid::default(),
		})
	}
}

fn log_stats(backend: &str, api: Api, renderer: RendererKind, capability: Capability, stats: &FrameStats, is_final: bool) {
	let cadence = if is_final { "final" } else { "periodic" };
	log::info!(
		target: "driverbench",
		"[{backend}][info] api={api:?} renderer={renderer:?} backend={backend} capability={capability} frames={} work_units={} elapsed_ms={:.3} fps={:.3} ms_per_frame={:.3} cadence={cadence}",
		stats.frames,
		stats.work_units,
		stats.elapsed_ms,
		stats.fps(),
		stats.ms_per_frame(),
	);
}

/// Builds the one `Renderer` the (display, api, renderer) combination
/// resolves to. `offscreen` and `glfw_window` both draw into an in-process
/// `SoftwareGlContext`/`CpuRenderer`/Vulkan device group — the window-
/// system glue a real `glfw_window` build would need to create an actual
/// OS window is explicitly out of the core's scope (see `gpu::gl`).
fn build_renderer(config: &Config) -> Result<(Box<dyn Renderer>, &'static str), Error> {
	let grid = config.grid;
	let hash_mode = config.hash_mode();

	match config.display {
		Display::Offscreen | Display::GlfwWindow => match config.api {
			Api::Cpu => Ok((Box::new(CpuRenderer::new(grid, hash_mode)), "offscreen")),
			Api::OpenGl => {
				let capability = match config.renderer {
					RendererKind::Gl1_5Gles1_1 => Capability::Gl1_5Gles1_1,
					_ => Capability::Gl3_3,
				};
				let ctx = SoftwareGlContext::new(grid, false);
				Ok((Box::new(GlRenderer::new(grid, capability, hash_mode, ctx)), "offscreen"))
			}
			#[cfg(feature = "vulkan")]
			Api::Vulkan => {
				let renderer = gpu::vulkan::VulkanRenderer::new_offscreen(grid, hash_mode, false)?;
				Ok((Box::new(renderer), "offscreen"))
			}
			#[cfg(not(feature = "vulkan"))]
			Api::Vulkan => Err(Error::Config("vulkan support not built into this binary".into())),
			Api::Auto => {
				#[cfg(feature = "vulkan")]
				{
					if let Ok(renderer) = gpu::vulkan::VulkanRenderer::new_offscreen(grid, hash_mode, false) {
						return Ok((Box::new(renderer), "offscreen"));
					}
				}
				Ok((Box::new(CpuRenderer::new(grid, hash_mode)), "offscreen"))
			}
		},
		Display::LinuxKmsAtomic => build_kms_renderer(config),
	}
}

#[cfg(feature = "linux-kms")]
fn build_kms_renderer(config: &Config) -> Result<(Box<dyn Renderer>, &'static str), Error> {
	let ctx = SoftwareGlContext::new(config.grid, true);
	let presenter = kms::AtomicPresenter::new(
		std::path::Path::new(&config.kms_card),
		config.grid,
		config.hash_mode(),
		ctx,
	)?;
	Ok((Box::new(presenter), "linux_kms_atomic"))
}

#[cfg(not(feature = "linux-kms"))]
fn build_kms_renderer(_config: &Config) -> Result<(Box<dyn Renderer>, &'static str), Error> {
	Err(Error::Config("linux-kms feature not enabled in this build".into()))
}

fn run() -> Result<(), Error> {
	let args = Args::parse();
	let config = args.into_config()?;

	driverbench::remote_display_guard(config.allow_remote_display)?;

	let should_stop = Arc::new(AtomicBool::new(false));
	for sig in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
		signal_hook::flag::register(sig, Arc::clone(&should_stop))
			.map_err(|e| Error::Config(format!("signal_hook::flag::register: {e}")))?;
	}

	let (mut renderer, backend) = build_renderer(&config)?;
	let api = config.api;
	let renderer_kind = config.renderer;
	let capability = renderer.capability();

	let driver_loop = DriverLoop::new(&config, &should_stop);
	let tracker = driver_loop.run(renderer.as_mut(), |stats, is_final| {
		log_stats(backend, api, renderer_kind, capability, stats, is_final);
	})?;

	if let Some(line) = tracker.report_line() {
		log::info!(target: "driverbench", "[{backend}][info] {line}");
	}
	Ok(())
}

fn main() {
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
	if let Err(e) = run() {
		eprintln!("[driverbench][error] {e}");
		std::process::exit(1);
	}
}
