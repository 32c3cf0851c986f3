//! Renderer backends that turn a `pattern::DamagePlan` into pixels (or a
//! state hash standing in for them) and report timing back to the driver
//! loop. The core never creates a window, an EGL/WGL/CGL context, or
//! compiles a shader from disk — those are the caller's job; this crate
//! only consumes the capability surface (a `GlContext`, a `VkPhysicalDevice`
//! list, ...) it is handed.

pub mod cpu;
pub mod gl;

#[cfg(feature = "vulkan")]
pub mod vulkan;

use pattern::DamagePlan;

/// Error kinds the core raises, matching the benchmark's error policy table.
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("config: {0}")]
	Config(String),
	#[error("asset io: {0}")]
	AssetIo(String),
	#[error("gpu init: {0}")]
	GpuInit(String),
	#[error("gpu lost: {0}")]
	GpuLoss(String),
	/// Recoverable: swapchain is stale and must be rebuilt.
	#[error("swapchain stale: {0}")]
	SwapStale(String),
	/// Recoverable: a fence/acquire wait timed out, retry next iteration.
	#[error("timeout")]
	Timeout,
	/// Recoverable: a blocking syscall was interrupted, retry.
	#[error("interrupted")]
	Interrupted,
	#[error("hash readback failed: {0}")]
	HashReadback(String),
}

impl Error {
	/// Whether the driver loop should retry the current frame instead of
	/// treating this as fatal.
	pub fn is_recoverable(&self) -> bool {
		matches!(self, Error::SwapStale(_) | Error::Timeout | Error::Interrupted)
	}
}

/// Short tag describing a renderer's detected fast path, used in the
/// `capability=<tag>` log field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capability {
	CpuOffscreenBo,
	Gl1_5Gles1_1,
	Gl3_3,
	VulkanDeviceGroupMultiGpu,
}

impl std::fmt::Display for Capability {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let s = match self {
			Capability::CpuOffscreenBo => "cpu_offscreen_bo",
			Capability::Gl1_5Gles1_1 => "gl1_5_gles1_1",
			Capability::Gl3_3 => "gl3_3",
			Capability::VulkanDeviceGroupMultiGpu => "vulkan_device_group_multi_gpu",
		};
		f.write_str(s)
	}
}

/// `--api` selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Api {
	Auto,
	Cpu,
	OpenGl,
	Vulkan,
}

impl Api {
	pub fn parse(s: &str) -> Option<Self> {
		match s {
			"auto" => Some(Api::Auto),
			"cpu" => Some(Api::Cpu),
			"opengl" => Some(Api::OpenGl),
			"vulkan" => Some(Api::Vulkan),
			_ => None,
		}
	}
}

/// `--renderer` selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RendererKind {
	Auto,
	Gl1_5Gles1_1,
	Gl3_3,
}

impl RendererKind {
	pub fn parse(s: &str) -> Option<Self> {
		match s {
			"auto" => Some(RendererKind::Auto),
			"gl1_5_gles1_1" => Some(RendererKind::Gl1_5Gles1_1),
			"gl3_3" => Some(RendererKind::Gl3_3),
			_ => None,
		}
	}
}

/// What a renderer measured for one frame, handed back to the hash tracker
/// and the driver loop's FPS accounting.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameOutput {
	pub state_hash: Option<u64>,
	pub pixel_hash: Option<u64>,
}

/// The renderer vtable: `init` happens in the concrete constructor (backends
/// need different descriptors), so the trait only covers the steady-state
/// per-frame surface plus teardown. No inheritance, just one trait every
/// display dispatches through.
pub trait Renderer {
	fn capability(&self) -> Capability;
	fn work_unit_count(&self) -> u32;

	/// Applies `plan` (exactly once; callers must not request a new plan
	/// before calling this) and returns whatever hashes were requested.
	fn render_frame(&mut self, plan: &DamagePlan, frame_index: u64) -> Result<FrameOutput, Error>;

	/// Releases every owned handle. Idempotent.
	fn shutdown(&mut self);
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn capability_tags_match_spec() {
		assert_eq!(Capability::CpuOffscreenBo.to_string(), "cpu_offscreen_bo");
		assert_eq!(Capability::VulkanDeviceGroupMultiGpu.to_string(), "vulkan_device_group_multi_gpu");
	}

	#[test]
	fn swap_stale_is_recoverable_but_gpu_loss_is_not() {
		assert!(Error::SwapStale("x".into()).is_recoverable());
		assert!(!Error::GpuLoss("x".into()).is_recoverable());
	}
}
