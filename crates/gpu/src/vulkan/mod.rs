//! `VK_KHR_device_group` multi-GPU renderer. Split across files the way the
//! original renderer's later revision is: `init` for instance/device
//! bring-up, `swapchain` for the render target and (optional) presentation
//! surface, `scheduler` for the pure owner-selection/EWMA logic, and
//! `frame` for the per-frame command recording and submit.

mod frame;
mod init;
pub mod scheduler;
mod swapchain;

use ash::vk;
use dbhash::HashMode;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use pattern::{DamagePlan, Grid};

use self::init::DeviceGroup;
use self::scheduler::{SchedulerState, DEFAULT_BUDGET_NS, DEFAULT_SAFETY_NS, MAX_GPU_COUNT};
use self::swapchain::{PresentTarget, RenderTarget, Swapchain};
use crate::{Capability, Error, FrameOutput, Renderer};

pub use self::swapchain::PresentTarget as VulkanPresentTarget;

/// Everything the device-group renderer owns. Offscreen runs leave
/// `swapchain`/`surface_loader` `None` and only ever touch `target`, the
/// same render-target-plus-staging-buffer pair a present path copies from.
pub struct VulkanRenderer {
	group: DeviceGroup,
	allocator: Allocator,
	target: RenderTarget,
	swapchain: Option<Swapchain>,
	surface_loader: Option<ash::khr::surface::Instance>,
	grid: Grid,
	hash_mode: HashMode,
	scheduler: SchedulerState,
	budget_ns: u64,
	safety_ns: u64,
	host_buffer: Vec<u8>,
	last_frame_units: [u32; MAX_GPU_COUNT],
	last_frame_wall_ms: f64,
}

impl VulkanRenderer {
	/// Brings up an offscreen device-group renderer: no surface, no
	/// swapchain, just the host-visible render target the other backends
	/// also paint into. `--display offscreen` always takes this path.
	pub fn new_offscreen(grid: Grid, hash_mode: HashMode, validation: bool) -> Result<Self, Error> {
		let group = DeviceGroup::new(validation)?;
		let gpu_count = group.gpu_count();

		let mut allocator = Allocator::new(&AllocatorCreateDesc {
			instance: group.instance.clone(),
			device: group.device.clone(),
			physical_device: group.physical_devices[0],
			debug_settings: Default::default(),
			buffer_device_address: false,
			allocation_sizes: Default::default(),
		})
		.map_err(|e| Error::GpuInit(format!("gpu-allocator init: {e:?}")))?;

		let extent = vk::Extent2D { width: grid.cols, height: grid.rows };
		let target = RenderTarget::new(&group.device, &mut allocator, extent)?;

		let stride = grid.cols as usize * 4;
		let background = pattern::PHASE0_RGB.to_rgba8();
		let mut host_buffer = vec![0u8; stride * grid.rows as usize];
		for px in host_buffer.chunks_exact_mut(4) {
			px.copy_from_slice(&background);
		}

		Ok(Self {
			group,
			allocator,
			target,
			swapchain: None,
			surface_loader: None,
			grid,
			hash_mode,
			scheduler: SchedulerState::new(gpu_count),
			budget_ns: DEFAULT_BUDGET_NS,
			safety_ns: DEFAULT_SAFETY_NS,
			host_buffer,
			last_frame_units: [0; MAX_GPU_COUNT],
			last_frame_wall_ms: 0.0,
		})
	}

	/// Brings up the same device group, plus a `VK_KHR_swapchain` against
	/// `present_target`. Used by the windowed/KMS display paths when
	/// `--api vulkan` is selected.
	pub fn new_presenting(
		grid: Grid,
		hash_mode: HashMode,
		validation: bool,
		present_target: &dyn PresentTarget,
	) -> Result<Self, Error> {
		let mut renderer = Self::new_offscreen(grid, hash_mode, validation)?;
		let surface_loader =
			ash::khr::surface::Instance::new(&renderer.group.entry, &renderer.group.instance);
		let swapchain = Swapchain::new(
			&renderer.group.instance,
			&renderer.group.device,
			&surface_loader,
			renderer.group.physical_devices[0],
			present_target,
			None,
		)?;
		renderer.surface_loader = Some(surface_loader);
		renderer.swapchain = Some(swapchain);
		Ok(renderer)
	}

	/// Rebuilds the swapchain after a `SwapStale` error. The driver loop is
	/// expected to call this once, then retry the frame.
	pub fn recreate_swapchain(&mut self, present_target: &dyn PresentTarget) -> Result<(), Error> {
		let (Some(surface_loader), Some(old)) = (&self.surface_loader, &self.swapchain) else {
			return Err(Error::Config("recreate_swapchain called on an offscreen renderer".into()));
		};
		unsafe { self.group.device.device_wait_idle() }
			.map_err(|e| Error::GpuLoss(format!("vkDeviceWaitIdle: {e:?}")))?;
		let old_handle = old.handle;
		let new_swapchain = Swapchain::new(
			&self.group.instance,
			&self.group.device,
			surface_loader,
			self.group.physical_devices[0],
			present_target,
			Some(old_handle),
		)?;
		old.destroy();
		self.swapchain = Some(new_swapchain);
		Ok(())
	}
}

impl Renderer for VulkanRenderer {
	fn capability(&self) -> Capability {
		Capability::VulkanDeviceGroupMultiGpu
	}

	fn work_unit_count(&self) -> u32 {
		self.grid.tile_count()
	}

	fn render_frame(&mut self, plan: &DamagePlan, frame_index: u64) -> Result<FrameOutput, Error> {
		self.render(plan, frame_index)
	}

	fn shutdown(&mut self) {
		unsafe {
			let _ = self.group.device.device_wait_idle();
		}
		if let Some(sc) = self.swapchain.take() {
			sc.destroy();
		}
		self.target.destroy(&self.group.device, &mut self.allocator);
	}
}
