//! The device-group render target and, when presenting to a real display,
//! the `VK_KHR_swapchain` wrapping it. Offscreen runs skip the swapchain
//! entirely and read back through the same staging buffer a present path
//! would use for the final blit.

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, Allocator};
use gpu_allocator::MemoryLocation;

use crate::Error;

/// spec.md's 100ms suspension-point timeout for `vkAcquireNextImageKHR`.
const ACQUIRE_TIMEOUT_NS: u64 = 100_000_000;

/// A surface and present queue handed in by window-system glue (GLFW/Win32/
/// Wayland/XCB) that lives outside this crate's scope.
pub trait PresentTarget {
	fn surface(&self) -> vk::SurfaceKHR;
	fn extent(&self) -> vk::Extent2D;
}

fn to_err(msg: &str, e: impl std::fmt::Debug) -> Error {
	Error::GpuInit(format!("{msg}: {e:?}"))
}

/// The color image every GPU in the device group renders into, plus the
/// host-visible staging buffer used both to upload pattern pixels and to
/// read the result back for hashing.
pub struct RenderTarget {
	pub extent: vk::Extent2D,
	pub image: vk::Image,
	pub image_view: vk::ImageView,
	image_allocation: Option<Allocation>,
	pub staging_buffer: vk::Buffer,
	staging_allocation: Option<Allocation>,
	pub stride: usize,
}

impl RenderTarget {
	pub fn new(
		device: &ash::Device,
		allocator: &mut Allocator,
		extent: vk::Extent2D,
	) -> Result<Self, Error> {
		let image_info = vk::ImageCreateInfo::default()
			.image_type(vk::ImageType::TYPE_2D)
			.format(vk::Format::R8G8B8A8_UNORM)
			.extent(vk::Extent3D { width: extent.width, height: extent.height, depth: 1 })
			.mip_levels(1)
			.array_layers(1)
			.samples(vk::SampleCountFlags::TYPE_1)
			.tiling(vk::ImageTiling::OPTIMAL)
			.usage(
				vk::ImageUsageFlags::TRANSFER_DST
					| vk::ImageUsageFlags::TRANSFER_SRC
					| vk::ImageUsageFlags::COLOR_ATTACHMENT,
			)
			.sharing_mode(vk::SharingMode::EXCLUSIVE)
			.initial_layout(vk::ImageLayout::UNDEFINED);
		let image = unsafe { device.create_image(&image_info, None) }
			.map_err(|e| to_err("vkCreateImage", e))?;

		let requirements = unsafe { device.get_image_memory_requirements(image) };
		let image_allocation = allocator
			.allocate(&AllocationCreateDesc {
				name: "driverbench-render-target",
				requirements,
				location: MemoryLocation::GpuOnly,
				linear: false,
				allocation_scheme: gpu_allocator::vulkan::AllocationScheme::GpuAllocatorManaged,
			})
			.map_err(|e| to_err("allocate render target", e))?;
		unsafe {
			device
				.bind_image_memory(image, image_allocation.memory(), image_allocation.offset())
				.map_err(|e| to_err("vkBindImageMemory", e))?
		};

		let view_info = vk::ImageViewCreateInfo::default()
			.image(image)
			.view_type(vk::ImageViewType::TYPE_2D)
			.format(vk::Format::R8G8B8A8_UNORM)
			.subresource_range(vk::ImageSubresourceRange {
				aspect_mask: vk::ImageAspectFlags::COLOR,
				base_mip_level: 0,
				level_count: 1,
				base_array_layer: 0,
				layer_count: 1,
			});
		let image_view = unsafe { device.create_image_view(&view_info, None) }
			.map_err(|e| to_err("vkCreateImageView", e))?;

		let stride = extent.width as usize * 4;
		let buffer_size = (stride * extent.height as usize) as u64;
		let buffer_info = vk::BufferCreateInfo::default()
			.size(buffer_size)
			.usage(vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST)
			.sharing_mode(vk::SharingMode::EXCLUSIVE);
		let staging_buffer = unsafe { device.create_buffer(&buffer_info, None) }
			.map_err(|e| to_err("vkCreateBuffer", e))?;
		let buf_requirements = unsafe { device.get_buffer_memory_requirements(staging_buffer) };
		let staging_allocation = allocator
			.allocate(&AllocationCreateDesc {
				name: "driverbench-staging",
				requirements: buf_requirements,
				location: MemoryLocation::CpuToGpu,
				linear: true,
				allocation_scheme: gpu_allocator::vulkan::AllocationScheme::GpuAllocatorManaged,
			})
			.map_err(|e| to_err("allocate staging buffer", e))?;
		unsafe {
			device
				.bind_buffer_memory(staging_buffer, staging_allocation.memory(), staging_allocation.offset())
				.map_err(|e| to_err("vkBindBufferMemory", e))?
		};

		Ok(Self {
			extent,
			image,
			image_view,
			image_allocation: Some(image_allocation),
			staging_buffer,
			staging_allocation: Some(staging_allocation),
			stride,
		})
	}

	/// Writes `pixels` (tightly packed RGBA8, row-major top-to-bottom) into
	/// the mapped staging buffer ahead of a `vkCmdCopyBufferToImage`.
	pub fn upload(&mut self, pixels: &[u8]) -> Result<(), Error> {
		let alloc = self.staging_allocation.as_mut().ok_or_else(|| {
			Error::GpuInit("staging buffer already destroyed".into())
		})?;
		let slice = alloc
			.mapped_slice_mut()
			.ok_or_else(|| Error::GpuInit("staging buffer is not host-mapped".into()))?;
		if slice.len() < pixels.len() {
			return Err(Error::GpuInit("staging buffer smaller than frame".into()));
		}
		slice[..pixels.len()].copy_from_slice(pixels);
		Ok(())
	}

	/// Reads the staging buffer back after a `vkCmdCopyImageToBuffer`, for
	/// the pixel-hash path.
	pub fn readback(&self) -> Result<&[u8], Error> {
		self.staging_allocation
			.as_ref()
			.and_then(|a| a.mapped_slice())
			.ok_or_else(|| Error::HashReadback("staging buffer is not host-mapped".into()))
	}

	pub fn destroy(&mut self, device: &ash::Device, allocator: &mut Allocator) {
		unsafe {
			device.destroy_image_view(self.image_view, None);
			device.destroy_image(self.image, None);
			device.destroy_buffer(self.staging_buffer, None);
		}
		if let Some(a) = self.image_allocation.take() {
			let _ = allocator.free(a);
		}
		if let Some(a) = self.staging_allocation.take() {
			let _ = allocator.free(a);
		}
	}
}

/// Thin wrapper over `VK_KHR_swapchain`, rebuilt whenever `present` reports
/// `OUT_OF_DATE_KHR`/`SUBOPTIMAL_KHR`.
pub struct Swapchain {
	pub loader: ash::khr::swapchain::Device,
	pub handle: vk::SwapchainKHR,
	pub images: Vec<vk::Image>,
	pub extent: vk::Extent2D,
}

impl Swapchain {
	pub fn new(
		instance: &ash::Instance,
		device: &ash::Device,
		surface_loader: &ash::khr::surface::Instance,
		physical_device: vk::PhysicalDevice,
		target: &dyn PresentTarget,
		old: Option<vk::SwapchainKHR>,
	) -> Result<Self, Error> {
		let surface = target.surface();
		let capabilities = unsafe {
			surface_loader.get_physical_device_surface_capabilities(physical_device, surface)
		}
		.map_err(|e| to_err("get_physical_device_surface_capabilities", e))?;
		let formats = unsafe {
			surface_loader.get_physical_device_surface_formats(physical_device, surface)
		}
		.map_err(|e| to_err("get_physical_device_surface_formats", e))?;
		let format = formats
			.iter()
			.find(|f| f.format == vk::Format::B8G8R8A8_UNORM)
			.or_else(|| formats.first())
			.copied()
			.ok_or_else(|| Error::GpuInit("no surface formats".into()))?;

		let extent = if capabilities.current_extent.width != u32::MAX {
			capabilities.current_extent
		} else {
			target.extent()
		};

		let image_count = (capabilities.min_image_count + 1).min(
			if capabilities.max_image_count == 0 { u32::MAX } else { capabilities.max_image_count },
		);

		let loader = ash::khr::swapchain::Device::new(instance, device);
		let create_info = vk::SwapchainCreateInfoKHR::default()
			.surface(surface)
			.min_image_count(image_count)
			.image_format(format.format)
			.image_color_space(format.color_space)
			.image_extent(extent)
			.image_array_layers(1)
			.image_usage(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::COLOR_ATTACHMENT)
			.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
			.pre_transform(capabilities.current_transform)
			.composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
			.present_mode(vk::PresentModeKHR::FIFO)
			.clipped(true)
			.old_swapchain(old.unwrap_or(vk::SwapchainKHR::null()));
		let handle = unsafe { loader.create_swapchain(&create_info, None) }
			.map_err(|e| to_err("vkCreateSwapchainKHR", e))?;
		let images = unsafe { loader.get_swapchain_images(handle) }
			.map_err(|e| to_err("get_swapchain_images", e))?;

		Ok(Self { loader, handle, images, extent })
	}

	/// Returns `Ok(index)`, `Err(Timeout)` after the spec's 100ms acquire
	/// timeout (retry next loop iteration), or `Err(SwapStale)` when the
	/// caller should recreate the swapchain before retrying this frame.
	pub fn acquire(&self, semaphore: vk::Semaphore) -> Result<u32, Error> {
		match unsafe {
			self.loader.acquire_next_image(self.handle, ACQUIRE_TIMEOUT_NS, semaphore, vk::Fence::null())
		} {
			Ok((index, false)) => Ok(index),
			Ok((_, true)) => Err(Error::SwapStale("suboptimal swapchain".into())),
			Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(Error::SwapStale("out of date".into())),
			Err(vk::Result::TIMEOUT) => Err(Error::Timeout),
			Err(e) => Err(to_err("vkAcquireNextImageKHR", e)),
		}
	}

	pub fn present(&self, queue: vk::Queue, wait: vk::Semaphore, index: u32) -> Result<(), Error> {
		let wait_semaphores = [wait];
		let swapchains = [self.handle];
		let indices = [index];
		let present_info = vk::PresentInfoKHR::default()
			.wait_semaphores(&wait_semaphores)
			.swapchains(&swapchains)
			.image_indices(&indices);
		match unsafe { self.loader.queue_present(queue, &present_info) } {
			Ok(false) => Ok(()),
			Ok(true) => Err(Error::SwapStale("suboptimal present".into())),
			Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(Error::SwapStale("out of date".into())),
			Err(e) => Err(to_err("vkQueuePresentKHR", e)),
		}
	}

	pub fn destroy(&self) {
		unsafe { self.loader.destroy_swapchain(self.handle, None) };
	}
}
