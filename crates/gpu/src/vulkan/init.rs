//! Device-group instance/device bring-up. `VK_KHR_device_group` binds up to
//! `MAX_GPU_COUNT` physical devices behind one logical device, one queue,
//! and one command pool — the scheduler in `scheduler.rs` decides which
//! physical device a given draw targets via `vkCmdSetDeviceMask`.

use std::ffi::{CStr, CString};

use ash::vk;

use super::scheduler::MAX_GPU_COUNT;
use crate::Error;

pub struct DeviceGroup {
	pub entry: ash::Entry,
	pub instance: ash::Instance,
	pub device: ash::Device,
	pub physical_devices: Vec<vk::PhysicalDevice>,
	pub queue_family_index: u32,
	pub queue: vk::Queue,
	pub command_pool: vk::CommandPool,
	pub command_buffer: vk::CommandBuffer,
	pub query_pool: vk::QueryPool,
	pub timestamp_period_ns: f64,
	pub timestamp_valid_bits: u32,
	pub in_flight_fence: vk::Fence,
	pub image_available: vk::Semaphore,
	pub render_finished: vk::Semaphore,
}

fn to_init_err(msg: &str, e: impl std::fmt::Debug) -> Error {
	Error::GpuInit(format!("{msg}: {e:?}"))
}

impl DeviceGroup {
	/// Creates an instance, picks the first device group that exposes a
	/// graphics+present queue on every member, and brings up one logical
	/// device spanning the whole group.
	pub fn new(validation: bool) -> Result<Self, Error> {
		let entry = unsafe { ash::Entry::load() }.map_err(|e| to_init_err("loading vulkan", e))?;

		let app_name = CString::new("driverbench").unwrap();
		let app_info = vk::ApplicationInfo::default()
			.application_name(&app_name)
			.application_version(vk::make_api_version(0, 1, 0, 0))
			.engine_name(&app_name)
			.api_version(vk::API_VERSION_1_2);

		let mut extension_names: Vec<&CStr> = Vec::new();
		if validation {
			extension_names.push(vk::EXT_DEBUG_UTILS_NAME);
		}
		let extension_ptrs: Vec<_> = extension_names.iter().map(|s| s.as_ptr()).collect();

		let mut layers: Vec<&CStr> = Vec::new();
		const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";
		if validation {
			layers.push(VALIDATION_LAYER);
		}
		let layer_ptrs: Vec<_> = layers.iter().map(|s| s.as_ptr()).collect();

		let instance_info = vk::InstanceCreateInfo::default()
			.application_info(&app_info)
			.enabled_layer_names(&layer_ptrs)
			.enabled_extension_names(&extension_ptrs);

		let instance = unsafe { entry.create_instance(&instance_info, None) }
			.map_err(|e| to_init_err("vkCreateInstance", e))?;

		let group_count = unsafe { instance.enumerate_physical_device_groups_len() }
			.map_err(|e| to_init_err("enumerate_physical_device_groups", e))?;
		let mut groups = vec![vk::PhysicalDeviceGroupProperties::default(); group_count];
		unsafe { instance.enumerate_physical_device_groups(&mut groups) }
			.map_err(|e| to_init_err("enumerate_physical_device_groups", e))?;

		let group = groups
			.into_iter()
			.find(|g| g.physical_device_count > 0)
			.ok_or_else(|| Error::GpuInit("no vulkan device groups".into()))?;

		let physical_devices: Vec<vk::PhysicalDevice> = group.physical_devices
			[..group.physical_device_count as usize]
			.iter()
			.copied()
			.take(MAX_GPU_COUNT)
			.collect();

		let primary = physical_devices[0];
		let queue_family_index = unsafe { instance.get_physical_device_queue_family_properties(primary) }
			.into_iter()
			.enumerate()
			.find(|(_, props)| props.queue_flags.contains(vk::QueueFlags::GRAPHICS))
			.map(|(i, _)| i as u32)
			.ok_or_else(|| Error::GpuInit("no graphics queue family".into()))?;

		let queue_priorities = [1.0f32];
		let queue_create_info = vk::DeviceQueueCreateInfo::default()
			.queue_family_index(queue_family_index)
			.queue_priorities(&queue_priorities);
		let queue_create_infos = [queue_create_info];

		let device_extension_names = [vk::KHR_SWAPCHAIN_NAME];
		let device_extension_ptrs: Vec<_> = device_extension_names.iter().map(|n| n.as_ptr()).collect();

		let mut device_group_info = vk::DeviceGroupDeviceCreateInfo::default()
			.physical_devices(&physical_devices);

		let mut features = vk::PhysicalDeviceFeatures::default();
		features.multi_draw_indirect = vk::TRUE;

		let device_info = vk::DeviceCreateInfo::default()
			.push_next(&mut device_group_info)
			.queue_create_infos(&queue_create_infos)
			.enabled_extension_names(&device_extension_ptrs)
			.enabled_features(&features);

		let device = unsafe { instance.create_device(primary, &device_info, None) }
			.map_err(|e| to_init_err("vkCreateDevice", e))?;

		let queue = unsafe { device.get_device_queue(queue_family_index, 0) };

		let command_pool_info = vk::CommandPoolCreateInfo::default()
			.queue_family_index(queue_family_index)
			.flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
		let command_pool = unsafe { device.create_command_pool(&command_pool_info, None) }
			.map_err(|e| to_init_err("vkCreateCommandPool", e))?;

		let alloc_info = vk::CommandBufferAllocateInfo::default()
			.command_pool(command_pool)
			.level(vk::CommandBufferLevel::PRIMARY)
			.command_buffer_count(1);
		let command_buffer = unsafe { device.allocate_command_buffers(&alloc_info) }
			.map_err(|e| to_init_err("vkAllocateCommandBuffers", e))?[0];

		let query_pool_info = vk::QueryPoolCreateInfo::default()
			.query_type(vk::QueryType::TIMESTAMP)
			.query_count(2 * MAX_GPU_COUNT as u32);
		let query_pool = unsafe { device.create_query_pool(&query_pool_info, None) }
			.map_err(|e| to_init_err("vkCreateQueryPool", e))?;

		let props = unsafe { instance.get_physical_device_properties(primary) };
		let timestamp_period_ns = props.limits.timestamp_period as f64;
		let timestamp_valid_bits =
			unsafe { instance.get_physical_device_queue_family_properties(primary) }
				[queue_family_index as usize]
				.timestamp_valid_bits;

		let fence_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);
		let in_flight_fence = unsafe { device.create_fence(&fence_info, None) }
			.map_err(|e| to_init_err("vkCreateFence", e))?;

		let sem_info = vk::SemaphoreCreateInfo::default();
		let image_available = unsafe { device.create_semaphore(&sem_info, None) }
			.map_err(|e| to_init_err("vkCreateSemaphore", e))?;
		let render_finished = unsafe { device.create_semaphore(&sem_info, None) }
			.map_err(|e| to_init_err("vkCreateSemaphore", e))?;

		Ok(Self {
			entry,
			instance,
			device,
			physical_devices,
			queue_family_index,
			queue,
			command_pool,
			command_buffer,
			query_pool,
			timestamp_period_ns,
			timestamp_valid_bits,
			in_flight_fence,
			image_available,
			render_finished,
		})
	}

	pub fn gpu_count(&self) -> u32 {
		self.physical_devices.len() as u32
	}
}

impl Drop for DeviceGroup {
	fn drop(&mut self) {
		unsafe {
			let _ = self.device.device_wait_idle();
			self.device.destroy_semaphore(self.render_finished, None);
			self.device.destroy_semaphore(self.image_available, None);
			self.device.destroy_fence(self.in_flight_fence, None);
			self.device.destroy_query_pool(self.query_pool, None);
			self.device.destroy_command_pool(self.command_pool, None);
			self.device.destroy_device(None);
			self.instance.destroy_instance(None);
		}
	}
}
