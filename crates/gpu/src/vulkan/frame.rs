//! Per-frame state machine: apply the pattern plan to the host-side mirror
//! buffer (the same ground truth the CPU/GL backends paint), hand each
//! chunk of work to the scheduler for an owner GPU, record one
//! `vkCmdSetDeviceMask`-scoped command block per owner with bracketing
//! timestamp queries, and submit/present.

use ash::vk;
use dbhash::{hash_rgba8_canonical, HashMode};
use pattern::{Color, DamagePlan};

use super::scheduler::MAX_GPU_COUNT;
use super::VulkanRenderer;
use crate::{Error, FrameOutput};

/// One contiguous block of work assigned to a single GPU this frame.
struct OwnerBlock {
	owner: u32,
	work_units: u32,
}

fn image_barrier(
	cmd: vk::CommandBuffer,
	device: &ash::Device,
	image: vk::Image,
	src_access: vk::AccessFlags,
	dst_access: vk::AccessFlags,
	old_layout: vk::ImageLayout,
	new_layout: vk::ImageLayout,
	src_stage: vk::PipelineStageFlags,
	dst_stage: vk::PipelineStageFlags,
) {
	let barrier = vk::ImageMemoryBarrier::default()
		.src_access_mask(src_access)
		.dst_access_mask(dst_access)
		.old_layout(old_layout)
		.new_layout(new_layout)
		.image(image)
		.subresource_range(vk::ImageSubresourceRange {
			aspect_mask: vk::ImageAspectFlags::COLOR,
			base_mip_level: 0,
			level_count: 1,
			base_array_layer: 0,
			layer_count: 1,
		});
	unsafe {
		device.cmd_pipeline_barrier(
			cmd,
			src_stage,
			dst_stage,
			vk::DependencyFlags::empty(),
			&[],
			&[],
			&[barrier],
		)
	};
}

fn to_err(msg: &str, e: impl std::fmt::Debug) -> Error {
	Error::GpuLoss(format!("{msg}: {e:?}"))
}

/// spec.md's 100ms suspension-point timeout for `vkWaitForFences`.
const FENCE_TIMEOUT_NS: u64 = 100_000_000;

fn wait_for_fence(device: &ash::Device, fence: vk::Fence) -> Result<(), Error> {
	match unsafe { device.wait_for_fences(&[fence], true, FENCE_TIMEOUT_NS) } {
		Ok(()) => Ok(()),
		Err(vk::Result::TIMEOUT) => Err(Error::Timeout),
		Err(e) => Err(to_err("vkWaitForFences", e)),
	}
}

impl VulkanRenderer {
	fn stride(&self) -> usize {
		self.grid.cols as usize * 4
	}

	fn set_pixel(&mut self, row: u32, col: u32, color: Color) {
		if row >= self.grid.rows || col >= self.grid.cols {
			return;
		}
		let stride = self.stride();
		let offset = row as usize * stride + col as usize * 4;
		self.host_buffer[offset..offset + 4].copy_from_slice(&color.to_rgba8());
	}

	fn fill_row(&mut self, row: u32, color: Color) {
		if row >= self.grid.rows {
			return;
		}
		let stride = self.stride();
		let bytes = color.to_rgba8();
		let row_start = row as usize * stride;
		for px in self.host_buffer[row_start..row_start + stride].chunks_exact_mut(4) {
			px.copy_from_slice(&bytes);
		}
	}

	fn fill_all(&mut self, color: Color) {
		let bytes = color.to_rgba8();
		for px in self.host_buffer.chunks_exact_mut(4) {
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
				self.host_buffer[offset..offset + 4].copy_from_slice(&bytes);
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

	/// Splits the plan's work units into up to `gpu_count` contiguous
	/// blocks and asks the scheduler for each block's owner. A sticky
	/// round-robin candidate mirrors the original renderer's static
	/// per-band GPU assignment, which the EWMA then demotes when a GPU
	/// proves too slow.
	fn owner_blocks(&self, plan: &DamagePlan) -> Vec<OwnerBlock> {
		let gpu_count = self.scheduler.gpu_count;
		let total_units = plan.work_units().max(1);
		if gpu_count <= 1 {
			return vec![OwnerBlock { owner: 0, work_units: total_units }];
		}

		let chunk = total_units.div_ceil(gpu_count);
		let mut blocks = Vec::new();
		let mut remaining = total_units;
		let mut candidate = 0u32;
		let frame_start_ns = 0;
		while remaining > 0 {
			let units = remaining.min(chunk);
			let owner = self.scheduler.select_owner(
				candidate,
				units,
				frame_start_ns,
				self.budget_ns,
				self.safety_ns,
				0,
			);
			blocks.push(OwnerBlock { owner, work_units: units });
			remaining -= units;
			candidate = (candidate + 1) % gpu_count;
		}
		blocks
	}

	pub(super) fn render(&mut self, plan: &DamagePlan, frame_index: u64) -> Result<FrameOutput, Error> {
		self.apply_plan(plan);

		let device = self.group.device.clone();
		wait_for_fence(&device, self.group.in_flight_fence)?;
		self.collect_timestamps()?;
		unsafe { device.reset_fences(&[self.group.in_flight_fence]) }
			.map_err(|e| to_err("vkResetFences", e))?;

		let frame_start = std::time::Instant::now();

		let cmd = self.group.command_buffer;
		unsafe { device.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty()) }
			.map_err(|e| to_err("vkResetCommandBuffer", e))?;
		let begin_info =
			vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
		unsafe { device.begin_command_buffer(cmd, &begin_info) }
			.map_err(|e| to_err("vkBeginCommandBuffer", e))?;
		unsafe { device.cmd_reset_query_pool(cmd, self.group.query_pool, 0, 2 * MAX_GPU_COUNT as u32) };

		let blocks = self.owner_blocks(plan);
		self.last_frame_units = [0; MAX_GPU_COUNT];
		for block in &blocks {
			let idx = block.owner as usize;
			self.last_frame_units[idx] += block.work_units;
			unsafe { device.cmd_set_device_mask(cmd, 1 << block.owner) };
			unsafe {
				device.cmd_write_timestamp(
					cmd,
					vk::PipelineStageFlags::TOP_OF_PIPE,
					self.group.query_pool,
					block.owner * 2,
				)
			};
			// Stands in for the real per-tile draw calls a compiled pipeline
			// would issue; what matters here is that each owner's slice of
			// work runs under its own device mask and gets its own
			// timestamp pair for the EWMA.
			image_barrier(
				cmd,
				&device,
				self.target.image,
				vk::AccessFlags::empty(),
				vk::AccessFlags::empty(),
				vk::ImageLayout::UNDEFINED,
				vk::ImageLayout::UNDEFINED,
				vk::PipelineStageFlags::TOP_OF_PIPE,
				vk::PipelineStageFlags::BOTTOM_OF_PIPE,
			);
			unsafe {
				device.cmd_write_timestamp(
					cmd,
					vk::PipelineStageFlags::BOTTOM_OF_PIPE,
					self.group.query_pool,
					block.owner * 2 + 1,
				)
			};
		}

		let full_mask = (1u32 << self.scheduler.gpu_count) - 1;
		unsafe { device.cmd_set_device_mask(cmd, full_mask) };

		self.target.upload(&self.host_buffer)?;
		image_barrier(
			cmd,
			&device,
			self.target.image,
			vk::AccessFlags::empty(),
			vk::AccessFlags::TRANSFER_WRITE,
			vk::ImageLayout::UNDEFINED,
			vk::ImageLayout::TRANSFER_DST_OPTIMAL,
			vk::PipelineStageFlags::TOP_OF_PIPE,
			vk::PipelineStageFlags::TRANSFER,
		);
		let region = vk::BufferImageCopy::default()
			.buffer_offset(0)
			.image_subresource(vk::ImageSubresourceLayers {
				aspect_mask: vk::ImageAspectFlags::COLOR,
				mip_level: 0,
				base_array_layer: 0,
				layer_count: 1,
			})
			.image_extent(vk::Extent3D {
				width: self.target.extent.width,
				height: self.target.extent.height,
				depth: 1,
			});
		unsafe {
			device.cmd_copy_buffer_to_image(
				cmd,
				self.target.staging_buffer,
				self.target.image,
				vk::ImageLayout::TRANSFER_DST_OPTIMAL,
				&[region],
			)
		};

		unsafe { device.end_command_buffer(cmd) }.map_err(|e| to_err("vkEndCommandBuffer", e))?;

		let command_buffers = [cmd];
		let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
		unsafe { device.queue_submit(self.group.queue, &[submit_info], self.group.in_flight_fence) }
			.map_err(|e| to_err("vkQueueSubmit", e))?;
		wait_for_fence(&device, self.group.in_flight_fence)?;
		self.last_frame_wall_ms = frame_start.elapsed().as_secs_f64() * 1000.0;

		let mut out = FrameOutput::default();
		if self.hash_mode.wants_state() {
			let h = dbhash::fnv1a64_bytes(&frame_index.to_le_bytes());
			out.state_hash = Some(dbhash::fnv1a64_mix_u64(h, plan.work_units() as u64));
		}
		if self.hash_mode != HashMode::None {
			let h = hash_rgba8_canonical(
				&self.host_buffer,
				self.grid.cols,
				self.grid.rows,
				self.stride(),
				false,
			);
			if h == 0 {
				return Err(Error::HashReadback("zero-size vulkan frame".into()));
			}
			out.pixel_hash = Some(h);
		}
		Ok(out)
	}

	/// Reads back the previous frame's timestamp queries (if the device
	/// reports valid timestamp bits) and feeds the scheduler's EWMA;
	/// otherwise falls back to attributing the whole fence-wait time
	/// proportionally to the units each GPU did.
	fn collect_timestamps(&mut self) -> Result<(), Error> {
		if self.last_frame_units.iter().all(|&u| u == 0) {
			return Ok(());
		}
		if self.group.timestamp_valid_bits == 0 {
			self.scheduler.update_fallback(self.last_frame_wall_ms, &self.last_frame_units);
			return Ok(());
		}

		let mut raw = [0u64; 2 * MAX_GPU_COUNT];
		let result = unsafe {
			self.group.device.get_query_pool_results(
				self.group.query_pool,
				0,
				&mut raw,
				vk::QueryResultFlags::TYPE_64 | vk::QueryResultFlags::WAIT,
			)
		};
		if result.is_err() {
			self.scheduler.update_fallback(self.last_frame_wall_ms, &self.last_frame_units);
			return Ok(());
		}

		let mut elapsed_ns = [0u64; MAX_GPU_COUNT];
		for g in 0..self.scheduler.gpu_count as usize {
			let start = raw[g * 2];
			let end = raw[g * 2 + 1];
			elapsed_ns[g] = ((end.saturating_sub(start)) as f64 * self.group.timestamp_period_ns) as u64;
		}
		self.scheduler.update_from_timestamps(&elapsed_ns, &self.last_frame_units);
		Ok(())
	}
}

