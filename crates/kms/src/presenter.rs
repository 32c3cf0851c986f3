//! The atomic-commit state machine: one EGL/GBM/DRM handle set, exactly one
//! "current" framebuffer plus at most one "next" in flight, following
//! §4.4's frame loop pseudocode almost line for line.

use std::os::unix::io::AsFd;
use std::path::Path;
use std::time::Duration;

use dbhash::HashMode;
use drm::control::{atomic, property, AtomicCommitFlags, Device as ControlDevice};
use gbm::{AsRaw, BufferObjectFlags, Format};
use khronos_egl as egl;
use gpu::gl::{GlContext, GlRenderer};
use gpu::{Capability, FrameOutput, Renderer};
use pattern::{DamagePlan, Grid};

use crate::device::{Card, DisplayTarget};
use crate::{discover, Error};

struct FbState {
	fb: drm::control::framebuffer::Handle,
	bo: gbm::BufferObject<()>,
}

pub struct AtomicPresenter<C: GlContext> {
	gbm: gbm::Device<Card>,
	gbm_surface: gbm::Surface<()>,
	target: DisplayTarget,
	egl: egl::DynamicInstance<egl::EGL1_4>,
	egl_display: egl::Display,
	egl_context: egl::Context,
	egl_surface: egl::Surface,
	mode_blob: property::Value<'static>,
	current: Option<FbState>,
	renderer: GlRenderer<C>,
}

fn to_init(msg: &str, e: impl std::fmt::Debug) -> Error {
	Error::GpuInit(format!("{msg}: {e:?}"))
}

fn to_loss(msg: &str, e: impl std::fmt::Debug) -> Error {
	Error::GpuLoss(format!("{msg}: {e:?}"))
}

impl<C: GlContext> AtomicPresenter<C> {
	pub fn new(card_path: &Path, grid: Grid, hash_mode: HashMode, ctx: C) -> Result<Self, Error> {
		let card = Card::open(card_path)?;
		let target = discover(&card)?;

		let gbm = gbm::Device::new(card).map_err(|e| to_init("gbm::Device::new", e))?;
		let gbm_surface = gbm
			.create_surface::<()>(
				target.width,
				target.height,
				Format::Xrgb8888,
				BufferObjectFlags::SCANOUT | BufferObjectFlags::RENDERING,
			)
			.map_err(|e| to_init("gbm_surface_create", e))?;

		let egl = unsafe { egl::DynamicInstance::<egl::EGL1_4>::load() }
			.map_err(|e| to_init("loading libEGL", e))?;
		let egl_display = unsafe { egl.get_display(gbm.as_raw() as *mut _) }
			.ok_or_else(|| Error::GpuInit("eglGetDisplay returned null".into()))?;
		egl.initialize(egl_display).map_err(|e| to_init("eglInitialize", e))?;

		let desktop_attribs = [
			egl::RED_SIZE,
			8,
			egl::GREEN_SIZE,
			8,
			egl::BLUE_SIZE,
			8,
			egl::RENDERABLE_TYPE,
			egl::OPENGL_BIT,
			egl::NONE,
		];
		let es_attribs = [
			egl::RED_SIZE,
			8,
			egl::GREEN_SIZE,
			8,
			egl::BLUE_SIZE,
			8,
			egl::RENDERABLE_TYPE,
			egl::OPENGL_ES_BIT,
			egl::NONE,
		];

		let (config, api, capability) = match egl
			.choose_first_config(egl_display, &desktop_attribs)
			.ok()
			.flatten()
		{
			Some(cfg) => (cfg, egl::OPENGL_API, Capability::Gl3_3),
			None => {
				let cfg = egl
					.choose_first_config(egl_display, &es_attribs)
					.map_err(|e| to_init("eglChooseConfig", e))?
					.ok_or_else(|| Error::GpuInit("no EGL config with RGB8".into()))?;
				(cfg, egl::OPENGL_ES_API, Capability::Gl1_5Gles1_1)
			}
		};
		egl.bind_api(api).map_err(|e| to_init("eglBindAPI", e))?;

		let egl_context = unsafe {
			egl.create_context(egl_display, config, None, &[egl::NONE])
				.map_err(|e| to_init("eglCreateContext", e))?
		};
		let egl_surface = unsafe {
			egl.create_window_surface(egl_display, config, gbm_surface.as_raw() as *mut _, None)
				.map_err(|e| to_init("eglCreateWindowSurface", e))?
		};
		egl.make_current(egl_display, Some(egl_surface), Some(egl_surface), Some(egl_context))
			.map_err(|e| to_init("eglMakeCurrent", e))?;

		let blob_data = target.mode.as_raw().to_owned();
		let blob_id = gbm
			.create_property_blob(unsafe {
				std::slice::from_raw_parts(
					(&blob_data as *const _) as *const u8,
					std::mem::size_of_val(&blob_data),
				)
			})
			.map_err(|e| to_init("drmModeCreatePropertyBlob", e))?;
		let mode_blob = property::Value::Blob(blob_id.into());

		let renderer = GlRenderer::new(grid, capability, hash_mode, ctx);

		log::info!(target: "driverbench::kms", "mode discovery complete width={} height={}", target.width, target.height);

		Ok(Self {
			gbm,
			gbm_surface,
			target,
			egl,
			egl_display,
			egl_context,
			egl_surface,
			mode_blob,
			current: None,
			renderer,
		})
	}

	fn add_fb(&self, bo: &gbm::BufferObject<()>) -> Result<drm::control::framebuffer::Handle, Error> {
		let handle = bo.handle().u32();
		let stride = bo.stride().map_err(|e| to_loss("gbm_bo_get_stride", e))?;
		drm::control::framebuffer::create_with_modifiers(
			&self.gbm,
			self.target.width,
			self.target.height,
			drm::buffer::DrmFourcc::Xrgb8888,
			&[(handle, 0, stride)],
			&[0],
		)
		.or_else(|_| {
			drm::control::framebuffer::create(&self.gbm, bo).map(|fb| fb.handle())
		})
		.map_err(|e| to_loss("drmModeAddFB2", e))
	}

	fn commit(&self, fb: drm::control::framebuffer::Handle, initial: bool) -> Result<(), Error> {
		let p = &self.target.props;
		let mut req = atomic::AtomicModeReq::new();
		if initial {
			req.add_property(self.target.connector, p.connector_crtc_id, property::Value::CRTC(Some(self.target.crtc)));
			req.add_property(self.target.crtc, p.crtc_mode_id, self.mode_blob);
			req.add_property(self.target.crtc, p.crtc_active, property::Value::Boolean(true));
			req.add_property(self.target.plane, p.plane_crtc_id, property::Value::CRTC(Some(self.target.crtc)));
			req.add_property(self.target.plane, p.plane_src_x, property::Value::UnsignedRange(0));
			req.add_property(self.target.plane, p.plane_src_y, property::Value::UnsignedRange(0));
			req.add_property(self.target.plane, p.plane_src_w, property::Value::UnsignedRange((self.target.width as u64) << 16));
			req.add_property(self.target.plane, p.plane_src_h, property::Value::UnsignedRange((self.target.height as u64) << 16));
			req.add_property(self.target.plane, p.plane_crtc_x, property::Value::SignedRange(0));
			req.add_property(self.target.plane, p.plane_crtc_y, property::Value::SignedRange(0));
			req.add_property(self.target.plane, p.plane_crtc_w, property::Value::UnsignedRange(self.target.width as u64));
			req.add_property(self.target.plane, p.plane_crtc_h, property::Value::UnsignedRange(self.target.height as u64));
		}
		req.add_property(self.target.plane, p.plane_fb_id, property::Value::Framebuffer(Some(fb)));

		let flags = if initial {
			AtomicCommitFlags::ALLOW_MODESET
		} else {
			AtomicCommitFlags::NONBLOCK | AtomicCommitFlags::PAGE_FLIP_EVENT
		};
		self.gbm
			.atomic_commit(flags, req)
			.map_err(|e| to_loss("drmModeAtomicCommit", e))
	}

	/// `select(drm_fd)` + `drmHandleEvent`, with `EINTR` retried and a bound
	/// on total wait so the loop stays responsive to `should_stop`.
	fn wait_for_flip(&self) -> Result<(), Error> {
		loop {
			let mut read_fds = nix::sys::select::FdSet::new();
			let fd = self.gbm.as_fd();
			read_fds.insert(fd);
			let timeout = Duration::from_millis(100);
			match nix::sys::select::select(
				None,
				Some(&mut read_fds),
				None,
				None,
				Some(&mut nix::sys::time::TimeVal::from(timeout)),
			) {
				Ok(0) => continue,
				Ok(_) => break,
				Err(nix::errno::Errno::EINTR) => return Err(Error::Interrupted),
				Err(e) => return Err(to_loss("select(drm_fd)", e)),
			}
		}
		self.gbm
			.receive_events()
			.map_err(|e| to_loss("drmHandleEvent", e))?
			.for_each(drop);
		Ok(())
	}

	/// Renders `plan`, swaps, locks the next GBM buffer, and atomically
	/// commits it — a full modeset on the very first call, a bare
	/// `FB_ID` flip on every call after.
	pub fn present_frame(&mut self, plan: &DamagePlan, frame_index: u64) -> Result<FrameOutput, Error> {
		let out = self.renderer.render_frame(plan, frame_index)?;

		self.egl
			.swap_buffers(self.egl_display, self.egl_surface)
			.map_err(|e| to_loss("eglSwapBuffers", e))?;
		let next_bo = self
			.gbm_surface
			.lock_front_buffer()
			.map_err(|e| to_loss("gbm_surface_lock_front_buffer", e))?;
		let next_fb = self.add_fb(&next_bo)?;

		let initial = self.current.is_none();
		self.commit(next_fb, initial)?;
		if !initial {
			self.wait_for_flip()?;
		}

		if let Some(prev) = self.current.take() {
			let _ = drm::control::framebuffer::destroy(&self.gbm, prev.fb);
			self.gbm_surface.release_buffer(prev.bo);
		}
		self.current = Some(FbState { fb: next_fb, bo: next_bo });

		Ok(out)
	}
}

impl<C: GlContext> Renderer for AtomicPresenter<C> {
	fn capability(&self) -> Capability {
		self.renderer.capability()
	}

	fn work_unit_count(&self) -> u32 {
		self.renderer.work_unit_count()
	}

	fn render_frame(&mut self, plan: &DamagePlan, frame_index: u64) -> Result<FrameOutput, Error> {
		self.present_frame(plan, frame_index)
	}

	fn shutdown(&mut self) {
		self.renderer.shutdown();
	}
}

impl<C: GlContext> Drop for AtomicPresenter<C> {
	fn drop(&mut self) {
		self.renderer.shutdown();
		if let Some(state) = self.current.take() {
			let _ = drm::control::framebuffer::destroy(&self.gbm, state.fb);
		}
		let _ = self.egl.make_current(self.egl_display, None, None, None);
		let _ = self.egl.destroy_surface(self.egl_display, self.egl_surface);
		let _ = self.egl.destroy_context(self.egl_display, self.egl_context);
		let _ = self.egl.terminate(self.egl_display);
	}
}
