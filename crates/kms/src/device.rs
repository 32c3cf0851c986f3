//! DRM node handle, mode discovery, and the fixed property IDs the atomic
//! commit path needs every frame. No example repo in the retrieval pack
//! touches KMS/DRM; this module follows the `drm`/`gbm` crates' own
//! conventions rather than any teacher file.

use std::fs::{File, OpenOptions};
use std::os::unix::io::{AsFd, BorrowedFd};
use std::path::Path;

use drm::control::{connector, crtc, plane, property, Device as ControlDevice, Mode};
use drm::Device as BasicDevice;

use crate::Error;

/// An open DRM node. `drm`'s traits are implemented on top of the raw `File`
/// the way every `drm-rs` consumer wires them up: `AsFd` plus the two
/// marker-trait impls below.
pub struct Card(File);

impl AsFd for Card {
	fn as_fd(&self) -> BorrowedFd<'_> {
		self.0.as_fd()
	}
}

impl BasicDevice for Card {}
impl ControlDevice for Card {}

impl Card {
	pub fn open(path: &Path) -> Result<Self, Error> {
		let file = OpenOptions::new()
			.read(true)
			.write(true)
			.open(path)
			.map_err(|e| Error::GpuInit(format!("open {}: {e}", path.display())))?;
		let card = Card(file);
		card.set_client_capability(drm::ClientCapability::UniversalPlanes, true)
			.map_err(|e| Error::GpuInit(format!("DRM_CLIENT_CAP_UNIVERSAL_PLANES: {e}")))?;
		card.set_client_capability(drm::ClientCapability::Atomic, true)
			.map_err(|e| Error::GpuInit(format!("DRM_CLIENT_CAP_ATOMIC: {e}")))?;
		Ok(card)
	}
}

/// Property IDs fixed for the run, per §3's "KMS objects" table.
#[derive(Clone, Copy, Debug)]
pub struct PropertyIds {
	pub connector_crtc_id: property::Handle,
	pub crtc_mode_id: property::Handle,
	pub crtc_active: property::Handle,
	pub plane_fb_id: property::Handle,
	pub plane_crtc_id: property::Handle,
	pub plane_src_x: property::Handle,
	pub plane_src_y: property::Handle,
	pub plane_src_w: property::Handle,
	pub plane_src_h: property::Handle,
	pub plane_crtc_x: property::Handle,
	pub plane_crtc_y: property::Handle,
	pub plane_crtc_w: property::Handle,
	pub plane_crtc_h: property::Handle,
}

/// Everything the initial modeset and every later page flip need.
pub struct DisplayTarget {
	pub connector: connector::Handle,
	pub crtc: crtc::Handle,
	pub plane: plane::Handle,
	pub mode: Mode,
	pub width: u32,
	pub height: u32,
	pub props: PropertyIds,
}

fn find_property(
	card: &Card,
	object: impl Into<drm::control::RawResourceHandle>,
	name: &str,
) -> Result<property::Handle, Error> {
	let object = object.into();
	let props = card
		.get_properties(object)
		.map_err(|e| Error::GpuInit(format!("get_properties({name}): {e}")))?;
	for handle in props.as_props_and_values().0 {
		if let Ok(info) = card.get_property(*handle) {
			if info.name().to_str() == Ok(name) {
				return Ok(*handle);
			}
		}
	}
	Err(Error::GpuInit(format!("missing DRM property {name}")))
}

/// §4.4 "Mode discovery": first connected connector, first usable CRTC,
/// first primary plane on that CRTC.
pub fn discover(card: &Card) -> Result<DisplayTarget, Error> {
	let resources =
		card.resource_handles().map_err(|e| Error::GpuInit(format!("resource_handles: {e}")))?;

	let connector_handle = resources
		.connectors()
		.iter()
		.find_map(|&h| {
			let info = card.get_connector(h, false).ok()?;
			(info.state() == connector::State::Connected && !info.modes().is_empty()).then_some(h)
		})
		.ok_or_else(|| Error::GpuInit("no connected connector with a mode".into()))?;
	let connector_info = card
		.get_connector(connector_handle, false)
		.map_err(|e| Error::GpuInit(format!("get_connector: {e}")))?;
	let mode = connector_info.modes()[0];

	let encoder_handle = connector_info
		.current_encoder()
		.or_else(|| connector_info.encoders().first().copied())
		.ok_or_else(|| Error::GpuInit("connector has no encoder".into()))?;
	let encoder = card.get_encoder(encoder_handle).map_err(|e| Error::GpuInit(format!("get_encoder: {e}")))?;
	let possible_crtcs = encoder.possible_crtcs();
	let crtc_handle = resources
		.filter_crtcs(possible_crtcs)
		.first()
		.copied()
		.ok_or_else(|| Error::GpuInit("no usable crtc".into()))?;

	let plane_resources =
		card.plane_handles().map_err(|e| Error::GpuInit(format!("plane_handles: {e}")))?;
	let plane_handle = plane_resources
		.iter()
		.find_map(|&p| {
			let info = card.get_plane(p).ok()?;
			if !info.possible_crtcs().contains(crtc_handle) {
				return None;
			}
			let props = card.get_properties(p).ok()?;
			let is_primary = props.as_props_and_values().0.iter().zip(props.as_props_and_values().1).any(
				|(&prop, &value)| {
					card.get_property(prop)
						.ok()
						.and_then(|info| info.value_type().convert_value(value).as_enum().copied())
						.map(|v| v.name().to_str() == Ok("Primary"))
						.unwrap_or(false)
				},
			);
			is_primary.then_some(p)
		})
		.ok_or_else(|| Error::GpuInit("no primary plane on the selected crtc".into()))?;

	let props = PropertyIds {
		connector_crtc_id: find_property(card, connector_handle, "CRTC_ID")?,
		crtc_mode_id: find_property(card, crtc_handle, "MODE_ID")?,
		crtc_active: find_property(card, crtc_handle, "ACTIVE")?,
		plane_fb_id: find_property(card, plane_handle, "FB_ID")?,
		plane_crtc_id: find_property(card, plane_handle, "CRTC_ID")?,
		plane_src_x: find_property(card, plane_handle, "SRC_X")?,
		plane_src_y: find_property(card, plane_handle, "SRC_Y")?,
		plane_src_w: find_property(card, plane_handle, "SRC_W")?,
		plane_src_h: find_property(card, plane_handle, "SRC_H")?,
		plane_crtc_x: find_property(card, plane_handle, "CRTC_X")?,
		plane_crtc_y: find_property(card, plane_handle, "CRTC_Y")?,
		plane_crtc_w: find_property(card, plane_handle, "CRTC_W")?,
		plane_crtc_h: find_property(card, plane_handle, "CRTC_H")?,
	};

	Ok(DisplayTarget {
		connector: connector_handle,
		crtc: crtc_handle,
		plane: plane_handle,
		mode,
		width: mode.size().0 as u32,
		height: mode.size().1 as u32,
		props,
	})
}
