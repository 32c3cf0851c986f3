use crate::{Color, BANDS_COUNT};

const PULSE_BASE: f32 = 0.5;
const PULSE_AMP: f32 = 0.5;
const PULSE_FREQ: f32 = 2.0;
const PULSE_PHASE: f32 = 0.3;
const COLOR_R_BASE: f32 = 0.2;
const COLOR_R_SCALE: f32 = 0.8;
const COLOR_G_SCALE: f32 = 0.6;

/// One band's full-height color for this frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BandDamage {
	pub band: u32,
	pub color: Color,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BandsPlan {
	pub bands: Vec<BandDamage>,
}

/// Bands are cheap: every band is repainted every frame.
pub fn bands_plan(t: f32) -> BandsPlan {
	let bands = (0..BANDS_COUNT)
		.map(|b| BandDamage { band: b, color: band_color(b, t) })
		.collect();
	BandsPlan { bands }
}

pub fn band_color(b: u32, t: f32) -> Color {
	let pulse = PULSE_BASE + PULSE_AMP * (PULSE_FREQ * t + PULSE_PHASE * b as f32).sin();
	let r = pulse * (COLOR_R_BASE + COLOR_R_SCALE * b as f32 / BANDS_COUNT as f32);
	let g = pulse * COLOR_G_SCALE;
	let b_channel = 1.0 - r;
	Color::new(r, g, b_channel, 1.0)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn plan_covers_every_band_every_frame() {
		let plan = bands_plan(1.5);
		assert_eq!(plan.bands.len(), BANDS_COUNT as usize);
		for (i, d) in plan.bands.iter().enumerate() {
			assert_eq!(d.band, i as u32);
		}
	}

	#[test]
	fn alpha_is_always_opaque() {
		for b in 0..BANDS_COUNT {
			assert_eq!(band_color(b, 0.0).a, 1.0);
		}
	}

	#[test]
	fn deterministic_across_calls() {
		assert_eq!(band_color(5, 0.73), band_color(5, 0.73));
	}
}
