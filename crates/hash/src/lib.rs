//! FNV-1a 64 hashing and the per-run final/aggregate fingerprint tracker.

/// FNV-1a 64 offset basis.
pub const FNV_OFFSET_BASIS: u64 = 0xCBF2_9CE4_8422_2325;
/// FNV-1a 64 prime.
pub const FNV_PRIME: u64 = 0x0000_0001_0000_01B3;

/// Extends `hash` with `data` using FNV-1a 64.
pub fn fnv1a64_extend(mut hash: u64, data: &[u8]) -> u64 {
	for &byte in data {
		hash ^= byte as u64;
		hash = hash.wrapping_mul(FNV_PRIME);
	}
	hash
}

/// FNV-1a 64 of `data` alone, i.e. `fnv1a64_extend(OFFSET_BASIS, data)`.
pub fn fnv1a64_bytes(data: &[u8]) -> u64 {
	fnv1a64_extend(FNV_OFFSET_BASIS, data)
}

/// Mixes a `u64` frame hash into a running aggregate as 8 little-endian bytes.
pub fn fnv1a64_mix_u64(hash: u64, value: u64) -> u64 {
	fnv1a64_extend(hash, &value.to_le_bytes())
}

/// Folds a 64-bit value into 32 bits (xor-fold), used when a pattern needs a
/// 32-bit seed derived from a wider source such as monotonic time.
pub fn fold_u64_to_u32(value: u64) -> u32 {
	(value ^ (value >> 32)) as u32
}

/// Canonical row-wise FNV-1a 64 over an RGBA8 image. Iterates rows top to
/// bottom by default; `rows_bottom_to_top` flips the row order for
/// backends (e.g. GL readbacks) whose framebuffer origin is bottom-left.
/// Returns `0` for a degenerate image (zero width/height, or `stride`
/// shorter than one row) — callers treat that as `HashReadback` failure.
pub fn hash_rgba8_canonical(
	pixels: &[u8],
	width: u32,
	height: u32,
	stride_bytes: usize,
	rows_bottom_to_top: bool,
) -> u64 {
	if pixels.is_empty() || width == 0 || height == 0 {
		return 0;
	}
	let row_bytes = width as usize * 4;
	if stride_bytes < row_bytes {
		return 0;
	}

	let mut hash = FNV_OFFSET_BASIS;
	for row in 0..height {
		let src_row = if rows_bottom_to_top { height - 1 - row } else { row };
		let offset = src_row as usize * stride_bytes;
		let Some(row_slice) = pixels.get(offset..offset + row_bytes) else {
			return 0;
		};
		hash = fnv1a64_extend(hash, row_slice);
	}
	hash
}

/// Which flavor of per-frame hashing a run computes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashMode {
	None,
	State,
	Pixel,
	Both,
}

impl HashMode {
	pub fn parse(s: &str) -> Option<Self> {
		match s {
			"none" => Some(HashMode::None),
			"state" => Some(HashMode::State),
			"pixel" => Some(HashMode::Pixel),
			"both" => Some(HashMode::Both),
			_ => None,
		}
	}

	pub fn wants_state(self) -> bool {
		matches!(self, HashMode::State | HashMode::Both)
	}

	pub fn wants_pixel(self) -> bool {
		matches!(self, HashMode::Pixel | HashMode::Both)
	}
}

/// Which lines the tracker emits at shutdown.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportMode {
	Final,
	Aggregate,
	Both,
}

impl ReportMode {
	pub fn parse(s: &str) -> Option<Self> {
		match s {
			"final" => Some(ReportMode::Final),
			"aggregate" => Some(ReportMode::Aggregate),
			"both" => Some(ReportMode::Both),
			_ => None,
		}
	}

	pub fn wants_final(self) -> bool {
		matches!(self, ReportMode::Final | ReportMode::Both)
	}

	pub fn wants_aggregate(self) -> bool {
		matches!(self, ReportMode::Aggregate | ReportMode::Both)
	}
}

/// Per-run hash fingerprint: the last frame's hash plus a running FNV-1a
/// extension over every frame hash seen so far, in frame order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HashTracker {
	pub enabled: bool,
	pub final_hash: u64,
	pub aggregate: u64,
	pub report_final: bool,
	pub report_aggregate: bool,
	pub key: String,
}

impl HashTracker {
	pub fn new(key: impl Into<String>, report: ReportMode) -> Self {
		Self {
			enabled: true,
			final_hash: 0,
			aggregate: FNV_OFFSET_BASIS,
			report_final: report.wants_final(),
			report_aggregate: report.wants_aggregate(),
			key: key.into(),
		}
	}

	pub fn disabled(key: impl Into<String>) -> Self {
		Self {
			enabled: false,
			final_hash: 0,
			aggregate: FNV_OFFSET_BASIS,
			report_final: false,
			report_aggregate: false,
			key: key.into(),
		}
	}

	/// Records one frame's hash. Must be called at most once per frame —
	/// retried/dropped frames must not call this twice (see the driver
	/// loop's ordering guarantees).
	pub fn record(&mut self, h: u64) {
		if !self.enabled {
			return;
		}
		self.final_hash = h;
		self.aggregate = fnv1a64_mix_u64(self.aggregate, h);
	}

	/// Formats the shutdown line(s), e.g. `bo_hash_final=0x... bo_hash_aggregate=0x...`.
	pub fn report_line(&self) -> Option<String> {
		if !self.enabled || !(self.report_final || self.report_aggregate) {
			return None;
		}
		let mut parts = Vec::new();
		if self.report_final {
			parts.push(format!("{}_final=0x{:016x}", self.key, self.final_hash));
		}
		if self.report_aggregate {
			parts.push(format!("{}_aggregate=0x{:016x}", self.key, self.aggregate));
		}
		Some(parts.join(" "))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_hash_is_offset_basis() {
		assert_eq!(fnv1a64_bytes(&[]), FNV_OFFSET_BASIS);
	}

	#[test]
	fn concatenation_equals_extension() {
		let a = b"hello ";
		let b = b"world";
		let mut combined = Vec::new();
		combined.extend_from_slice(a);
		combined.extend_from_slice(b);
		let direct = fnv1a64_bytes(&combined);
		let extended = fnv1a64_extend(fnv1a64_bytes(a), b);
		assert_eq!(direct, extended);
	}

	#[test]
	fn degenerate_image_hashes_to_zero() {
		assert_eq!(hash_rgba8_canonical(&[], 10, 10, 40, false), 0);
		assert_eq!(hash_rgba8_canonical(&[0; 40], 0, 10, 40, false), 0);
		assert_eq!(hash_rgba8_canonical(&[0; 10], 10, 1, 4, false), 0);
	}

	#[test]
	fn bottom_to_top_reverses_row_order() {
		let width = 1u32;
		let height = 2u32;
		let stride = 4usize;
		let mut pixels = vec![0u8; stride * height as usize];
		pixels[0..4].copy_from_slice(&[1, 2, 3, 4]);
		pixels[4..8].copy_from_slice(&[5, 6, 7, 8]);

		let top_down = hash_rgba8_canonical(&pixels, width, height, stride, false);
		let bottom_up = hash_rgba8_canonical(&pixels, width, height, stride, true);
		assert_ne!(top_down, bottom_up);

		let mut swapped = vec![0u8; stride * height as usize];
		swapped[0..4].copy_from_slice(&[5, 6, 7, 8]);
		swapped[4..8].copy_from_slice(&[1, 2, 3, 4]);
		assert_eq!(bottom_up, hash_rgba8_canonical(&swapped, width, height, stride, false));
	}

	#[test]
	fn aggregate_matches_manual_fold() {
		let mut tracker = HashTracker::new("bo_hash", ReportMode::Both);
		let hashes = [1u64, 2, 3, 4];
		for h in hashes {
			tracker.record(h);
		}
		let mut expected = FNV_OFFSET_BASIS;
		for h in hashes {
			expected = fnv1a64_mix_u64(expected, h);
		}
		assert_eq!(tracker.aggregate, expected);
		assert_eq!(tracker.final_hash, 4);
	}

	#[test]
	fn report_line_format() {
		let mut tracker = HashTracker::new("bo_hash", ReportMode::Both);
		tracker.record(0xABCD);
		let line = tracker.report_line().unwrap();
		assert!(line.contains("bo_hash_final=0x000000000000abcd"));
		assert!(line.contains("bo_hash_aggregate=0x"));
	}
}
