//! Linux KMS/DRM atomic presenter: direct-to-display output with no window
//! server, driven entirely by the `drm`/`gbm`/`khronos-egl` crates. Not
//! grounded on a teacher file — none of the retrieval pack touches KMS —
//! so this module follows each crate's own idiomatic API instead.

pub mod device;
pub mod presenter;

pub use device::{discover, Card, DisplayTarget};
pub use presenter::AtomicPresenter;

/// KMS reuses the core's error taxonomy verbatim: every failure here is one
/// of `gpu::Error`'s existing kinds (`GpuInit` for setup, `GpuLoss` for a
/// failed lock/commit, `Interrupted` for `EINTR` in `select`).
pub use gpu::Error;

pub const DEFAULT_CARD_PATH: &str = "/dev/dri/card0";
