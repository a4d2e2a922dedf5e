//! Off-screen baking: the device abstraction that executes texel programs into
//! render targets, a pool of reusable bakers, and a CPU implementation of the
//! device.
//!
//! All device state transitions happen on the calling thread. Work dispatched
//! on frame `f` completes on a later frame and is observed by polling, never
//! by blocking the caller on an unfinished pass.

mod cpu;
mod device;
mod error;
mod material;
mod pool;
mod texture;
mod types;

pub use cpu::{CpuBakeDevice, CpuBakeSettings};
pub use device::BakeDevice;
pub use error::BakeError;
pub use material::{BakeMaterial, TexelProgram, texel_uv};
pub use pool::{BakerLease, BakerPool, BakerPoolStats, BakerSignature};
pub use texture::{TexelInputs, TextureData};
pub use types::{
    BakeStatus, BakeTicket, BakerId, FrameIndex, OwnerId, RenderTargetId, SnapshotId,
    SurfaceFormat, TextureHandle,
};
