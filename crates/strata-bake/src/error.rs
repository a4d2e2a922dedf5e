//! Bake device error types.

use crate::{BakeTicket, BakerId, OwnerId, RenderTargetId, SnapshotId, TextureHandle};

/// Errors reported by a [`BakeDevice`](crate::BakeDevice) or the baker pool.
#[derive(Debug, thiserror::Error)]
pub enum BakeError {
    #[error("unknown owner {0}")]
    UnknownOwner(OwnerId),

    #[error("unknown render target {0}")]
    UnknownTarget(RenderTargetId),

    #[error("unknown texture {0}")]
    UnknownTexture(TextureHandle),

    #[error("unknown bake ticket {0}")]
    UnknownTicket(BakeTicket),

    #[error("unknown snapshot {0}")]
    UnknownSnapshot(SnapshotId),

    #[error("snapshot {0} is not ready")]
    SnapshotNotReady(SnapshotId),

    #[error("surface {surface} out of range for {target} with {count} surfaces")]
    SurfaceOutOfRange {
        target: RenderTargetId,
        surface: usize,
        count: usize,
    },

    #[error("render target {0} has not been baked")]
    TargetNotBaked(RenderTargetId),

    #[error("render target {0} already has a bake in flight")]
    TargetBusy(RenderTargetId),

    #[error("invalid render target resolution {0}")]
    InvalidResolution(u32),

    #[error("render target needs at least one surface format")]
    NoSurfaceFormats,

    #[error("{0} has no bake in flight")]
    NoPendingBake(BakerId),
}
