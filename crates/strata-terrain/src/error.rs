//! Tile data error types.

use strata_bake::BakeError;

use crate::AreaKey;

/// Errors surfaced by a tile data source.
#[derive(Debug, thiserror::Error)]
pub enum TileDataError {
    #[error("no baking request for area {0}")]
    UnknownArea(AreaKey),

    #[error("step {step} failed for area {area}: {reason}")]
    BakeFailed {
        area: AreaKey,
        step: String,
        reason: String,
    },

    #[error("displacement readback for area {0} returned no samples")]
    EmptyReadback(AreaKey),

    #[error("request for area {0} finished without all of its textures")]
    IncompleteResult(AreaKey),

    #[error("bake device error: {0}")]
    Device(#[from] BakeError),
}
