//! Level-of-detail strategies: decide when a terrain re-evaluates its tile
//! subdivision and how densely each tile must be tessellated.

mod distance;
mod modifier;
mod strategy;

pub use distance::{DistanceLod, DistanceLodSettings, MIN_DISTANCE};
pub use modifier::{DensityModifier, HeightDensityModifier};
pub use strategy::{LodStrategy, TerrainId};
