use std::fmt;

use glam::Vec3;
use strata_math::TiledAabb;

/// Identifies a terrain consuming a LOD strategy.
///
/// One strategy instance may serve several terrains, each with its own update
/// baseline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TerrainId(pub u32);

impl fmt::Display for TerrainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "terrain#{}", self.0)
    }
}

/// Decides when a terrain should refresh its subdivision and how many vertices
/// per square meter each tile requires.
pub trait LodStrategy {
    /// Returns true if the terrain has no recorded baseline or the viewer has
    /// moved far enough since the last completed update.
    fn needs_update(&mut self, terrain: TerrainId) -> bool;

    /// Records the current viewer position as the terrain's baseline.
    fn signal_update_completion(&mut self, terrain: TerrainId);

    /// Vertices per square meter required for a tile with the given bounds.
    fn required_density(
        &self,
        bounds: &TiledAabb,
        surface_normal: Vec3,
        min_height: f32,
        max_height: f32,
    ) -> f32;

    /// Upper bound on subdivisions or merges a terrain applies per update pass.
    fn max_divisions_per_update(&self) -> u32;
}
