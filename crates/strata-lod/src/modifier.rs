//! Density modifiers scaling the distance-based vertex density.

use glam::Vec3;
use strata_config::LodConfig;
use strata_math::TiledAabb;

/// A pure function of a tile's bounds, normal and height range returning a
/// multiplier for its required vertex density.
pub trait DensityModifier: Send + Sync {
    fn density_multiplier(
        &self,
        bounds: &TiledAabb,
        surface_normal: Vec3,
        min_height: f32,
        max_height: f32,
    ) -> f32;
}

/// Boosts density on tiles spanning a large height range, where coarse
/// tessellation would alias steep features.
///
/// The multiplier is `1 + min(height_range * factor, max_multiplier)`.
#[derive(Clone, Debug, PartialEq)]
pub struct HeightDensityModifier {
    pub factor: f32,
    pub max_multiplier: f32,
}

impl Default for HeightDensityModifier {
    fn default() -> Self {
        Self {
            factor: 0.005,
            max_multiplier: 8.0,
        }
    }
}

impl From<&LodConfig> for HeightDensityModifier {
    fn from(config: &LodConfig) -> Self {
        Self {
            factor: config.height_density_multiplier,
            max_multiplier: config.max_height_density_multiplier,
        }
    }
}

impl DensityModifier for HeightDensityModifier {
    fn density_multiplier(
        &self,
        _bounds: &TiledAabb,
        _surface_normal: Vec3,
        min_height: f32,
        max_height: f32,
    ) -> f32 {
        let range = (max_height - min_height).max(0.0);
        1.0 + (range * self.factor).min(self.max_multiplier)
    }
}
