//! Distance-based LOD with viewer-movement hysteresis.

use std::collections::HashMap;

use glam::Vec3;
use strata_config::LodConfig;
use strata_math::{TiledAabb, TiledFloat3};

use crate::{DensityModifier, HeightDensityModifier, LodStrategy, TerrainId};

/// Smallest distance used by the inverse-square falloff, in meters.
///
/// Guards the viewer standing inside a tile's bounds.
pub const MIN_DISTANCE: f64 = 1e-3;

/// Tuning for [`DistanceLod`].
#[derive(Clone, Debug, PartialEq)]
pub struct DistanceLodSettings {
    /// Viewer travel distance after which an update is requested.
    pub update_distance_meters: f32,
    /// Vertices needed to tessellate a 1x1 meter surface seen from 1 meter.
    pub one_meter_vertex_density: f32,
    /// Maximum vertices per square meter.
    pub max_vertex_density: f32,
    pub max_divisions_per_update: u32,
}

impl Default for DistanceLodSettings {
    fn default() -> Self {
        Self::from(&LodConfig::default())
    }
}

impl From<&LodConfig> for DistanceLodSettings {
    fn from(config: &LodConfig) -> Self {
        Self {
            update_distance_meters: config.update_distance_meters,
            one_meter_vertex_density: config.one_meter_vertex_density,
            max_vertex_density: config.max_vertex_density,
            max_divisions_per_update: config.max_divisions_per_update,
        }
    }
}

/// Vertex density falls off with the square of the viewer's distance to a
/// tile's bounds, matching the shrinking screen-space footprint.
pub struct DistanceLod {
    settings: DistanceLodSettings,
    viewer: TiledFloat3,
    last_update_positions: HashMap<TerrainId, TiledFloat3>,
    modifiers: Vec<Box<dyn DensityModifier>>,
}

impl DistanceLod {
    /// Create a strategy with no density modifiers and the viewer at the origin.
    pub fn new(settings: DistanceLodSettings) -> Self {
        Self {
            settings,
            viewer: TiledFloat3::ZERO,
            last_update_positions: HashMap::new(),
            modifiers: Vec::new(),
        }
    }

    /// Create a strategy from config, including the height density modifier.
    pub fn from_config(config: &LodConfig) -> Self {
        let mut lod = Self::new(DistanceLodSettings::from(config));
        lod.add_modifier(Box::new(HeightDensityModifier::from(config)));
        lod
    }

    pub fn add_modifier(&mut self, modifier: Box<dyn DensityModifier>) {
        self.modifiers.push(modifier);
    }

    pub fn modifier_count(&self) -> usize {
        self.modifiers.len()
    }

    pub fn set_viewer_position(&mut self, position: TiledFloat3) {
        self.viewer = position;
    }

    pub fn viewer_position(&self) -> TiledFloat3 {
        self.viewer
    }

    pub fn settings(&self) -> &DistanceLodSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut DistanceLodSettings {
        &mut self.settings
    }

    /// Distance-only density before modifiers, clamped to the maximum.
    pub fn base_density_at(&self, distance: f64) -> f32 {
        let d = distance.max(MIN_DISTANCE);
        let density = f64::from(self.settings.one_meter_vertex_density) / (d * d);
        density.min(f64::from(self.settings.max_vertex_density)) as f32
    }
}

impl LodStrategy for DistanceLod {
    fn needs_update(&mut self, terrain: TerrainId) -> bool {
        let Some(last) = self.last_update_positions.get(&terrain) else {
            return true;
        };
        let moved = self.viewer.distance(last);
        if moved > f64::from(self.settings.update_distance_meters) {
            // Baseline is stale until the terrain signals completion again.
            self.last_update_positions.remove(&terrain);
            tracing::trace!(%terrain, moved, "viewer moved past LOD update distance");
            return true;
        }
        false
    }

    fn signal_update_completion(&mut self, terrain: TerrainId) {
        self.last_update_positions.insert(terrain, self.viewer);
    }

    fn required_density(
        &self,
        bounds: &TiledAabb,
        surface_normal: Vec3,
        min_height: f32,
        max_height: f32,
    ) -> f32 {
        let mut density = self.base_density_at(bounds.distance_from(&self.viewer));
        for modifier in &self.modifiers {
            density *= modifier.density_multiplier(bounds, surface_normal, min_height, max_height);
        }
        density.min(self.settings.max_vertex_density)
    }

    fn max_divisions_per_update(&self) -> u32 {
        self.settings.max_divisions_per_update
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::IVec3;
    use strata_math::Aabb;

    fn unit_box_at_origin() -> TiledAabb {
        TiledAabb::new(IVec3::ZERO, Aabb::new(Vec3::ZERO, Vec3::ONE))
    }

    fn viewer_at(x: f64) -> TiledFloat3 {
        TiledFloat3::from_dvec3(glam::DVec3::new(x, 0.5, 0.5))
    }

    /// A terrain never seen before always needs an update.
    #[test]
    fn test_first_call_needs_update() {
        let mut lod = DistanceLod::new(DistanceLodSettings::default());
        assert!(lod.needs_update(TerrainId(1)));
        assert!(lod.needs_update(TerrainId(1)));
    }

    /// Small viewer movements after a completed update are absorbed.
    #[test]
    fn test_hysteresis_absorbs_small_moves() {
        let mut lod = DistanceLod::new(DistanceLodSettings::default());
        let id = TerrainId(7);
        lod.set_viewer_position(viewer_at(0.0));
        lod.signal_update_completion(id);
        assert!(!lod.needs_update(id));

        lod.set_viewer_position(viewer_at(9.5));
        assert!(!lod.needs_update(id));
    }

    /// Moving past the update distance invalidates the baseline until the next completion.
    #[test]
    fn test_large_move_invalidates_baseline() {
        let mut lod = DistanceLod::new(DistanceLodSettings::default());
        let id = TerrainId(7);
        lod.signal_update_completion(id);

        lod.set_viewer_position(viewer_at(10.5));
        assert!(lod.needs_update(id));
        // Moving back does not restore the removed baseline.
        lod.set_viewer_position(TiledFloat3::ZERO);
        assert!(lod.needs_update(id));

        lod.signal_update_completion(id);
        assert!(!lod.needs_update(id));
    }

    #[test]
    fn test_baselines_are_per_terrain() {
        let mut lod = DistanceLod::new(DistanceLodSettings::default());
        lod.signal_update_completion(TerrainId(1));
        assert!(!lod.needs_update(TerrainId(1)));
        assert!(lod.needs_update(TerrainId(2)));
    }

    /// Hysteresis works with a viewer thousands of tiles from the origin.
    #[test]
    fn test_hysteresis_far_from_origin() {
        let mut lod = DistanceLod::new(DistanceLodSettings::default());
        let far = TiledFloat3::new(Vec3::new(3.0, 0.0, 0.0), IVec3::new(50_000, 0, 0));
        lod.set_viewer_position(far);
        lod.signal_update_completion(TerrainId(0));
        lod.set_viewer_position(far + Vec3::new(2.0, 0.0, 0.0));
        assert!(!lod.needs_update(TerrainId(0)));
        lod.set_viewer_position(far + Vec3::new(20.0, 0.0, 0.0));
        assert!(lod.needs_update(TerrainId(0)));
    }

    /// Doubling the distance quarters the density.
    #[test]
    fn test_inverse_square_falloff() {
        let lod = DistanceLod::new(DistanceLodSettings::default());
        let near = lod.base_density_at(8.0);
        let far = lod.base_density_at(16.0);
        assert!((near - 8.0).abs() < 1e-4);
        assert!((far - 2.0).abs() < 1e-4);
    }

    /// Density is non-increasing in distance and never exceeds the maximum.
    #[test]
    fn test_density_monotonic_and_capped() {
        let mut lod = DistanceLod::from_config(&LodConfig::default());
        let bounds = unit_box_at_origin();
        let max = lod.settings().max_vertex_density;
        let mut prev = f32::INFINITY;
        for x in [0.5, 1.0, 1.5, 2.0, 3.0, 5.0, 10.0, 50.0, 500.0, 5000.0] {
            lod.set_viewer_position(viewer_at(x));
            let d = lod.required_density(&bounds, Vec3::Y, 0.0, 300.0);
            assert!(d <= max, "density {d} exceeds max at x={x}");
            assert!(d <= prev, "density increased at x={x}");
            prev = d;
        }
    }

    /// A viewer inside the bounds gets the maximum density instead of dividing by zero.
    #[test]
    fn test_viewer_inside_bounds() {
        let mut lod = DistanceLod::new(DistanceLodSettings::default());
        lod.set_viewer_position(viewer_at(0.5));
        let d = lod.required_density(&unit_box_at_origin(), Vec3::Y, 0.0, 0.0);
        assert!(d.is_finite());
        assert_eq!(d, 64.0);
    }

    /// Modifiers scale the distance density.
    #[test]
    fn test_height_modifier_boosts_density() {
        let mut plain = DistanceLod::new(DistanceLodSettings::default());
        let mut boosted = DistanceLod::from_config(&LodConfig::default());
        assert_eq!(boosted.modifier_count(), 1);
        plain.set_viewer_position(viewer_at(101.0));
        boosted.set_viewer_position(viewer_at(101.0));

        let bounds = unit_box_at_origin();
        let a = plain.required_density(&bounds, Vec3::Y, 0.0, 200.0);
        let b = boosted.required_density(&bounds, Vec3::Y, 0.0, 200.0);
        assert!((b / a - 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_max_divisions_from_config() {
        let config = LodConfig {
            max_divisions_per_update: 3,
            ..LodConfig::default()
        };
        let lod = DistanceLod::from_config(&config);
        assert_eq!(lod.max_divisions_per_update(), 3);
    }
}
