use glam::{IVec3, Vec3};

use crate::TiledFloat3;

/// Axis-aligned bounding box in f32 local space.
///
/// Invariant: `min <= max` on every axis. The constructor enforces this by
/// swapping components if needed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Create an AABB from two corners.
    pub fn new(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Smallest AABB enclosing all `points`. Returns `None` for an empty slice.
    pub fn from_points(points: &[Vec3]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut bounds = Self::new(*first, *first);
        for p in rest {
            bounds.min = bounds.min.min(*p);
            bounds.max = bounds.max.max(*p);
        }
        Some(bounds)
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Returns true if the point lies inside or on the boundary.
    pub fn contains_point(&self, p: Vec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }

    /// Distance from `p` to the closest point of the box; zero inside.
    pub fn distance_to_point(&self, p: Vec3) -> f32 {
        (p.clamp(self.min, self.max) - p).length()
    }
}

/// An [`Aabb`] expressed relative to the origin of a coordinate tile.
///
/// Tile bounds are kept in the frame of the tile's own position so that
/// their f32 extents stay precise far from the world origin.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TiledAabb {
    pub tile: IVec3,
    pub bounds: Aabb,
}

impl TiledAabb {
    pub fn new(tile: IVec3, bounds: Aabb) -> Self {
        Self { tile, bounds }
    }

    /// Distance from a tiled point to the box, computed in f64.
    pub fn distance_from(&self, point: &TiledFloat3) -> f64 {
        let p = point.to_dvec3_relative(self.tile);
        let min = self.bounds.min.as_dvec3();
        let max = self.bounds.max.as_dvec3();
        (p.clamp(min, max) - p).length()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_sorts_corners() {
        let aabb = Aabb::new(Vec3::new(10.0, 0.0, 5.0), Vec3::new(0.0, 10.0, -5.0));
        assert_eq!(aabb.min, Vec3::new(0.0, 0.0, -5.0));
        assert_eq!(aabb.max, Vec3::new(10.0, 10.0, 5.0));
    }

    #[test]
    fn test_distance_inside_is_zero() {
        let aabb = Aabb::new(Vec3::ZERO, Vec3::splat(10.0));
        assert_eq!(aabb.distance_to_point(Vec3::splat(5.0)), 0.0);
        assert!(aabb.contains_point(Vec3::splat(5.0)));
    }

    #[test]
    fn test_distance_outside() {
        let aabb = Aabb::new(Vec3::ZERO, Vec3::splat(10.0));
        let d = aabb.distance_to_point(Vec3::new(13.0, 14.0, 5.0));
        assert!((d - 5.0).abs() < 1e-5);
    }

    #[test]
    fn test_from_points() {
        let a = Aabb::from_points(&[Vec3::ZERO, Vec3::new(1.0, 2.0, -3.0)]).unwrap();
        assert_eq!(a.min, Vec3::new(0.0, 0.0, -3.0));
        assert_eq!(a.max, Vec3::new(1.0, 2.0, 0.0));
        assert!(Aabb::from_points(&[]).is_none());
    }

    #[test]
    fn test_tiled_distance_far_from_origin() {
        let tile = IVec3::new(10_000, 0, 0);
        let bounds = TiledAabb::new(tile, Aabb::new(Vec3::ZERO, Vec3::splat(1.0)));
        let viewer = TiledFloat3::new(Vec3::new(4.0, 0.5, 0.5), tile);
        assert!((bounds.distance_from(&viewer) - 3.0).abs() < 1e-6);
    }
}
