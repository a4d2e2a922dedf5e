use glam::{DVec2, Vec2, Vec3};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::tiled::canonical_bits;
use crate::{Aabb, TiledAabb, TiledFloat3};

fn canonical(v: Vec3) -> Vec3 {
    Vec3::new(v.x + 0.0, v.y + 0.0, v.z + 0.0)
}

/// A rectangle in tiled 3D space: an origin corner, two orthogonal unit edge
/// directions and the edge lengths.
///
/// Equality and hashing are structural and exact (bitwise on every float
/// component, `-0.0 == 0.0`). Two rectangles built by the same deterministic
/// code path compare equal; rectangles that differ by rounding do not.
#[derive(Clone, Copy, Debug)]
pub struct TiledRect3 {
    position: TiledFloat3,
    x_dir: Vec3,
    y_dir: Vec3,
    size: Vec2,
}

impl TiledRect3 {
    /// Creates a rectangle from its first corner and side directions.
    ///
    /// Both directions are normalized and the second one is re-orthogonalized
    /// against the first.
    pub fn new(position: TiledFloat3, x_dir: Vec3, y_dir: Vec3, size: Vec2) -> Self {
        let x_dir = x_dir.normalize();
        let normal = y_dir.normalize().cross(x_dir);
        let y_dir = x_dir.cross(normal).normalize();
        Self {
            position,
            x_dir: canonical(x_dir),
            y_dir: canonical(y_dir),
            size: Vec2::new(size.x + 0.0, size.y + 0.0),
        }
    }

    pub fn position(&self) -> TiledFloat3 {
        self.position
    }

    pub fn x_dir(&self) -> Vec3 {
        self.x_dir
    }

    pub fn y_dir(&self) -> Vec3 {
        self.y_dir
    }

    pub fn size(&self) -> Vec2 {
        self.size
    }

    /// Unit normal, `y_dir × x_dir`.
    pub fn normal(&self) -> Vec3 {
        self.y_dir.cross(self.x_dir)
    }

    pub fn center(&self) -> TiledFloat3 {
        self.position_at(Vec2::splat(0.5))
    }

    /// The corner opposite to [`position`](Self::position).
    pub fn end_corner(&self) -> TiledFloat3 {
        self.position_at(Vec2::ONE)
    }

    /// Point on the rectangle at normalized coordinates, `(0, 0)` being the
    /// position and `(1, 1)` the end corner.
    pub fn position_at(&self, coords: Vec2) -> TiledFloat3 {
        self.position + self.local_offset_at(coords)
    }

    /// Offset from the position to the point at `coords`.
    pub fn local_offset_at(&self, coords: Vec2) -> Vec3 {
        self.x_dir * (coords.x * self.size.x) + self.y_dir * (coords.y * self.size.y)
    }

    /// Normalized coordinates of `point` projected on the rectangle plane,
    /// computed in f64.
    pub fn coords_at(&self, point: &TiledFloat3) -> DVec2 {
        let local = (*point - self.position).to_dvec3();
        DVec2::new(
            local.dot(self.x_dir.as_dvec3()) / f64::from(self.size.x),
            local.dot(self.y_dir.as_dvec3()) / f64::from(self.size.y),
        )
    }

    /// Returns true if the projection of `point` falls inside the rectangle.
    pub fn contains_projection(&self, point: &TiledFloat3) -> bool {
        let c = self.coords_at(point);
        (0.0..=1.0).contains(&c.x) && (0.0..=1.0).contains(&c.y)
    }

    /// Corners in order: position, +x, +y, end corner.
    pub fn corners(&self) -> [TiledFloat3; 4] {
        [
            self.position,
            self.position_at(Vec2::new(1.0, 0.0)),
            self.position_at(Vec2::new(0.0, 1.0)),
            self.end_corner(),
        ]
    }

    /// True if both rectangles share orientation and lie on the same plane.
    pub fn is_coplanar_with(&self, other: &TiledRect3) -> bool {
        if self.normal() != other.normal() {
            return false;
        }
        (self.position - other.position)
            .to_dvec3()
            .dot(self.normal().as_dvec3())
            .abs()
            < 1e-6
    }

    /// The four quadrants of this rectangle, in the same order as
    /// [`corners`](Self::corners).
    ///
    /// Children are derived only from their parent, so repeated subdivision of
    /// the same root always yields bitwise-identical keys.
    pub fn subdivide(&self) -> [TiledRect3; 4] {
        let half = self.size * 0.5;
        let child = |coords: Vec2| TiledRect3 {
            position: self.position_at(coords),
            x_dir: self.x_dir,
            y_dir: self.y_dir,
            size: half,
        };
        [
            child(Vec2::ZERO),
            child(Vec2::new(0.5, 0.0)),
            child(Vec2::new(0.0, 0.5)),
            child(Vec2::splat(0.5)),
        ]
    }

    /// Bounds of the rectangle extruded along its normal between the given
    /// heights, in the frame of the rectangle's tile.
    pub fn bounds(&self, min_height: f32, max_height: f32) -> TiledAabb {
        let tile = self.position.tile();
        let origin = self.position.local();
        let normal = self.normal();
        let mut points = [Vec3::ZERO; 8];
        let coords = [Vec2::ZERO, Vec2::X, Vec2::Y, Vec2::ONE];
        for (i, c) in coords.iter().enumerate() {
            let p = origin + self.local_offset_at(*c);
            points[i * 2] = p + normal * min_height;
            points[i * 2 + 1] = p + normal * max_height;
        }
        let bounds = Aabb::from_points(&points).unwrap_or(Aabb::new(origin, origin));
        TiledAabb::new(tile, bounds)
    }
}

impl PartialEq for TiledRect3 {
    fn eq(&self, other: &Self) -> bool {
        self.position == other.position
            && self.x_dir.to_array().map(canonical_bits) == other.x_dir.to_array().map(canonical_bits)
            && self.y_dir.to_array().map(canonical_bits) == other.y_dir.to_array().map(canonical_bits)
            && self.size.to_array().map(canonical_bits) == other.size.to_array().map(canonical_bits)
    }
}

impl Eq for TiledRect3 {}

impl Hash for TiledRect3 {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.position.hash(state);
        self.x_dir.to_array().map(canonical_bits).hash(state);
        self.y_dir.to_array().map(canonical_bits).hash(state);
        self.size.to_array().map(canonical_bits).hash(state);
    }
}

impl fmt::Display for TiledRect3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=>{}", self.position, self.end_corner())
    }
}
