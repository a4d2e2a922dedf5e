use glam::{DVec3, IVec3, Vec3};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Add, Neg, Sub};

/// Size of one coordinate tile in meters.
///
/// Must be an integer exactly representable as f32. All tiled values in the
/// workspace share this constant.
pub const TILE_SIZE: f32 = 1024.0;

/// Bit pattern of an f32 with `-0.0` folded into `0.0`.
///
/// Used by every structural `Eq`/`Hash` implementation in this crate so that
/// equality and hashing agree.
#[inline]
pub(crate) fn canonical_bits(v: f32) -> u32 {
    if v == 0.0 { 0 } else { v.to_bits() }
}

/// A scalar split into an integer tile index and an f32 offset inside the tile.
///
/// The offset stays within `[-TILE_SIZE / 2, TILE_SIZE / 2]` after
/// normalization, so f32 precision is preserved arbitrarily far from the
/// origin.
#[derive(Clone, Copy, Debug, Default)]
pub struct TiledFloat {
    pub value: f32,
    pub tile: i32,
}

impl TiledFloat {
    pub const ZERO: Self = Self { value: 0.0, tile: 0 };

    /// Creates a tiled scalar from an already split tile/value pair.
    pub fn new(value: f32, tile: i32) -> Self {
        Self { value, tile }
    }

    /// Splits an f64 into tile and offset.
    pub fn from_f64(v: f64) -> Self {
        let tile_size = f64::from(TILE_SIZE);
        let tile = (v / tile_size + 0.5).floor() as i32;
        Self {
            value: (v - f64::from(tile) * tile_size) as f32,
            tile,
        }
    }

    /// Moves whole tiles out of the offset into the tile index.
    #[must_use]
    pub fn normalize_tile(self) -> Self {
        let tile_diff = (self.value / TILE_SIZE + 0.5).floor() as i32;
        Self {
            value: self.value - tile_diff as f32 * TILE_SIZE,
            tile: self.tile + tile_diff,
        }
    }

    /// Full-precision value.
    pub fn to_f64(self) -> f64 {
        f64::from(self.tile) * f64::from(TILE_SIZE) + f64::from(self.value)
    }
}

impl PartialEq for TiledFloat {
    fn eq(&self, other: &Self) -> bool {
        self.tile == other.tile && canonical_bits(self.value) == canonical_bits(other.value)
    }
}

impl Eq for TiledFloat {}

impl Hash for TiledFloat {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.tile.hash(state);
        canonical_bits(self.value).hash(state);
    }
}

impl Add for TiledFloat {
    type Output = TiledFloat;

    fn add(self, rhs: TiledFloat) -> Self::Output {
        TiledFloat::new(self.value + rhs.value, self.tile + rhs.tile).normalize_tile()
    }
}

impl Sub for TiledFloat {
    type Output = TiledFloat;

    fn sub(self, rhs: TiledFloat) -> Self::Output {
        TiledFloat::new(self.value - rhs.value, self.tile - rhs.tile).normalize_tile()
    }
}

impl Neg for TiledFloat {
    type Output = TiledFloat;

    fn neg(self) -> Self::Output {
        TiledFloat::new(-self.value, -self.tile)
    }
}

/// A 3D position with a per-axis integer tile and f32 local offset.
///
/// Used for viewer positions and tile origins on planet-scale surfaces.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TiledFloat3 {
    pub x: TiledFloat,
    pub y: TiledFloat,
    pub z: TiledFloat,
}

impl TiledFloat3 {
    pub const ZERO: Self = Self {
        x: TiledFloat::ZERO,
        y: TiledFloat::ZERO,
        z: TiledFloat::ZERO,
    };

    /// Creates a position from a local offset inside `tile`.
    pub fn new(local: Vec3, tile: IVec3) -> Self {
        Self {
            x: TiledFloat::new(local.x, tile.x),
            y: TiledFloat::new(local.y, tile.y),
            z: TiledFloat::new(local.z, tile.z),
        }
    }

    /// Creates a normalized position from an f64 vector.
    pub fn from_dvec3(v: DVec3) -> Self {
        Self {
            x: TiledFloat::from_f64(v.x),
            y: TiledFloat::from_f64(v.y),
            z: TiledFloat::from_f64(v.z),
        }
    }

    /// Creates a normalized position from an f32 vector relative to the origin.
    pub fn from_vec3(v: Vec3) -> Self {
        Self::new(v, IVec3::ZERO).normalize_tile()
    }

    /// The local offsets, without the tile.
    pub fn local(&self) -> Vec3 {
        Vec3::new(self.x.value, self.y.value, self.z.value)
    }

    /// The per-axis tile indices.
    pub fn tile(&self) -> IVec3 {
        IVec3::new(self.x.tile, self.y.tile, self.z.tile)
    }

    #[must_use]
    pub fn normalize_tile(self) -> Self {
        Self {
            x: self.x.normalize_tile(),
            y: self.y.normalize_tile(),
            z: self.z.normalize_tile(),
        }
    }

    /// Full-precision position.
    pub fn to_dvec3(&self) -> DVec3 {
        DVec3::new(self.x.to_f64(), self.y.to_f64(), self.z.to_f64())
    }

    /// Position relative to the origin of `reference_tile`, in f64.
    pub fn to_dvec3_relative(&self, reference_tile: IVec3) -> DVec3 {
        (*self - TiledFloat3::new(Vec3::ZERO, reference_tile)).to_dvec3()
    }

    /// Euclidean distance computed in f64.
    pub fn distance(&self, other: &TiledFloat3) -> f64 {
        (*self - *other).to_dvec3().length()
    }
}

impl Add for TiledFloat3 {
    type Output = TiledFloat3;

    fn add(self, rhs: TiledFloat3) -> Self::Output {
        TiledFloat3 {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
            z: self.z + rhs.z,
        }
    }
}

impl Add<Vec3> for TiledFloat3 {
    type Output = TiledFloat3;

    fn add(self, rhs: Vec3) -> Self::Output {
        self + TiledFloat3::new(rhs, IVec3::ZERO)
    }
}

impl Sub for TiledFloat3 {
    type Output = TiledFloat3;

    fn sub(self, rhs: TiledFloat3) -> Self::Output {
        TiledFloat3 {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
            z: self.z - rhs.z,
        }
    }
}

impl fmt::Display for TiledFloat3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.to_dvec3();
        write!(f, "Tiled({:.3}, {:.3}, {:.3})", v.x, v.y, v.z)
    }
}
