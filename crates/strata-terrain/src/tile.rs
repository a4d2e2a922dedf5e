//! Tile identity, baking arguments and the data handed to consumers.

use std::collections::HashMap;

use glam::{DVec3, Vec2};
use strata_bake::{OwnerId, TextureHandle};
use strata_math::{TiledFloat3, TiledRect3};

/// Identity of a terrain tile: its origin corner, edge directions and size.
///
/// Used verbatim as the request table key. Keys built by the same
/// subdivision path compare equal bitwise.
pub type AreaKey = TiledRect3;

/// Shape of the surface a terrain is laid on.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum Curvature {
    #[default]
    Flat,
    /// Tile points are projected radially onto a sphere.
    Spherical { center: TiledFloat3, radius: f64 },
}

impl Curvature {
    /// World position of the surface point at normalized tile coordinates.
    pub fn surface_point(&self, area: &AreaKey, uv: Vec2) -> DVec3 {
        let p = area.position_at(uv).to_dvec3();
        match self {
            Curvature::Flat => p,
            Curvature::Spherical { center, radius } => {
                let c = center.to_dvec3();
                c + (p - c).normalize_or(area.normal().as_dvec3()) * *radius
            }
        }
    }

    /// Unit surface normal at normalized tile coordinates.
    pub fn surface_normal(&self, area: &AreaKey, uv: Vec2) -> DVec3 {
        match self {
            Curvature::Flat => area.normal().as_dvec3(),
            Curvature::Spherical { center, .. } => {
                let p = area.position_at(uv).to_dvec3();
                (p - center.to_dvec3()).normalize_or(area.normal().as_dvec3())
            }
        }
    }
}

/// Baseline tile fields produced by a provider's initializer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TileLayout {
    pub texcoord_offset: Vec2,
    pub texcoord_scale: Vec2,
    pub displacement_offset: f32,
    pub displacement_scale: f32,
    /// Placeholder until the displacement readback completes.
    pub displacement_min: f32,
    /// Placeholder until the displacement readback completes.
    pub displacement_max: f32,
}

impl Default for TileLayout {
    fn default() -> Self {
        Self {
            texcoord_offset: Vec2::ZERO,
            texcoord_scale: Vec2::ONE,
            displacement_offset: 0.0,
            displacement_scale: 1.0,
            displacement_min: 0.0,
            displacement_max: 1.0,
        }
    }
}

/// Everything a mesh needs to render a tile.
///
/// Textures live in the result owner passed to the request and belong to the
/// consumer once handed over.
#[derive(Clone, Debug, PartialEq)]
pub struct TileData {
    /// Area the tile was baked for.
    pub area: AreaKey,
    /// Color texture, `tile_texture_size` texels per side.
    pub albedo: TextureHandle,
    /// Normal map, same size as the albedo.
    pub normal: TextureHandle,
    /// Single-channel heights, one texel per mesh vertex.
    pub displacement: TextureHandle,
    /// Smallest displacement sample read back from the GPU.
    pub displacement_min: f32,
    /// Largest displacement sample read back from the GPU.
    pub displacement_max: f32,
    /// Offset applied to the mesh UVs before sampling the textures.
    pub texcoord_offset: Vec2,
    /// Scale applied to the mesh UVs before sampling the textures.
    pub texcoord_scale: Vec2,
    /// Added to each displacement sample.
    pub displacement_offset: f32,
    /// Multiplies each displacement sample before the offset is added.
    pub displacement_scale: f32,
}

impl TileData {
    pub fn textures(&self) -> [TextureHandle; 3] {
        [self.albedo, self.normal, self.displacement]
    }
}

/// Arguments shared by every step of a baking request.
#[derive(Clone, Debug)]
pub struct TileBakingArgs {
    pub area: AreaKey,
    pub curvature: Curvature,
    /// Owner of the result textures; supplied by the consumer.
    pub result_owner: OwnerId,
    /// Private owner for intermediate resources, disposed at retirement.
    pub scratch_owner: OwnerId,
    attached: HashMap<String, TextureHandle>,
}

impl TileBakingArgs {
    pub(crate) fn new(
        area: AreaKey,
        curvature: Curvature,
        result_owner: OwnerId,
        scratch_owner: OwnerId,
    ) -> Self {
        Self {
            area,
            curvature,
            result_owner,
            scratch_owner,
            attached: HashMap::new(),
        }
    }

    /// A texture attached by the provider during initialization.
    pub fn attached_texture(&self, name: &str) -> Option<TextureHandle> {
        self.attached.get(name).copied()
    }

    pub(crate) fn attach_texture(&mut self, name: &str, texture: TextureHandle) {
        self.attached.insert(name.to_string(), texture);
    }
}
