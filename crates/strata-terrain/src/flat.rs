//! Single-color terrain with no relief.

use glam::{Vec2, Vec3, Vec4};
use strata_bake::{BakeMaterial, TexelInputs};

use crate::provider::TileInit;
use crate::{TileBakingArgs, TileDataProvider, TileLayout};

/// World-space unit normal mapped to `0..1` per channel.
pub(crate) fn encode_normal(normal: Vec3) -> Vec4 {
    (normal * 0.5 + Vec3::splat(0.5)).extend(1.0)
}

pub const FLAT_TEXTURES_MATERIAL: &str = "flat_textures";
pub const FLAT_DISPLACEMENT_MATERIAL: &str = "flat_displacement";

/// Bakes a constant albedo, an up-facing normal and zero displacement.
#[derive(Clone, Debug, PartialEq)]
pub struct FlatProvider {
    pub color: Vec4,
}

impl Default for FlatProvider {
    fn default() -> Self {
        Self {
            color: Vec4::new(0.35, 0.45, 0.25, 1.0),
        }
    }
}

impl FlatProvider {
    pub fn new(color: Vec4) -> Self {
        Self { color }
    }
}

impl TileDataProvider for FlatProvider {
    fn initialize_tile_data(&mut self, init: &mut TileInit<'_>) {
        init.complete(TileLayout::default());
    }

    fn create_texture_baking_material(&mut self, args: &TileBakingArgs) -> BakeMaterial {
        let color = self.color;
        let area = args.area;
        let curvature = args.curvature;
        BakeMaterial::from_fn(
            FLAT_TEXTURES_MATERIAL,
            move |uv: Vec2, _: &TexelInputs, out: &mut [Vec4]| {
                let normal = curvature.surface_normal(&area, uv).as_vec3();
                out[0] = encode_normal(normal);
                out[1] = color;
            },
        )
    }

    fn create_displacement_baking_material(&mut self, _args: &TileBakingArgs) -> BakeMaterial {
        BakeMaterial::from_fn(
            FLAT_DISPLACEMENT_MATERIAL,
            |_uv: Vec2, _: &TexelInputs, out: &mut [Vec4]| {
                out[0] = Vec4::ZERO;
            },
        )
    }
}
