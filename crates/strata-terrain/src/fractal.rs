//! Procedural terrain from fBm noise, baked in stages.
//!
//! Every tile first bakes a small albedo-noise texture used to break up the
//! height-based color ramp. Tiles of the noise cache size additionally bake
//! the coarse octaves of the height field into a cache texture owned by the
//! provider. Smaller tiles inside a cached region sample the coarse octaves
//! from that cache and only evaluate the fine octaves themselves, so they
//! cannot be requested before the covering cache exists.

use std::sync::Arc;

use glam::{DVec3, Vec2, Vec3, Vec4};
use strata_bake::{
    BakeDevice, BakeMaterial, OwnerId, RenderTargetId, SurfaceFormat, TexelInputs, TextureHandle,
};
use strata_config::FractalConfig;

use crate::flat::encode_normal;
use crate::provider::TileInit;
use crate::{
    AreaKey, Curvature, HeightmapParams, HeightmapSampler, TileBakingArgs, TileDataError,
    TileDataProvider, TileLayout,
};

pub const ALBEDO_NOISE_STEP: &str = "TerrainAlbedoNoise";
pub const BASE_NOISE_STEP: &str = "TerrainBaseNoise";
pub const FRACTAL_TEXTURES_MATERIAL: &str = "fractal_textures";
pub const FRACTAL_DISPLACEMENT_MATERIAL: &str = "fractal_displacement";
pub const ALBEDO_NOISE_MATERIAL: &str = "fractal_albedo_noise";
pub const BASE_NOISE_MATERIAL: &str = "fractal_base_noise";

/// Name under which the albedo-noise texture is attached to a request.
pub const ALBEDO_NOISE_TEXTURE: &str = "albedo_noise";

const ALBEDO_NOISE_FREQUENCY: f64 = 1.0 / 16.0;
const SIZE_TOLERANCE: f32 = 1e-4;

const LOWLAND: Vec3 = Vec3::new(0.18, 0.32, 0.12);
const ROCK: Vec3 = Vec3::new(0.42, 0.36, 0.28);
const SNOW: Vec3 = Vec3::new(0.94, 0.94, 0.97);

fn tile_extent(area: &AreaKey) -> f32 {
    area.size().max_element()
}

/// Height-based color ramp over `t` in `[0, 1]`.
fn albedo_ramp(t: f32) -> Vec3 {
    let t = t.clamp(0.0, 1.0);
    if t < 0.6 {
        LOWLAND.lerp(ROCK, t / 0.6)
    } else {
        ROCK.lerp(SNOW, (t - 0.6) / 0.4)
    }
}

struct NoiseCache {
    area: AreaKey,
    texture: TextureHandle,
}

/// [`TileDataProvider`] generating fBm terrain.
pub struct FractalProvider {
    sampler: Arc<HeightmapSampler>,
    texture_size: u32,
    displacement_size: u32,
    cache_size_limit: f32,
    cache_tile_size: Option<f32>,
    base_octaves: u32,
    cache_owner: Option<OwnerId>,
    caches: Vec<NoiseCache>,
}

impl FractalProvider {
    pub fn new(config: &FractalConfig, texture_size: u32, displacement_size: u32) -> Self {
        Self {
            sampler: Arc::new(HeightmapSampler::new(HeightmapParams::from(config))),
            texture_size: texture_size.max(2),
            displacement_size: displacement_size.max(2),
            cache_size_limit: config.noise_cache_tile_size.max(f32::MIN_POSITIVE),
            cache_tile_size: None,
            base_octaves: 0,
            cache_owner: None,
            caches: Vec::new(),
        }
    }

    pub fn sampler(&self) -> &HeightmapSampler {
        &self.sampler
    }

    /// Side length of the tiles that bake the noise cache, fixed by the first
    /// area this provider is asked about.
    pub fn cache_tile_size(&self) -> Option<f32> {
        self.cache_tile_size
    }

    /// Octaves read from the cache instead of evaluated per tile.
    pub fn base_octaves(&self) -> u32 {
        self.base_octaves
    }

    pub fn cache_count(&self) -> usize {
        self.caches.len()
    }

    /// Height at a world point, evaluated directly.
    pub fn height_at(&self, point: DVec3) -> f64 {
        self.sampler.sample_3d(point)
    }

    fn ensure_cache_tile_size(&mut self, area: &AreaKey) {
        if self.cache_tile_size.is_some() {
            return;
        }
        let mut size = tile_extent(area);
        while size.is_finite() && size > self.cache_size_limit * (1.0 + SIZE_TOLERANCE) {
            size *= 0.5;
        }
        let spacing = f64::from(size) / f64::from(self.displacement_size - 1);
        self.base_octaves = self.sampler.resolvable_octaves(spacing);
        self.cache_tile_size = Some(size);
        tracing::debug!(size, base_octaves = self.base_octaves, "noise cache tile size fixed");
    }

    fn is_cache_tile(&self, area: &AreaKey) -> bool {
        self.cache_tile_size
            .is_some_and(|size| (tile_extent(area) - size).abs() <= size * SIZE_TOLERANCE)
    }

    fn is_below_cache_size(&self, area: &AreaKey) -> bool {
        self.cache_tile_size
            .is_some_and(|size| tile_extent(area) < size * (1.0 - SIZE_TOLERANCE))
    }

    /// The cache whose rectangle covers the center of `area`.
    fn find_cache(&self, area: &AreaKey) -> Option<&NoiseCache> {
        self.caches.iter().find(|cache| {
            if cache.area.x_dir() != area.x_dir()
                || cache.area.y_dir() != area.y_dir()
                || !cache.area.is_coplanar_with(area)
            {
                return false;
            }
            cache.area.contains_projection(&area.center())
        })
    }

    fn cache_owner(&mut self, device: &mut dyn BakeDevice) -> Result<OwnerId, TileDataError> {
        if let Some(owner) = self.cache_owner {
            return Ok(owner);
        }
        let owner = device.create_owner(None)?;
        self.cache_owner = Some(owner);
        Ok(owner)
    }

    fn layout(&self) -> TileLayout {
        let amplitude = self.sampler.max_amplitude() as f32;
        TileLayout {
            displacement_min: -amplitude,
            displacement_max: amplitude,
            ..TileLayout::default()
        }
    }

    fn albedo_noise_material(&self, area: AreaKey, curvature: Curvature) -> BakeMaterial {
        let sampler = Arc::clone(&self.sampler);
        BakeMaterial::from_fn(
            ALBEDO_NOISE_MATERIAL,
            move |uv: Vec2, _: &TexelInputs, out: &mut [Vec4]| {
                let p = curvature.surface_point(&area, uv);
                let v = (sampler.raw(p, ALBEDO_NOISE_FREQUENCY) * 0.5 + 0.5) as f32;
                out[0] = Vec4::new(v, v, v, 1.0);
            },
        )
    }

    fn base_noise_material(&self, area: AreaKey, curvature: Curvature) -> BakeMaterial {
        let sampler = Arc::clone(&self.sampler);
        let octaves = 0..self.base_octaves;
        BakeMaterial::from_fn(
            BASE_NOISE_MATERIAL,
            move |uv: Vec2, _: &TexelInputs, out: &mut [Vec4]| {
                let p = curvature.surface_point(&area, uv);
                out[0] = Vec4::splat(sampler.sample_octaves(p, octaves.clone()) as f32);
            },
        )
    }
}

impl TileDataProvider for FractalProvider {
    fn initialize_tile_data(&mut self, init: &mut TileInit<'_>) {
        let area = *init.area();
        let curvature = init.args().curvature;
        let (texture_size, displacement_size) = (init.texture_size(), init.displacement_size());
        self.ensure_cache_tile_size(&area);

        if self.is_cache_tile(&area) && self.find_cache(&area).is_none() {
            let material = self.base_noise_material(area, curvature);
            init.add_baker(
                BASE_NOISE_STEP,
                displacement_size,
                &[SurfaceFormat::R32Float],
                material,
            );
        }

        let material = self.albedo_noise_material(area, curvature);
        init.add_baker(ALBEDO_NOISE_STEP, texture_size, &[SurfaceFormat::Rgba8], material);
    }

    fn on_custom_step_completed(
        &mut self,
        step: &str,
        target: RenderTargetId,
        device: &mut dyn BakeDevice,
        init: &mut TileInit<'_>,
    ) -> Result<(), TileDataError> {
        let area = *init.area();
        match step {
            ALBEDO_NOISE_STEP => {
                let texture = device.copy_to_texture(target, 0, init.args().scratch_owner)?;
                init.attach_texture(ALBEDO_NOISE_TEXTURE, texture);
            }
            BASE_NOISE_STEP => {
                let owner = self.cache_owner(device)?;
                let texture = device.copy_to_texture(target, 0, owner)?;
                if let Some(stale) = self.caches.iter().position(|c| c.area == area) {
                    let stale = self.caches.swap_remove(stale);
                    device.dispose_texture(stale.texture)?;
                }
                self.caches.push(NoiseCache { area, texture });
                tracing::debug!(%area, %texture, "noise cache baked");
            }
            _ => {}
        }

        if init.pending_custom_steps() == 0 && !init.is_completed() {
            init.complete(self.layout());
        }
        Ok(())
    }

    fn create_texture_baking_material(&mut self, args: &TileBakingArgs) -> BakeMaterial {
        let sampler = Arc::clone(&self.sampler);
        let area = args.area;
        let curvature = args.curvature;
        let x_dir = area.x_dir().as_dvec3();
        let y_dir = area.y_dir().as_dvec3();
        let step = f64::from(tile_extent(&area)) / f64::from(self.texture_size - 1);
        let max_amplitude = sampler.max_amplitude().max(f64::MIN_POSITIVE);
        let noise = args.attached_texture(ALBEDO_NOISE_TEXTURE);

        let material = BakeMaterial::from_fn(
            FRACTAL_TEXTURES_MATERIAL,
            move |uv: Vec2, inputs: &TexelInputs, out: &mut [Vec4]| {
                let p = curvature.surface_point(&area, uv);
                let up = curvature.surface_normal(&area, uv);
                let h = sampler.sample_3d(p);
                let hx = sampler.sample_3d(p + x_dir * step);
                let hy = sampler.sample_3d(p + y_dir * step);
                let tx = x_dir * step + up * (hx - h);
                let ty = y_dir * step + up * (hy - h);
                let normal = ty.cross(tx).normalize_or(up).as_vec3();
                out[0] = encode_normal(normal);

                let t = (h / max_amplitude * 0.5 + 0.5) as f32;
                let variation = if inputs.is_empty() {
                    1.0
                } else {
                    0.85 + 0.3 * inputs.sample(0, uv).x
                };
                out[1] = (albedo_ramp(t) * variation).extend(1.0);
            },
        );
        match noise {
            Some(texture) => material.with_input(texture),
            None => material,
        }
    }

    fn create_displacement_baking_material(&mut self, args: &TileBakingArgs) -> BakeMaterial {
        let sampler = Arc::clone(&self.sampler);
        let area = args.area;
        let curvature = args.curvature;

        let cache = self
            .is_below_cache_size(&area)
            .then(|| self.find_cache(&area))
            .flatten();
        let Some(cache) = cache else {
            return BakeMaterial::from_fn(
                FRACTAL_DISPLACEMENT_MATERIAL,
                move |uv: Vec2, _: &TexelInputs, out: &mut [Vec4]| {
                    let p = curvature.surface_point(&area, uv);
                    out[0] = Vec4::splat(sampler.sample_3d(p) as f32);
                },
            );
        };

        let offset = cache.area.coords_at(&area.position());
        let region = cache.area.coords_at(&area.end_corner()) - offset;
        let (offset, region) = (offset.as_vec2(), region.as_vec2());
        let detail = self.base_octaves..sampler.params().octaves;
        BakeMaterial::from_fn(
            FRACTAL_DISPLACEMENT_MATERIAL,
            move |uv: Vec2, inputs: &TexelInputs, out: &mut [Vec4]| {
                let base = inputs.sample(0, offset + uv * region).x;
                let p = curvature.surface_point(&area, uv);
                let h = f64::from(base) + sampler.sample_octaves(p, detail.clone());
                out[0] = Vec4::splat(h as f32);
            },
        )
        .with_input(cache.texture)
    }

    fn on_tile_data_delete(&mut self, area: &AreaKey, device: &mut dyn BakeDevice) {
        let Some(index) = self.caches.iter().position(|c| c.area == *area) else {
            return;
        };
        let cache = self.caches.swap_remove(index);
        if let Err(e) = device.dispose_texture(cache.texture) {
            tracing::warn!(%area, error = %e, "failed to dispose noise cache");
        }
    }

    /// Tiles smaller than the cache size wait for their covering cache.
    fn can_render_area(&mut self, area: &AreaKey) -> bool {
        self.ensure_cache_tile_size(area);
        !self.is_below_cache_size(area) || self.find_cache(area).is_some()
    }
}
