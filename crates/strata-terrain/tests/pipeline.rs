//! End-to-end tile production: LOD decisions drive tile requests against the
//! software bake device.

use glam::{DVec3, Vec2, Vec3, Vec4};
use strata_bake::{BakeDevice, CpuBakeDevice, CpuBakeSettings, OwnerId};
use strata_config::{FractalConfig, LodConfig, TileDataConfig};
use strata_lod::{DistanceLod, LodStrategy, TerrainId};
use strata_math::TiledFloat3;
use strata_terrain::{
    AreaKey, Curvature, FlatDataSource, FlatProvider, FractalDataSource, TerrainDataSource,
    TileData,
};

const TERRAIN: TerrainId = TerrainId(1);

fn small_tiles() -> TileDataConfig {
    TileDataConfig {
        tile_texture_size: 8,
        tile_tessellation: 4,
        max_baking_thread_count: 4,
        max_bake_process_per_frame: 2,
        ..TileDataConfig::default()
    }
}

fn root(size: f32) -> AreaKey {
    AreaKey::new(TiledFloat3::ZERO, Vec3::X, Vec3::Z, Vec2::splat(size))
}

/// Vertices per square meter a tile provides at the source tessellation.
fn tile_density(area: &AreaKey, tessellation: u32) -> f32 {
    let vertices = ((tessellation + 1) * (tessellation + 1)) as f32;
    vertices / (area.size().x * area.size().y)
}

fn needs_split(lod: &DistanceLod, data: &TileData, tessellation: u32) -> bool {
    let bounds = data
        .area
        .bounds(data.displacement_min, data.displacement_max);
    let required = lod.required_density(
        &bounds,
        data.area.normal(),
        data.displacement_min,
        data.displacement_max,
    );
    required > tile_density(&data.area, tessellation)
}

/// Poll every wanted area each frame until all are ready.
fn bake_all(
    source: &mut dyn TerrainDataSource,
    areas: &[AreaKey],
    owner: OwnerId,
    frame: &mut u64,
) -> Vec<TileData> {
    let mut ready: Vec<Option<TileData>> = vec![None; areas.len()];
    for _ in 0..64 {
        source.update(*frame);
        for (area, slot) in areas.iter().zip(ready.iter_mut()) {
            if slot.is_none() {
                *slot = source.try_get_tile_data(area, Curvature::Flat, owner).unwrap();
            }
        }
        *frame += 1;
        if ready.iter().all(Option::is_some) {
            return ready.into_iter().flatten().collect();
        }
    }
    panic!("tiles never became ready");
}

/// A viewer standing on the root tile forces a split; the children bake with
/// keys identical to a second subdivision of the same root.
#[test]
fn test_flat_quadtree_split() {
    let mut source =
        FlatDataSource::new(CpuBakeDevice::default(), &small_tiles(), FlatProvider::default());
    let owner = source.device_mut().create_owner(None).unwrap();
    let mut lod = DistanceLod::from_config(&LodConfig::default());
    lod.set_viewer_position(TiledFloat3::from_dvec3(DVec3::new(10.0, 2.0, 10.0)));
    let tess = source.tile_tessellation();
    let mut frame = 0;

    assert!(lod.needs_update(TERRAIN));
    let root = root(256.0);
    let root_data = bake_all(&mut source, &[root], owner, &mut frame).remove(0);
    assert!(needs_split(&lod, &root_data, tess));

    let children = root.subdivide();
    let child_data = bake_all(&mut source, &children, owner, &mut frame);
    for (data, expected) in child_data.iter().zip(root.subdivide()) {
        assert_eq!(data.area, expected);
        assert_eq!(data.displacement_min, 0.0);
    }
    lod.signal_update_completion(TERRAIN);
    assert!(!lod.needs_update(TERRAIN));

    // The child far from the viewer needs less detail than the one under it.
    let near = &child_data[0];
    let far = &child_data[3];
    let density = |d: &TileData| {
        lod.required_density(&d.area.bounds(0.0, 0.0), d.area.normal(), 0.0, 0.0)
    };
    assert!(density(near) >= density(far));

    for data in &child_data {
        source.delete_tile_data(&data.area);
    }
    assert!(!source.is_loading());
    source.device_mut().dispose_owner(owner).unwrap();
    assert_eq!(source.device().live_texture_count(), 0);
    assert_eq!(source.device().live_owner_count(), 0);
}

/// Per-frame admission never starts more than the configured number of tiles.
#[test]
fn test_per_frame_admission() {
    let mut source =
        FlatDataSource::new(CpuBakeDevice::default(), &small_tiles(), FlatProvider::default());
    let owner = source.device_mut().create_owner(None).unwrap();
    let grandchildren: Vec<AreaKey> = root(256.0)
        .subdivide()
        .iter()
        .flat_map(|c| c.subdivide())
        .collect();

    source.update(0);
    for area in &grandchildren {
        assert!(source
            .try_get_tile_data(area, Curvature::Flat, owner)
            .unwrap()
            .is_none());
    }
    assert_eq!(source.gpu().in_flight_count(), 2);

    source.update(1);
    for area in &grandchildren {
        let _ = source.try_get_tile_data(area, Curvature::Flat, owner);
    }
    assert_eq!(source.gpu().in_flight_count(), 4);
}

/// Fractal children wait for their parent's noise cache, then bake heights
/// consistent with direct evaluation at the corners.
#[test]
fn test_fractal_cache_gates_children() {
    let fractal = FractalConfig {
        seed: 3,
        octaves: 5,
        base_frequency: 1.0 / 256.0,
        amplitude: 40.0,
        noise_cache_tile_size: 128.0,
        ..FractalConfig::default()
    };
    let device = CpuBakeDevice::new(CpuBakeSettings {
        worker_threads: 2,
        ..CpuBakeSettings::default()
    });
    let mut source = FractalDataSource::new(device, &small_tiles(), &fractal);
    let owner = source.device_mut().create_owner(None).unwrap();
    let mut frame = 0;

    let cache_tile = root(128.0);
    let child = cache_tile.subdivide()[1];
    source.update(frame);
    for area in [&cache_tile, &child] {
        assert!(source
            .try_get_tile_data(area, Curvature::Flat, owner)
            .unwrap()
            .is_none());
    }
    assert_eq!(source.gpu().in_flight_count(), 1);
    assert_eq!(source.provider().cache_tile_size(), Some(128.0));

    let parent = bake_all(&mut source, &[cache_tile], owner, &mut frame).remove(0);
    assert_eq!(source.provider().cache_count(), 1);
    assert!(parent.displacement_min < parent.displacement_max);

    let child_data = bake_all(&mut source, &[child], owner, &mut frame).remove(0);
    let displacement = source.device().texture(child_data.displacement).unwrap();
    let last = displacement.resolution - 1;
    for (x, y, uv) in [(0, 0, Vec2::ZERO), (last, last, Vec2::ONE)] {
        let baked = displacement.texel(x, y).x;
        let direct = source
            .provider()
            .height_at(child.position_at(uv).to_dvec3()) as f32;
        assert!((baked - direct).abs() < 0.5, "{baked} vs {direct}");
    }
    let albedo = source.device().texture(child_data.albedo).unwrap();
    assert!(albedo.texels.iter().all(|t| t.w == 1.0 && t.x > 0.0));
    assert_ne!(albedo.texel(0, 0), Vec4::ZERO);

    source.delete_tile_data(&cache_tile);
    assert_eq!(source.provider().cache_count(), 0);
}
