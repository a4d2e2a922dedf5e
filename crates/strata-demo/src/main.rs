//! Headless terrain demo: a viewer flies low over fractal terrain while a
//! quadtree consumer refines and coarsens tiles as the LOD strategy asks.
//!
//! Configuration is loaded from `config.ron` and can be overridden via CLI flags.
//! Run with `cargo run -p strata-demo`.
//! Run with `cargo run -p strata-demo -- --frames 300 --tessellation 32` to override.

mod quadtree;

use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use glam::{DVec3, Vec2, Vec3};
use strata_bake::{CpuBakeDevice, CpuBakeSettings};
use strata_config::{CliArgs, Config, DemoConfig, default_config_dir};
use strata_lod::{DistanceLod, TerrainId};
use strata_math::TiledFloat3;
use strata_terrain::{AreaKey, Curvature, FractalDataSource, TerrainDataSource, TileDataError};
use tracing::{error, info};

use crate::quadtree::TerrainQuadtree;

const TERRAIN: TerrainId = TerrainId(0);

/// Frames between progress reports.
const REPORT_INTERVAL: u64 = 60;

/// Viewer position after `seconds` of flight.
///
/// The viewer crosses the terrain along +X at constant altitude, starting a
/// tenth of the way in.
fn viewer_position(demo: &DemoConfig, seconds: f64) -> DVec3 {
    let size = f64::from(demo.terrain_size_m);
    let x = -size * 0.4 + seconds * f64::from(demo.viewer_speed_m_s);
    DVec3::new(x.min(size * 0.5), f64::from(demo.viewer_altitude_m), 0.0)
}

/// Square terrain centered on the origin, lying in the XZ plane.
fn terrain_root(demo: &DemoConfig) -> AreaKey {
    let half = f64::from(demo.terrain_size_m) * 0.5;
    AreaKey::new(
        TiledFloat3::from_dvec3(DVec3::new(-half, 0.0, -half)),
        Vec3::X,
        Vec3::Z,
        Vec2::splat(demo.terrain_size_m),
    )
}

fn run(config: &Config) -> Result<(), TileDataError> {
    let workers = num_cpus::get().max(2);
    let device = CpuBakeDevice::new(CpuBakeSettings {
        worker_threads: workers,
        ..CpuBakeSettings::default()
    });
    let mut source = FractalDataSource::new(device, &config.tile_data, &config.fractal);
    let mut lod = DistanceLod::from_config(&config.lod);
    let demo = &config.demo;

    info!(
        workers,
        frames = demo.frames,
        terrain_size_m = demo.terrain_size_m,
        tessellation = source.tile_tessellation(),
        texture_size = source.gpu().settings().tile_texture_size,
        "Starting terrain flight demonstration"
    );

    let mut terrain = TerrainQuadtree::new(
        TERRAIN,
        terrain_root(demo),
        Curvature::Flat,
        demo.max_depth,
        &mut source,
    )?;

    let started = Instant::now();
    for frame in 0..demo.frames {
        let seconds = frame as f64 * f64::from(demo.frame_seconds);
        let viewer = viewer_position(demo, seconds);
        lod.set_viewer_position(TiledFloat3::from_dvec3(viewer));

        source.update(frame);
        terrain.update(seconds, &mut source, &mut lod)?;

        if frame % REPORT_INTERVAL == 0 {
            let stats = terrain.stats();
            info!(
                frame,
                terrain = %terrain.id(),
                viewer_x = viewer.x,
                leaves = stats.leaves,
                max_depth = stats.max_leaf_depth,
                in_flight = source.gpu().in_flight_count(),
                processing = terrain.is_processing_new_lod(),
                height_m = source.provider().height_at(viewer),
                "flight progress"
            );
        }
    }

    let stats = terrain.stats();
    let pool = source.gpu().pool_stats();
    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        lod_available = terrain.is_any_lod_available(),
        nodes = stats.nodes,
        leaves = stats.leaves,
        max_depth = stats.max_leaf_depth,
        tiles_received = stats.tiles_received,
        tiles_failed = stats.tiles_failed,
        lod_switches = stats.lod_switches,
        noise_caches = source.provider().cache_count(),
        bakers_created = pool.created,
        "Terrain flight demonstration completed successfully"
    );

    terrain.dispose(&mut source);
    info!(
        live_textures = source.device().live_texture_count(),
        live_owners = source.device().live_owner_count(),
        "terrain released"
    );
    Ok(())
}

fn main() {
    let args = CliArgs::parse();

    // Resolve config directory
    let config_dir = args
        .config
        .clone()
        .or_else(default_config_dir)
        .unwrap_or_else(|| PathBuf::from("."));

    // Load or create config, then apply CLI overrides
    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    // Initialize logging with config and debug settings
    let log_dir = config_dir.join("logs");
    strata_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    if let Err(e) = run(&config) {
        error!(error = %e, "terrain demo failed");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viewer_flies_along_x_and_stops_at_edge() {
        let demo = DemoConfig::default();
        let start = viewer_position(&demo, 0.0);
        assert_eq!(start.y, f64::from(demo.viewer_altitude_m));
        assert!(viewer_position(&demo, 1.0).x > start.x);
        let end = viewer_position(&demo, 1.0e6);
        assert_eq!(end.x, f64::from(demo.terrain_size_m) * 0.5);
    }

    #[test]
    fn test_root_is_centered() {
        let demo = DemoConfig::default();
        let root = terrain_root(&demo);
        assert!(root.center().to_dvec3().length() < 1e-6);
        assert_eq!(root.size(), Vec2::splat(demo.terrain_size_m));
    }

    /// A short flight over small tiles refines the terrain and releases
    /// everything on dispose.
    #[test]
    fn test_short_flight() {
        let mut config = Config::default();
        config.tile_data.tile_texture_size = 8;
        config.tile_data.tile_tessellation = 4;
        config.tile_data.min_lod_switch_time_seconds = 0.0;
        config.demo.frames = 120;
        config.demo.max_depth = 3;
        config.demo.terrain_size_m = 2048.0;
        config.fractal.noise_cache_tile_size = 1024.0;
        assert!(run(&config).is_ok());
    }
}
