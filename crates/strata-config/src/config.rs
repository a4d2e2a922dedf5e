//! Configuration structs with sensible defaults and RON persistence.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Tile-data baking pipeline settings.
    pub tile_data: TileDataConfig,
    /// Distance LOD strategy settings.
    pub lod: LodConfig,
    /// Procedural (fractal) data source settings.
    pub fractal: FractalConfig,
    /// Headless demo settings.
    pub demo: DemoConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Tile-data baking pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TileDataConfig {
    /// Resolution (per side) of the color and normal textures baked per tile.
    pub tile_texture_size: u32,
    /// Quads per tile side. Rounded up to a power of two by the data source.
    pub tile_tessellation: u32,
    /// Maximum number of baking requests in flight at once.
    pub max_baking_thread_count: usize,
    /// Maximum number of baking requests started within a single frame.
    pub max_bake_process_per_frame: usize,
    /// Minimum time a LOD level stays on screen before switching.
    pub min_lod_switch_time_seconds: f32,
}

/// Distance LOD strategy configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LodConfig {
    /// Viewer travel distance after which the LOD is re-evaluated.
    pub update_distance_meters: f32,
    /// Vertices per square meter required for a surface one meter away.
    pub one_meter_vertex_density: f32,
    /// Upper bound on vertices per square meter.
    pub max_vertex_density: f32,
    /// Maximum subdivisions or merges applied per LOD update.
    pub max_divisions_per_update: u32,
    /// Density boost per meter of height range within a tile.
    pub height_density_multiplier: f32,
    /// Upper bound on the height density boost.
    pub max_height_density_multiplier: f32,
}

/// Fractal data source configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FractalConfig {
    /// Noise seed.
    pub seed: u32,
    /// Number of fBm octaves.
    pub octaves: u32,
    /// Frequency multiplier between octaves.
    pub lacunarity: f64,
    /// Amplitude multiplier between octaves.
    pub persistence: f64,
    /// Frequency of the first octave, in cycles per meter.
    pub base_frequency: f64,
    /// Amplitude of the first octave, in meters.
    pub amplitude: f64,
    /// Side length of the tiles that bake and own the base noise cache.
    pub noise_cache_tile_size: f32,
}

/// Headless demo configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DemoConfig {
    /// Number of frames to simulate.
    pub frames: u64,
    /// Simulated frame duration in seconds.
    pub frame_seconds: f32,
    /// Viewer speed in meters per second.
    pub viewer_speed_m_s: f32,
    /// Viewer altitude above the terrain plane in meters.
    pub viewer_altitude_m: f32,
    /// Side length of the terrain root tile in meters.
    pub terrain_size_m: f32,
    /// Maximum quadtree depth below the root tile.
    pub max_depth: u32,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
}

// --- Default implementations ---

impl Default for TileDataConfig {
    fn default() -> Self {
        Self {
            tile_texture_size: 512,
            tile_tessellation: 16,
            max_baking_thread_count: 20,
            max_bake_process_per_frame: 2,
            min_lod_switch_time_seconds: 1.0,
        }
    }
}

impl Default for LodConfig {
    fn default() -> Self {
        Self {
            update_distance_meters: 10.0,
            one_meter_vertex_density: 512.0,
            max_vertex_density: 64.0,
            max_divisions_per_update: 5,
            height_density_multiplier: 0.005,
            max_height_density_multiplier: 8.0,
        }
    }
}

impl Default for FractalConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            octaves: 8,
            lacunarity: 2.0,
            persistence: 0.5,
            base_frequency: 1.0 / 4096.0,
            amplitude: 600.0,
            noise_cache_tile_size: 2048.0,
        }
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            frames: 600,
            frame_seconds: 1.0 / 60.0,
            viewer_speed_m_s: 120.0,
            viewer_altitude_m: 30.0,
            terrain_size_m: 8192.0,
            max_depth: 7,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("config.ron");

        if config_path.exists() {
            let config = read_config(&config_path)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(|source| ConfigError::Write {
            path: config_dir.to_path_buf(),
            source,
        })?;

        let config_path = config_dir.join("config.ron");
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::Serialize)?;

        std::fs::write(&config_path, serialized)
            .map_err(|source| ConfigError::Write { path: config_path, source })?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join("config.ron");
        let new_config = read_config(&config_path)?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}

fn read_config(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    ron::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Default configuration directory (`<platform config dir>/strata`).
///
/// Returns `None` when the platform has no notion of a config directory.
pub fn default_config_dir() -> Option<std::path::PathBuf> {
    dirs::config_dir().map(|dir| dir.join("strata"))
}
