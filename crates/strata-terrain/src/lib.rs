//! Asynchronous terrain tile data: request-deduplicating bake orchestration,
//! the data source interface consumers poll, and flat and fractal providers.

mod error;
mod flat;
mod fractal;
mod gpu_source;
mod heightmap;
mod provider;
mod source;
mod steps;
mod tile;

pub use error::TileDataError;
pub use flat::{FLAT_DISPLACEMENT_MATERIAL, FLAT_TEXTURES_MATERIAL, FlatProvider};
pub use fractal::{
    ALBEDO_NOISE_MATERIAL, ALBEDO_NOISE_STEP, ALBEDO_NOISE_TEXTURE, BASE_NOISE_MATERIAL,
    BASE_NOISE_STEP, FRACTAL_DISPLACEMENT_MATERIAL, FRACTAL_TEXTURES_MATERIAL, FractalProvider,
};
pub use gpu_source::{
    DISPLACEMENT_FORMATS, DISPLACEMENT_STEP, GpuDataSource, GpuDataSourceSettings, TEXTURES_STEP,
    TILE_TEXTURE_FORMATS,
};
pub use heightmap::{HeightmapParams, HeightmapSampler};
pub use provider::{TileDataProvider, TileInit};
pub use source::{FlatDataSource, FractalDataSource, TerrainDataSource, TileDataSource};
pub use steps::BakingSteps;
pub use tile::{AreaKey, Curvature, TileBakingArgs, TileData, TileLayout};
