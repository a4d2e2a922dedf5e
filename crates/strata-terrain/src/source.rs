//! The interface a terrain consumer polls, and its implementations.

use strata_bake::{BakeDevice, FrameIndex, OwnerId};
use strata_config::{FractalConfig, TileDataConfig};

use crate::{
    AreaKey, Curvature, FlatProvider, FractalProvider, GpuDataSource, GpuDataSourceSettings,
    TileData, TileDataError, TileDataProvider,
};

/// Source of baked tile data for a terrain consumer.
///
/// The consumer calls [`update`](Self::update) once per frame and polls
/// [`try_get_tile_data`](Self::try_get_tile_data) for every tile it wants to
/// show until data is returned.
pub trait TerrainDataSource {
    /// `Ok(None)` while the tile is not ready yet.
    fn try_get_tile_data(
        &mut self,
        area: &AreaKey,
        curvature: Curvature,
        result_owner: OwnerId,
    ) -> Result<Option<TileData>, TileDataError>;

    /// Advance in-flight work to `frame`.
    fn update(&mut self, frame: FrameIndex);

    /// True while any tile is being produced.
    fn is_loading(&self) -> bool;

    /// Quads per tile side, a power of two fixed for the lifetime of the source.
    fn tile_tessellation(&self) -> u32;

    /// Minimum time a tile keeps its level of detail before switching again.
    fn min_lod_switch_time_seconds(&self) -> f32;

    /// The consumer dropped the data of `area`.
    fn delete_tile_data(&mut self, area: &AreaKey);

    /// The device textures are baked on. Consumers create their result owners
    /// and dispose received textures through it.
    fn device_mut(&mut self) -> &mut dyn BakeDevice;
}

/// A [`GpuDataSource`] bound to the provider deciding what it bakes.
pub struct TileDataSource<D, P> {
    gpu: GpuDataSource<D>,
    provider: P,
}

/// Single-color terrain.
pub type FlatDataSource<D> = TileDataSource<D, FlatProvider>;
/// Procedural fBm terrain.
pub type FractalDataSource<D> = TileDataSource<D, FractalProvider>;

impl<D: BakeDevice, P: TileDataProvider> TileDataSource<D, P> {
    pub fn with_provider(device: D, settings: GpuDataSourceSettings, provider: P) -> Self {
        Self {
            gpu: GpuDataSource::new(device, settings),
            provider,
        }
    }

    pub fn gpu(&self) -> &GpuDataSource<D> {
        &self.gpu
    }

    pub fn gpu_mut(&mut self) -> &mut GpuDataSource<D> {
        &mut self.gpu
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    pub fn device(&self) -> &D {
        self.gpu.device()
    }
}

impl<D: BakeDevice> FlatDataSource<D> {
    pub fn new(device: D, config: &TileDataConfig, provider: FlatProvider) -> Self {
        Self::with_provider(device, GpuDataSourceSettings::from(config), provider)
    }
}

impl<D: BakeDevice> FractalDataSource<D> {
    pub fn new(device: D, config: &TileDataConfig, fractal: &FractalConfig) -> Self {
        let settings = GpuDataSourceSettings::from(config);
        let provider = FractalProvider::new(
            fractal,
            settings.tile_texture_size,
            settings.tile_displacement_size(),
        );
        Self::with_provider(device, settings, provider)
    }
}

impl<D: BakeDevice, P: TileDataProvider> TerrainDataSource for TileDataSource<D, P> {
    fn try_get_tile_data(
        &mut self,
        area: &AreaKey,
        curvature: Curvature,
        result_owner: OwnerId,
    ) -> Result<Option<TileData>, TileDataError> {
        self.gpu
            .try_get_tile_data(area, curvature, result_owner, &mut self.provider)
    }

    fn update(&mut self, frame: FrameIndex) {
        self.gpu.update(frame, &mut self.provider);
    }

    fn is_loading(&self) -> bool {
        self.gpu.is_loading()
    }

    fn tile_tessellation(&self) -> u32 {
        self.gpu.settings().tile_tessellation
    }

    fn min_lod_switch_time_seconds(&self) -> f32 {
        self.gpu.settings().min_lod_switch_time_seconds
    }

    fn delete_tile_data(&mut self, area: &AreaKey) {
        self.gpu.delete_tile_data(area, &mut self.provider);
    }

    fn device_mut(&mut self) -> &mut dyn BakeDevice {
        self.gpu.device_mut()
    }
}
