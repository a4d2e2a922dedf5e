//! Request-deduplicating orchestrator turning tile queries into multi-frame
//! bake pipelines.
//!
//! Each [`AreaKey`] maps to at most one in-flight request. A request bakes the
//! normal and albedo textures in one pass and the displacement in another,
//! then reads the displacement back to the CPU to compute its height bounds.
//! [`GpuDataSource::update`] advances every request once per frame; the
//! consumer polls [`GpuDataSource::try_get_tile_data`] until the tile is ready.

use std::collections::HashMap;

use strata_bake::{
    BakeDevice, BakeMaterial, BakeStatus, BakerId, BakerLease, BakerPool, BakerPoolStats,
    FrameIndex, OwnerId, SnapshotId, SurfaceFormat, TextureHandle,
};
use strata_config::TileDataConfig;

use crate::provider::{InitOutcome, TileInit};
use crate::{
    AreaKey, BakingSteps, Curvature, TileBakingArgs, TileData, TileDataError, TileDataProvider,
    TileLayout,
};

/// Step name of the normal and albedo bake.
pub const TEXTURES_STEP: &str = "TerrainTileTextures";
/// Step name of the displacement bake.
pub const DISPLACEMENT_STEP: &str = "TerrainTileDisplace";
/// Output formats of the texture bake: normal map, then albedo.
pub const TILE_TEXTURE_FORMATS: [SurfaceFormat; 2] = [SurfaceFormat::Rgba8, SurfaceFormat::Rgba8];
/// Output format of the displacement bake.
pub const DISPLACEMENT_FORMATS: [SurfaceFormat; 1] = [SurfaceFormat::R32Float];

/// Sizing and throttling for a [`GpuDataSource`].
#[derive(Clone, Debug, PartialEq)]
pub struct GpuDataSourceSettings {
    /// Side length in texels of the baked normal and albedo textures.
    pub tile_texture_size: u32,
    /// Quads per tile side; always a power of two.
    pub tile_tessellation: u32,
    /// Maximum requests in flight.
    pub max_baking_thread_count: usize,
    /// Maximum requests started per frame.
    pub max_bake_process_per_frame: usize,
    /// Minimum time a LOD level stays on screen before a consumer may
    /// switch it. Not used by the source itself.
    pub min_lod_switch_time_seconds: f32,
}

impl GpuDataSourceSettings {
    pub fn new(tile_texture_size: u32, tile_tessellation: u32) -> Self {
        Self {
            tile_texture_size: tile_texture_size.max(1),
            tile_tessellation: tile_tessellation.max(1).next_power_of_two(),
            ..Self::from(&TileDataConfig::default())
        }
    }

    /// Displacement resolution: one texel per mesh vertex.
    pub fn tile_displacement_size(&self) -> u32 {
        self.tile_tessellation + 1
    }
}

impl Default for GpuDataSourceSettings {
    fn default() -> Self {
        Self::from(&TileDataConfig::default())
    }
}

impl From<&TileDataConfig> for GpuDataSourceSettings {
    fn from(config: &TileDataConfig) -> Self {
        Self {
            tile_texture_size: config.tile_texture_size.max(1),
            tile_tessellation: config.tile_tessellation.max(1).next_power_of_two(),
            max_baking_thread_count: config.max_baking_thread_count,
            max_bake_process_per_frame: config.max_bake_process_per_frame,
            min_lod_switch_time_seconds: config.min_lod_switch_time_seconds,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum StepKind {
    Textures,
    Displacement,
    Custom(String),
}

impl StepKind {
    fn name(&self) -> &str {
        match self {
            StepKind::Textures => TEXTURES_STEP,
            StepKind::Displacement => DISPLACEMENT_STEP,
            StepKind::Custom(name) => name,
        }
    }
}

struct BakeStep {
    kind: StepKind,
    lease: BakerLease,
    done: bool,
}

enum Phase {
    /// Waiting for the provider to complete initialization.
    Initializing,
    Baking,
    Failed(TileDataError),
}

#[derive(Default)]
struct PartialTileData {
    layout: TileLayout,
    albedo: Option<TextureHandle>,
    normal: Option<TextureHandle>,
    displacement: Option<TextureHandle>,
    bounds: Option<(f32, f32)>,
}

impl PartialTileData {
    fn textures(&self) -> impl Iterator<Item = TextureHandle> + '_ {
        [self.albedo, self.normal, self.displacement].into_iter().flatten()
    }

    fn finish(&self, area: AreaKey) -> Option<TileData> {
        let (displacement_min, displacement_max) = self.bounds?;
        Some(TileData {
            area,
            albedo: self.albedo?,
            normal: self.normal?,
            displacement: self.displacement?,
            displacement_min,
            displacement_max,
            texcoord_offset: self.layout.texcoord_offset,
            texcoord_scale: self.layout.texcoord_scale,
            displacement_offset: self.layout.displacement_offset,
            displacement_scale: self.layout.displacement_scale,
        })
    }
}

/// Smallest and largest sample, or `None` for an empty buffer.
fn displacement_bounds(values: &[f32]) -> Option<(f32, f32)> {
    let (first, rest) = values.split_first()?;
    Some(rest.iter().fold((*first, *first), |(min, max), v| {
        (min.min(*v), max.max(*v))
    }))
}

/// One in-flight tile, exclusively owned by the source.
struct TileBakingRequest {
    args: TileBakingArgs,
    phase: Phase,
    completed: BakingSteps,
    steps: Vec<BakeStep>,
    result: PartialTileData,
    snapshot: Option<SnapshotId>,
    started_frame: FrameIndex,
}

impl TileBakingRequest {
    fn pending_custom_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| !s.done && matches!(s.kind, StepKind::Custom(_)))
            .count()
    }

    fn add_baker<D: BakeDevice>(
        &mut self,
        device: &mut D,
        pool: &mut BakerPool,
        kind: StepKind,
        resolution: u32,
        formats: &[SurfaceFormat],
        material: BakeMaterial,
    ) -> Result<BakerId, TileDataError> {
        let mut lease = pool.acquire(device, kind.name(), resolution, formats)?;
        let id = lease.id();
        // Keep the lease even if dispatch fails so retirement returns it.
        let dispatched = lease.bake(device, material);
        self.steps.push(BakeStep {
            kind,
            lease,
            done: false,
        });
        dispatched?;
        Ok(id)
    }

    fn apply_init<D: BakeDevice>(
        &mut self,
        outcome: InitOutcome,
        device: &mut D,
        pool: &mut BakerPool,
        settings: &GpuDataSourceSettings,
        provider: &mut dyn TileDataProvider,
    ) -> Result<(), TileDataError> {
        for baker in outcome.bakers {
            self.add_baker(
                device,
                pool,
                StepKind::Custom(baker.step),
                baker.resolution,
                &baker.formats,
                baker.material,
            )?;
        }

        if let Some(layout) = outcome.layout {
            if !matches!(self.phase, Phase::Initializing) {
                tracing::warn!(area = %self.args.area, "tile initialization completed twice");
                return Ok(());
            }
            self.result.layout = layout;
            self.start_baking(device, pool, settings, provider)?;
        }
        Ok(())
    }

    fn start_baking<D: BakeDevice>(
        &mut self,
        device: &mut D,
        pool: &mut BakerPool,
        settings: &GpuDataSourceSettings,
        provider: &mut dyn TileDataProvider,
    ) -> Result<(), TileDataError> {
        self.phase = Phase::Baking;

        let textures = provider.create_texture_baking_material(&self.args);
        self.add_baker(
            device,
            pool,
            StepKind::Textures,
            settings.tile_texture_size,
            &TILE_TEXTURE_FORMATS,
            textures,
        )?;

        let displacement = provider.create_displacement_baking_material(&self.args);
        self.add_baker(
            device,
            pool,
            StepKind::Displacement,
            settings.tile_displacement_size(),
            &DISPLACEMENT_FORMATS,
            displacement,
        )?;

        tracing::debug!(area = %self.args.area, "tile baking started");
        Ok(())
    }

    /// Poll every step and the displacement snapshot once.
    fn advance<D: BakeDevice>(
        &mut self,
        device: &mut D,
        pool: &mut BakerPool,
        settings: &GpuDataSourceSettings,
        provider: &mut dyn TileDataProvider,
    ) -> Result<(), TileDataError> {
        if matches!(self.phase, Phase::Failed(_)) {
            return Ok(());
        }

        let mut i = 0;
        while i < self.steps.len() {
            let step = &mut self.steps[i];
            i += 1;
            if step.done || step.lease.pending_ticket().is_none() {
                continue;
            }
            let status = step.lease.poll(device)?;
            let target = step.lease.target();
            let kind = step.kind.clone();

            match status {
                BakeStatus::Pending => {}
                BakeStatus::Failed(reason) => {
                    return Err(TileDataError::BakeFailed {
                        area: self.args.area,
                        step: kind.name().to_string(),
                        reason,
                    });
                }
                BakeStatus::Completed => {
                    step.done = true;
                    let owner = self.args.result_owner;
                    match kind {
                        StepKind::Textures => {
                            self.result.normal = Some(device.copy_to_texture(target, 0, owner)?);
                            self.result.albedo = Some(device.copy_to_texture(target, 1, owner)?);
                            self.completed |=
                                BakingSteps::NORMAL_MAP_READY | BakingSteps::ALBEDO_MAP_READY;
                        }
                        StepKind::Displacement => {
                            self.result.displacement =
                                Some(device.copy_to_texture(target, 0, owner)?);
                            self.completed |= BakingSteps::DISPLACEMENT_READY;
                            self.snapshot = Some(device.request_snapshot(
                                target,
                                0,
                                self.args.scratch_owner,
                            )?);
                        }
                        StepKind::Custom(name) => {
                            let pending = self.pending_custom_steps();
                            let completed = !matches!(self.phase, Phase::Initializing);
                            let mut init = TileInit::new(
                                &mut self.args,
                                settings.tile_texture_size,
                                settings.tile_displacement_size(),
                                pending,
                                completed,
                            );
                            provider.on_custom_step_completed(&name, target, device, &mut init)?;
                            let outcome = init.finish();
                            self.apply_init(outcome, device, pool, settings, provider)?;
                        }
                    }
                }
            }
        }

        if let Some(snapshot) = self.snapshot
            && device.poll_snapshot(snapshot)?
        {
            self.snapshot = None;
            let bytes = device.read_snapshot(snapshot)?;
            let values: Vec<f32> = bytemuck::pod_collect_to_vec(&bytes);
            let bounds = displacement_bounds(&values)
                .ok_or(TileDataError::EmptyReadback(self.args.area))?;
            self.result.bounds = Some(bounds);
            self.completed |= BakingSteps::DISPLACEMENT_READBACK;
        }
        Ok(())
    }

    /// Free the request's private resources and return its bakers.
    fn retire<D: BakeDevice>(self, device: &mut D, pool: &mut BakerPool) -> (Phase, PartialTileData) {
        // The scratch owner is gone already if the consumer disposed the
        // result owner it was nested under.
        if let Err(e) = device.dispose_owner(self.args.scratch_owner) {
            tracing::debug!(area = %self.args.area, error = %e, "scratch owner already disposed");
        }
        for step in self.steps {
            pool.release(device, step.lease);
        }
        (self.phase, self.result)
    }
}

/// Tile data source baking textures and displacement through a [`BakeDevice`].
///
/// Provider-agnostic: what gets baked is decided by the [`TileDataProvider`]
/// passed to each call.
pub struct GpuDataSource<D> {
    device: D,
    pool: BakerPool,
    requests: HashMap<AreaKey, TileBakingRequest>,
    settings: GpuDataSourceSettings,
    frame: FrameIndex,
    last_bake_frame: Option<FrameIndex>,
    started_this_frame: usize,
}

impl<D: BakeDevice> GpuDataSource<D> {
    pub fn new(device: D, settings: GpuDataSourceSettings) -> Self {
        let frame = device.frame();
        Self {
            device,
            pool: BakerPool::new(),
            requests: HashMap::new(),
            settings,
            frame,
            last_bake_frame: None,
            started_this_frame: 0,
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn settings(&self) -> &GpuDataSourceSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut GpuDataSourceSettings {
        &mut self.settings
    }

    pub fn frame(&self) -> FrameIndex {
        self.frame
    }

    pub fn pool_stats(&self) -> BakerPoolStats {
        self.pool.stats()
    }

    /// True while any request is in flight.
    pub fn is_loading(&self) -> bool {
        !self.requests.is_empty()
    }

    pub fn in_flight_count(&self) -> usize {
        self.requests.len()
    }

    /// Completion flags of the request for `area`, if one is in flight.
    pub fn request_steps(&self, area: &AreaKey) -> Option<BakingSteps> {
        self.requests.get(area).map(|r| r.completed)
    }

    /// Frame at which the request for `area` was created.
    pub fn request_started_frame(&self, area: &AreaKey) -> Option<FrameIndex> {
        self.requests.get(area).map(|r| r.started_frame)
    }

    /// Advance the device to `frame` and every request by one poll.
    ///
    /// A request whose step fails is parked in a failed state; the next
    /// [`try_get_tile_data`](Self::try_get_tile_data) for its area retires it
    /// and reports the error.
    pub fn update(&mut self, frame: FrameIndex, provider: &mut dyn TileDataProvider) {
        self.frame = frame;
        self.device.begin_frame(frame);

        let Self {
            device,
            pool,
            requests,
            settings,
            ..
        } = self;
        for request in requests.values_mut() {
            if let Err(e) = request.advance(device, pool, settings, provider) {
                tracing::warn!(area = %request.args.area, error = %e, "tile baking failed");
                request.phase = Phase::Failed(e);
            }
        }
    }

    /// Admission control for new requests.
    ///
    /// Delays when the in-flight cap is reached or when this frame has
    /// already started its quota of requests. Counts an admission otherwise.
    pub fn should_delay_baking_process(&mut self) -> bool {
        if self.requests.len() >= self.settings.max_baking_thread_count {
            return true;
        }
        if self.last_bake_frame.is_none_or(|f| f < self.frame) {
            self.last_bake_frame = Some(self.frame);
            self.started_this_frame = 0;
        }
        if self.started_this_frame >= self.settings.max_bake_process_per_frame {
            return true;
        }
        self.started_this_frame += 1;
        false
    }

    /// Returns the tile data for `area` once every step has completed.
    ///
    /// The first call for an area starts a request (unless the provider or
    /// the throttle defers it) and returns `Ok(None)`, as do calls while the
    /// request is baking. The call that observes completion retires the
    /// request and hands over the data. A failed request is retired and its
    /// error returned; the next call starts afresh.
    ///
    /// `can_render_area` is consulted before the throttle, so a refused area
    /// does not use up the frame's admission. Neither does a request that
    /// fails to start.
    pub fn try_get_tile_data(
        &mut self,
        area: &AreaKey,
        curvature: Curvature,
        result_owner: OwnerId,
        provider: &mut dyn TileDataProvider,
    ) -> Result<Option<TileData>, TileDataError> {
        let Some(request) = self.requests.get(area) else {
            if !provider.can_render_area(area) || self.should_delay_baking_process() {
                return Ok(None);
            }
            if let Err(e) = self.start_request(*area, curvature, result_owner, provider) {
                self.started_this_frame = self.started_this_frame.saturating_sub(1);
                return Err(e);
            }
            return Ok(None);
        };

        let failed = matches!(request.phase, Phase::Failed(_));
        if !failed && !request.completed.is_complete() {
            return Ok(None);
        }

        let Some(request) = self.requests.remove(area) else {
            return Ok(None);
        };
        let (phase, result) = request.retire(&mut self.device, &mut self.pool);
        match phase {
            Phase::Failed(e) => {
                self.dispose_partial_result(&result);
                Err(e)
            }
            _ => {
                let data = result
                    .finish(*area)
                    .ok_or(TileDataError::IncompleteResult(*area))?;
                tracing::debug!(%area, min = data.displacement_min, max = data.displacement_max, "tile data ready");
                Ok(Some(data))
            }
        }
    }

    fn start_request(
        &mut self,
        area: AreaKey,
        curvature: Curvature,
        result_owner: OwnerId,
        provider: &mut dyn TileDataProvider,
    ) -> Result<(), TileDataError> {
        let scratch_owner = self.device.create_owner(Some(result_owner))?;
        let mut request = TileBakingRequest {
            args: TileBakingArgs::new(area, curvature, result_owner, scratch_owner),
            phase: Phase::Initializing,
            completed: BakingSteps::NONE,
            steps: Vec::new(),
            result: PartialTileData::default(),
            snapshot: None,
            started_frame: self.frame,
        };
        tracing::debug!(%area, frame = self.frame, "tile request created");

        let mut init = TileInit::new(
            &mut request.args,
            self.settings.tile_texture_size,
            self.settings.tile_displacement_size(),
            0,
            false,
        );
        provider.initialize_tile_data(&mut init);
        let outcome = init.finish();

        let started = request.apply_init(
            outcome,
            &mut self.device,
            &mut self.pool,
            &self.settings,
            provider,
        );
        if let Err(e) = started {
            let (_, result) = request.retire(&mut self.device, &mut self.pool);
            self.dispose_partial_result(&result);
            return Err(e);
        }
        self.requests.insert(area, request);
        Ok(())
    }

    fn dispose_partial_result(&mut self, result: &PartialTileData) {
        for texture in result.textures() {
            if let Err(e) = self.device.dispose_texture(texture) {
                tracing::debug!(%texture, error = %e, "partial result texture already disposed");
            }
        }
    }

    /// Attach an extra bake step to the in-flight request for `area`.
    ///
    /// The provider is notified through
    /// [`TileDataProvider::on_custom_step_completed`] when it finishes.
    pub fn add_baker_to_area(
        &mut self,
        area: &AreaKey,
        step: &str,
        resolution: u32,
        formats: &[SurfaceFormat],
        material: BakeMaterial,
    ) -> Result<BakerId, TileDataError> {
        let request = self
            .requests
            .get_mut(area)
            .ok_or(TileDataError::UnknownArea(*area))?;
        request.add_baker(
            &mut self.device,
            &mut self.pool,
            StepKind::Custom(step.to_string()),
            resolution,
            formats,
            material,
        )
    }

    /// Tell the provider the consumer no longer needs `area`.
    ///
    /// An in-flight request for the area keeps baking and is retired by the
    /// next successful retrieval.
    pub fn delete_tile_data(&mut self, area: &AreaKey, provider: &mut dyn TileDataProvider) {
        provider.on_tile_data_delete(area, &mut self.device);
    }
}
