//! The capability set a concrete data source plugs into [`GpuDataSource`].
//!
//! [`GpuDataSource`]: crate::GpuDataSource

use strata_bake::{BakeDevice, BakeMaterial, RenderTargetId, SurfaceFormat, TextureHandle};

use crate::{AreaKey, TileBakingArgs, TileDataError, TileLayout};

/// Generates the materials and baseline fields for tile baking requests.
///
/// Every method is called on the frame thread. `initialize_tile_data` runs
/// once per request; the initialization may span several frames by adding
/// custom bake steps and completing from
/// [`on_custom_step_completed`](Self::on_custom_step_completed).
pub trait TileDataProvider {
    /// Populate the baseline tile fields. The request starts its texture and
    /// displacement bakes once [`TileInit::complete`] has been called.
    fn initialize_tile_data(&mut self, init: &mut TileInit<'_>);

    /// Called when a custom step added through [`TileInit::add_baker`] or
    /// [`GpuDataSource::add_baker_to_area`](crate::GpuDataSource::add_baker_to_area)
    /// finishes. `target` holds the baked surfaces until the request retires.
    fn on_custom_step_completed(
        &mut self,
        step: &str,
        target: RenderTargetId,
        device: &mut dyn BakeDevice,
        init: &mut TileInit<'_>,
    ) -> Result<(), TileDataError> {
        let _ = (step, target, device, init);
        Ok(())
    }

    /// Material baking the normal map (surface 0) and albedo (surface 1).
    fn create_texture_baking_material(&mut self, args: &TileBakingArgs) -> BakeMaterial;

    /// Material baking the displacement (surface 0, single channel).
    fn create_displacement_baking_material(&mut self, args: &TileBakingArgs) -> BakeMaterial;

    /// The consumer no longer needs `area`.
    fn on_tile_data_delete(&mut self, area: &AreaKey, device: &mut dyn BakeDevice) {
        let _ = (area, device);
    }

    /// Return false to defer a new request for `area`.
    fn can_render_area(&mut self, area: &AreaKey) -> bool {
        let _ = area;
        true
    }
}

pub(crate) struct CustomBaker {
    pub step: String,
    pub resolution: u32,
    pub formats: Vec<SurfaceFormat>,
    pub material: BakeMaterial,
}

#[derive(Default)]
pub(crate) struct InitOutcome {
    pub bakers: Vec<CustomBaker>,
    pub layout: Option<TileLayout>,
}

/// Handle given to a provider while it initializes a request.
pub struct TileInit<'a> {
    args: &'a mut TileBakingArgs,
    texture_size: u32,
    displacement_size: u32,
    pending_custom_steps: usize,
    already_completed: bool,
    outcome: InitOutcome,
}

impl<'a> TileInit<'a> {
    pub(crate) fn new(
        args: &'a mut TileBakingArgs,
        texture_size: u32,
        displacement_size: u32,
        pending_custom_steps: usize,
        already_completed: bool,
    ) -> Self {
        Self {
            args,
            texture_size,
            displacement_size,
            pending_custom_steps,
            already_completed,
            outcome: InitOutcome::default(),
        }
    }

    pub fn args(&self) -> &TileBakingArgs {
        self.args
    }

    pub fn area(&self) -> &AreaKey {
        &self.args.area
    }

    /// Resolution of the normal and albedo textures.
    pub fn texture_size(&self) -> u32 {
        self.texture_size
    }

    /// Resolution of the displacement surface, one texel per mesh vertex.
    pub fn displacement_size(&self) -> u32 {
        self.displacement_size
    }

    /// Attach an extra bake step to this request.
    pub fn add_baker(
        &mut self,
        step: &str,
        resolution: u32,
        formats: &[SurfaceFormat],
        material: BakeMaterial,
    ) {
        self.outcome.bakers.push(CustomBaker {
            step: step.to_string(),
            resolution,
            formats: formats.to_vec(),
            material,
        });
    }

    /// Make a texture available to material factories through
    /// [`TileBakingArgs::attached_texture`].
    pub fn attach_texture(&mut self, name: &str, texture: TextureHandle) {
        self.args.attach_texture(name, texture);
    }

    /// Custom steps of this request still baking, including steps added
    /// through this handle.
    pub fn pending_custom_steps(&self) -> usize {
        self.pending_custom_steps + self.outcome.bakers.len()
    }

    /// Finish initialization with the baseline tile fields.
    pub fn complete(&mut self, layout: TileLayout) {
        self.outcome.layout = Some(layout);
    }

    pub fn is_completed(&self) -> bool {
        self.already_completed || self.outcome.layout.is_some()
    }

    pub(crate) fn finish(self) -> InitOutcome {
        self.outcome
    }
}
