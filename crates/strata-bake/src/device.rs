use crate::{
    BakeError, BakeMaterial, BakeStatus, BakeTicket, FrameIndex, OwnerId, RenderTargetId,
    SnapshotId, SurfaceFormat, TextureHandle,
};

/// The rendering collaborator that executes bake passes.
///
/// A pass dispatched with [`dispatch`](Self::dispatch) runs on a later frame.
/// Callers observe completion through [`poll_bake`](Self::poll_bake) once per
/// frame. Surface data is read back through snapshots, which are requested
/// once and polled for readiness.
pub trait BakeDevice {
    /// Advance to `frame`, completing any work that is due.
    fn begin_frame(&mut self, frame: FrameIndex);

    fn frame(&self) -> FrameIndex;

    /// Create an owner, optionally nested under `parent`.
    fn create_owner(&mut self, parent: Option<OwnerId>) -> Result<OwnerId, BakeError>;

    /// Dispose an owner, its children and every resource they hold.
    fn dispose_owner(&mut self, owner: OwnerId) -> Result<(), BakeError>;

    fn create_render_target(
        &mut self,
        label: &str,
        resolution: u32,
        formats: &[SurfaceFormat],
    ) -> Result<RenderTargetId, BakeError>;

    /// Start running `material` into `target`.
    fn dispatch(
        &mut self,
        target: RenderTargetId,
        material: &BakeMaterial,
    ) -> Result<BakeTicket, BakeError>;

    fn poll_bake(&mut self, ticket: BakeTicket) -> Result<BakeStatus, BakeError>;

    /// Drop an in-flight pass. Its outputs are never written. Unknown or
    /// already retired tickets are ignored.
    fn cancel_bake(&mut self, ticket: BakeTicket);

    /// Copy a baked surface into a new texture held by `owner`.
    fn copy_to_texture(
        &mut self,
        target: RenderTargetId,
        surface: usize,
        owner: OwnerId,
    ) -> Result<TextureHandle, BakeError>;

    /// Free a single texture before its owner is disposed.
    fn dispose_texture(&mut self, texture: TextureHandle) -> Result<(), BakeError>;

    /// Request a CPU copy of a baked surface. The copy reflects the surface
    /// contents at request time.
    fn request_snapshot(
        &mut self,
        target: RenderTargetId,
        surface: usize,
        owner: OwnerId,
    ) -> Result<SnapshotId, BakeError>;

    fn poll_snapshot(&mut self, snapshot: SnapshotId) -> Result<bool, BakeError>;

    /// Take the snapshot's raw bytes, tightly packed in the surface format.
    /// The snapshot is consumed.
    fn read_snapshot(&mut self, snapshot: SnapshotId) -> Result<Vec<u8>, BakeError>;
}
