//! A [`BakeDevice`] that runs texel programs on the CPU.
//!
//! Passes complete a configurable number of frames after dispatch, per
//! material name, and snapshots become readable a fixed number of frames after
//! they are requested. Texel programs run either inline when a pass comes due
//! or on background worker threads started at dispatch time. Completion is
//! always reported at the due frame, so timing is deterministic in both modes.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::{Receiver, Sender, unbounded};
use glam::Vec4;

use crate::texture::encode_surface;
use crate::{
    BakeDevice, BakeError, BakeMaterial, BakeStatus, BakeTicket, FrameIndex, OwnerId,
    RenderTargetId, SnapshotId, SurfaceFormat, TexelInputs, TexelProgram, TextureData,
    TextureHandle, texel_uv,
};

/// Timing and threading for [`CpuBakeDevice`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CpuBakeSettings {
    /// Frames between dispatch and completion for materials without an
    /// explicit latency.
    pub default_bake_latency: u64,
    /// Frames between a snapshot request and its readiness.
    pub snapshot_latency: u64,
    /// Background threads running texel programs. Zero runs them inline.
    pub worker_threads: usize,
}

impl Default for CpuBakeSettings {
    fn default() -> Self {
        Self {
            default_bake_latency: 1,
            snapshot_latency: 1,
            worker_threads: 0,
        }
    }
}

fn run_program(
    program: &dyn TexelProgram,
    inputs: &TexelInputs,
    resolution: u32,
    surface_count: usize,
) -> Vec<Vec<Vec4>> {
    let texel_count = (resolution as usize) * (resolution as usize);
    let mut surfaces = vec![Vec::with_capacity(texel_count); surface_count];
    let mut out = vec![Vec4::ZERO; surface_count];
    for y in 0..resolution {
        for x in 0..resolution {
            out.fill(Vec4::ZERO);
            program.shade(texel_uv(x, y, resolution), inputs, &mut out);
            for (surface, value) in surfaces.iter_mut().zip(&out) {
                surface.push(*value);
            }
        }
    }
    surfaces
}

/// Outputs of a program, or the reason it failed.
type BakeOutput = Result<Vec<Vec<Vec4>>, String>;

fn panic_reason(payload: Box<dyn Any + Send>) -> String {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("texel program panicked: {message}")
}

/// Run a program, turning a panic into a failure.
fn run_program_guarded(
    program: &dyn TexelProgram,
    inputs: &TexelInputs,
    resolution: u32,
    surface_count: usize,
) -> BakeOutput {
    catch_unwind(AssertUnwindSafe(|| {
        run_program(program, inputs, resolution, surface_count)
    }))
    .map_err(panic_reason)
}

struct RenderTarget {
    label: String,
    resolution: u32,
    formats: Vec<SurfaceFormat>,
    surfaces: Option<Vec<Vec<Vec4>>>,
    busy: Option<BakeTicket>,
}

impl RenderTarget {
    fn check_surface(&self, id: RenderTargetId, surface: usize) -> Result<(), BakeError> {
        if surface >= self.formats.len() {
            return Err(BakeError::SurfaceOutOfRange {
                target: id,
                surface,
                count: self.formats.len(),
            });
        }
        Ok(())
    }

    fn baked_surface(&self, id: RenderTargetId, surface: usize) -> Result<&[Vec4], BakeError> {
        self.check_surface(id, surface)?;
        let surfaces = self.surfaces.as_ref().ok_or(BakeError::TargetNotBaked(id))?;
        Ok(&surfaces[surface])
    }
}

#[derive(Default)]
struct OwnerNode {
    parent: Option<OwnerId>,
    children: Vec<OwnerId>,
    textures: Vec<TextureHandle>,
    snapshots: Vec<SnapshotId>,
}

struct TextureEntry {
    owner: OwnerId,
    data: Arc<TextureData>,
}

struct Snapshot {
    owner: OwnerId,
    ready_frame: FrameIndex,
    bytes: Vec<u8>,
}

struct Job {
    target: RenderTargetId,
    material: BakeMaterial,
    inputs: TexelInputs,
    due_frame: FrameIndex,
    offloaded: bool,
    cancelled: Arc<AtomicBool>,
    outcome: Option<BakeStatus>,
}

struct WorkItem {
    ticket: BakeTicket,
    program: Arc<dyn TexelProgram>,
    inputs: TexelInputs,
    resolution: u32,
    surface_count: usize,
    cancelled: Arc<AtomicBool>,
}

struct WorkResult {
    ticket: BakeTicket,
    output: BakeOutput,
}

struct Workers {
    task_sender: Sender<WorkItem>,
    result_receiver: Receiver<WorkResult>,
}

impl Workers {
    /// Returns `None` when no worker thread could be started.
    fn spawn(count: usize) -> Option<Self> {
        if count == 0 {
            return None;
        }
        let (task_sender, task_receiver) = unbounded::<WorkItem>();
        let (result_sender, result_receiver) = unbounded::<WorkResult>();

        let mut spawned = 0;
        for i in 0..count {
            let receiver = task_receiver.clone();
            let sender = result_sender.clone();
            let handle = std::thread::Builder::new()
                .name(format!("bake-worker-{i}"))
                .spawn(move || {
                    while let Ok(item) = receiver.recv() {
                        if item.cancelled.load(Ordering::Relaxed) {
                            continue;
                        }
                        let output = run_program_guarded(
                            item.program.as_ref(),
                            &item.inputs,
                            item.resolution,
                            item.surface_count,
                        );
                        if !item.cancelled.load(Ordering::Relaxed) {
                            let _ = sender.send(WorkResult {
                                ticket: item.ticket,
                                output,
                            });
                        }
                    }
                });
            match handle {
                Ok(_) => spawned += 1,
                Err(e) => tracing::warn!(error = %e, "failed to spawn bake worker"),
            }
        }

        (spawned > 0).then_some(Self {
            task_sender,
            result_receiver,
        })
    }
}

/// Software bake device with deterministic frame timing.
pub struct CpuBakeDevice {
    settings: CpuBakeSettings,
    frame: FrameIndex,
    next_id: u64,
    owners: HashMap<OwnerId, OwnerNode>,
    targets: HashMap<RenderTargetId, RenderTarget>,
    textures: HashMap<TextureHandle, TextureEntry>,
    snapshots: HashMap<SnapshotId, Snapshot>,
    jobs: HashMap<BakeTicket, Job>,
    arrived: HashMap<BakeTicket, BakeOutput>,
    material_latency: HashMap<String, u64>,
    failing_materials: HashSet<String>,
    completed_bakes: u64,
    workers: Option<Workers>,
}

impl Default for CpuBakeDevice {
    fn default() -> Self {
        Self::new(CpuBakeSettings::default())
    }
}

impl CpuBakeDevice {
    pub fn new(settings: CpuBakeSettings) -> Self {
        let workers = Workers::spawn(settings.worker_threads);
        Self {
            settings,
            frame: 0,
            next_id: 1,
            owners: HashMap::new(),
            targets: HashMap::new(),
            textures: HashMap::new(),
            snapshots: HashMap::new(),
            jobs: HashMap::new(),
            arrived: HashMap::new(),
            material_latency: HashMap::new(),
            failing_materials: HashSet::new(),
            completed_bakes: 0,
            workers,
        }
    }

    pub fn settings(&self) -> &CpuBakeSettings {
        &self.settings
    }

    /// Frames between dispatch and completion for passes using `material`.
    pub fn set_bake_latency(&mut self, material: &str, frames: u64) {
        self.material_latency.insert(material.to_string(), frames);
    }

    pub fn set_snapshot_latency(&mut self, frames: u64) {
        self.settings.snapshot_latency = frames;
    }

    /// Make every pass using `material` fail when it comes due.
    pub fn fail_material(&mut self, material: &str) {
        self.failing_materials.insert(material.to_string());
    }

    pub fn texture(&self, handle: TextureHandle) -> Option<&TextureData> {
        self.textures.get(&handle).map(|entry| entry.data.as_ref())
    }

    pub fn texture_owner(&self, handle: TextureHandle) -> Option<OwnerId> {
        self.textures.get(&handle).map(|entry| entry.owner)
    }

    pub fn live_owner_count(&self) -> usize {
        self.owners.len()
    }

    pub fn live_texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn render_target_count(&self) -> usize {
        self.targets.len()
    }

    /// Passes dispatched and not yet retired by a poll or a cancel.
    pub fn pending_bake_count(&self) -> usize {
        self.jobs.len()
    }

    pub fn pending_snapshot_count(&self) -> usize {
        self.snapshots.len()
    }

    /// Passes that have run to completion or failure.
    pub fn completed_bake_count(&self) -> u64 {
        self.completed_bakes
    }

    pub fn uses_workers(&self) -> bool {
        self.workers.is_some()
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn bake_latency(&self, material: &BakeMaterial) -> u64 {
        self.material_latency
            .get(material.name())
            .copied()
            .unwrap_or(self.settings.default_bake_latency)
    }

    /// Block until a worker delivers the outputs for `ticket`.
    fn wait_for_result(&mut self, ticket: BakeTicket) -> BakeOutput {
        loop {
            if let Some(output) = self.arrived.remove(&ticket) {
                return output;
            }
            let Some(workers) = &self.workers else {
                return Err("no bake workers".to_string());
            };
            match workers.result_receiver.recv() {
                Ok(result) => {
                    if self.jobs.contains_key(&result.ticket) {
                        self.arrived.insert(result.ticket, result.output);
                    }
                }
                Err(_) => return Err("bake workers disconnected".to_string()),
            }
        }
    }

    fn complete_job(&mut self, ticket: BakeTicket) {
        let Some(job) = self.jobs.get(&ticket) else {
            return;
        };
        let target_id = job.target;
        let offloaded = job.offloaded;
        let failing = self.failing_materials.contains(job.material.name());
        let program = Arc::clone(job.material.program());
        let inputs = job.inputs.clone();

        let Some((label, resolution, surface_count)) = self
            .targets
            .get(&target_id)
            .map(|t| (t.label.clone(), t.resolution, t.formats.len()))
        else {
            return;
        };

        let outcome = if failing {
            Err("injected failure".to_string())
        } else if offloaded {
            self.wait_for_result(ticket)
        } else {
            run_program_guarded(program.as_ref(), &inputs, resolution, surface_count)
        };

        let status = match outcome {
            Ok(surfaces) => {
                if let Some(target) = self.targets.get_mut(&target_id) {
                    target.surfaces = Some(surfaces);
                }
                BakeStatus::Completed
            }
            Err(reason) => {
                tracing::warn!(%ticket, target = %target_id, %label, %reason, "bake failed");
                BakeStatus::Failed(reason)
            }
        };

        if let Some(target) = self.targets.get_mut(&target_id) {
            target.busy = None;
        }
        if let Some(job) = self.jobs.get_mut(&ticket) {
            job.outcome = Some(status);
        }
        self.completed_bakes += 1;
    }

    fn collect_subtree(&self, root: OwnerId) -> Vec<OwnerId> {
        let mut out = vec![root];
        let mut i = 0;
        while i < out.len() {
            if let Some(node) = self.owners.get(&out[i]) {
                out.extend(node.children.iter().copied());
            }
            i += 1;
        }
        out
    }
}

impl BakeDevice for CpuBakeDevice {
    fn begin_frame(&mut self, frame: FrameIndex) {
        self.frame = frame;

        if let Some(workers) = &self.workers {
            for result in workers.result_receiver.try_iter() {
                if self.jobs.contains_key(&result.ticket) {
                    self.arrived.insert(result.ticket, result.output);
                }
            }
        }

        let mut due: Vec<BakeTicket> = self
            .jobs
            .iter()
            .filter(|(_, job)| job.outcome.is_none() && job.due_frame <= frame)
            .map(|(ticket, _)| *ticket)
            .collect();
        due.sort();
        for ticket in due {
            self.complete_job(ticket);
        }
    }

    fn frame(&self) -> FrameIndex {
        self.frame
    }

    fn create_owner(&mut self, parent: Option<OwnerId>) -> Result<OwnerId, BakeError> {
        if let Some(parent) = parent
            && !self.owners.contains_key(&parent)
        {
            return Err(BakeError::UnknownOwner(parent));
        }
        let id = OwnerId(self.allocate_id());
        self.owners.insert(
            id,
            OwnerNode {
                parent,
                ..OwnerNode::default()
            },
        );
        if let Some(parent) = parent
            && let Some(node) = self.owners.get_mut(&parent)
        {
            node.children.push(id);
        }
        Ok(id)
    }

    fn dispose_owner(&mut self, owner: OwnerId) -> Result<(), BakeError> {
        let parent = self
            .owners
            .get(&owner)
            .ok_or(BakeError::UnknownOwner(owner))?
            .parent;
        if let Some(parent) = parent
            && let Some(node) = self.owners.get_mut(&parent)
        {
            node.children.retain(|child| *child != owner);
        }

        for id in self.collect_subtree(owner) {
            if let Some(node) = self.owners.remove(&id) {
                for texture in node.textures {
                    self.textures.remove(&texture);
                }
                for snapshot in node.snapshots {
                    self.snapshots.remove(&snapshot);
                }
            }
        }
        Ok(())
    }

    fn create_render_target(
        &mut self,
        label: &str,
        resolution: u32,
        formats: &[SurfaceFormat],
    ) -> Result<RenderTargetId, BakeError> {
        if resolution == 0 {
            return Err(BakeError::InvalidResolution(resolution));
        }
        if formats.is_empty() {
            return Err(BakeError::NoSurfaceFormats);
        }
        let id = RenderTargetId(self.allocate_id());
        self.targets.insert(
            id,
            RenderTarget {
                label: label.to_string(),
                resolution,
                formats: formats.to_vec(),
                surfaces: None,
                busy: None,
            },
        );
        Ok(id)
    }

    fn dispatch(
        &mut self,
        target: RenderTargetId,
        material: &BakeMaterial,
    ) -> Result<BakeTicket, BakeError> {
        let (resolution, surface_count) = {
            let t = self.targets.get(&target).ok_or(BakeError::UnknownTarget(target))?;
            if t.busy.is_some() {
                return Err(BakeError::TargetBusy(target));
            }
            (t.resolution, t.formats.len())
        };

        let inputs = material
            .inputs()
            .iter()
            .map(|handle| {
                self.textures
                    .get(handle)
                    .map(|entry| Arc::clone(&entry.data))
                    .ok_or(BakeError::UnknownTexture(*handle))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(TexelInputs::new)?;

        let ticket = BakeTicket(self.allocate_id());
        let cancelled = Arc::new(AtomicBool::new(false));
        let due_frame = self.frame + self.bake_latency(material);

        let mut offloaded = false;
        if !self.failing_materials.contains(material.name())
            && let Some(workers) = &self.workers
        {
            offloaded = workers
                .task_sender
                .send(WorkItem {
                    ticket,
                    program: Arc::clone(material.program()),
                    inputs: inputs.clone(),
                    resolution,
                    surface_count,
                    cancelled: Arc::clone(&cancelled),
                })
                .is_ok();
        }

        self.jobs.insert(
            ticket,
            Job {
                target,
                material: material.clone(),
                inputs,
                due_frame,
                offloaded,
                cancelled,
                outcome: None,
            },
        );
        if let Some(t) = self.targets.get_mut(&target) {
            t.busy = Some(ticket);
        }
        tracing::trace!(%ticket, %target, material = material.name(), due_frame, "dispatched bake");
        Ok(ticket)
    }

    fn poll_bake(&mut self, ticket: BakeTicket) -> Result<BakeStatus, BakeError> {
        let job = self.jobs.get(&ticket).ok_or(BakeError::UnknownTicket(ticket))?;
        if job.outcome.is_none() {
            return Ok(BakeStatus::Pending);
        }
        let job = self.jobs.remove(&ticket).ok_or(BakeError::UnknownTicket(ticket))?;
        Ok(job.outcome.unwrap_or(BakeStatus::Pending))
    }

    fn cancel_bake(&mut self, ticket: BakeTicket) {
        let Some(job) = self.jobs.remove(&ticket) else {
            return;
        };
        job.cancelled.store(true, Ordering::Relaxed);
        self.arrived.remove(&ticket);
        if let Some(target) = self.targets.get_mut(&job.target)
            && target.busy == Some(ticket)
        {
            target.busy = None;
        }
        tracing::trace!(%ticket, "cancelled bake");
    }

    fn copy_to_texture(
        &mut self,
        target: RenderTargetId,
        surface: usize,
        owner: OwnerId,
    ) -> Result<TextureHandle, BakeError> {
        if !self.owners.contains_key(&owner) {
            return Err(BakeError::UnknownOwner(owner));
        }
        let t = self.targets.get(&target).ok_or(BakeError::UnknownTarget(target))?;
        let texels = t.baked_surface(target, surface)?.to_vec();
        let data = TextureData {
            resolution: t.resolution,
            format: t.formats[surface],
            texels,
        };

        let handle = TextureHandle(self.allocate_id());
        self.textures.insert(
            handle,
            TextureEntry {
                owner,
                data: Arc::new(data),
            },
        );
        if let Some(node) = self.owners.get_mut(&owner) {
            node.textures.push(handle);
        }
        Ok(handle)
    }

    fn dispose_texture(&mut self, texture: TextureHandle) -> Result<(), BakeError> {
        let entry = self
            .textures
            .remove(&texture)
            .ok_or(BakeError::UnknownTexture(texture))?;
        if let Some(node) = self.owners.get_mut(&entry.owner) {
            node.textures.retain(|t| *t != texture);
        }
        Ok(())
    }

    fn request_snapshot(
        &mut self,
        target: RenderTargetId,
        surface: usize,
        owner: OwnerId,
    ) -> Result<SnapshotId, BakeError> {
        if !self.owners.contains_key(&owner) {
            return Err(BakeError::UnknownOwner(owner));
        }
        let t = self.targets.get(&target).ok_or(BakeError::UnknownTarget(target))?;
        let texels = t.baked_surface(target, surface)?;
        let bytes = encode_surface(t.formats[surface], texels);

        let id = SnapshotId(self.allocate_id());
        self.snapshots.insert(
            id,
            Snapshot {
                owner,
                ready_frame: self.frame + self.settings.snapshot_latency,
                bytes,
            },
        );
        if let Some(node) = self.owners.get_mut(&owner) {
            node.snapshots.push(id);
        }
        Ok(id)
    }

    fn poll_snapshot(&mut self, snapshot: SnapshotId) -> Result<bool, BakeError> {
        let s = self
            .snapshots
            .get(&snapshot)
            .ok_or(BakeError::UnknownSnapshot(snapshot))?;
        Ok(self.frame >= s.ready_frame)
    }

    fn read_snapshot(&mut self, snapshot: SnapshotId) -> Result<Vec<u8>, BakeError> {
        if !self.poll_snapshot(snapshot)? {
            return Err(BakeError::SnapshotNotReady(snapshot));
        }
        let s = self
            .snapshots
            .remove(&snapshot)
            .ok_or(BakeError::UnknownSnapshot(snapshot))?;
        if let Some(node) = self.owners.get_mut(&s.owner) {
            node.snapshots.retain(|id| *id != snapshot);
        }
        Ok(s.bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    fn gradient() -> BakeMaterial {
        BakeMaterial::from_fn("gradient", |uv: Vec2, _: &TexelInputs, out: &mut [Vec4]| {
            out[0] = Vec4::new(uv.x, uv.y, 0.0, 1.0);
            if out.len() > 1 {
                out[1] = Vec4::splat(uv.x + uv.y);
            }
        })
    }

    fn bake_now(device: &mut CpuBakeDevice, target: RenderTargetId) {
        let ticket = device.dispatch(target, &gradient()).unwrap();
        let next = device.frame() + device.bake_latency(&gradient());
        device.begin_frame(next);
        assert_eq!(device.poll_bake(ticket).unwrap(), BakeStatus::Completed);
    }

    /// A pass completes exactly at its due frame and is reported once.
    #[test]
    fn test_bake_completes_after_latency() {
        let mut device = CpuBakeDevice::default();
        device.set_bake_latency("gradient", 3);
        let target = device
            .create_render_target("t", 4, &[SurfaceFormat::Rgba8])
            .unwrap();
        let ticket = device.dispatch(target, &gradient()).unwrap();

        for frame in 1..3 {
            device.begin_frame(frame);
            assert_eq!(device.poll_bake(ticket).unwrap(), BakeStatus::Pending);
        }
        device.begin_frame(3);
        assert_eq!(device.poll_bake(ticket).unwrap(), BakeStatus::Completed);
        assert!(matches!(
            device.poll_bake(ticket),
            Err(BakeError::UnknownTicket(_))
        ));
        assert_eq!(device.completed_bake_count(), 1);
    }

    #[test]
    fn test_injected_failure() {
        let mut device = CpuBakeDevice::default();
        device.fail_material("gradient");
        let target = device
            .create_render_target("t", 2, &[SurfaceFormat::Rgba8])
            .unwrap();
        let ticket = device.dispatch(target, &gradient()).unwrap();
        device.begin_frame(1);
        assert!(matches!(device.poll_bake(ticket).unwrap(), BakeStatus::Failed(_)));

        let owner = device.create_owner(None).unwrap();
        assert!(matches!(
            device.copy_to_texture(target, 0, owner),
            Err(BakeError::TargetNotBaked(_))
        ));
    }

    #[test]
    fn test_busy_target_rejects_second_dispatch() {
        let mut device = CpuBakeDevice::default();
        let target = device
            .create_render_target("t", 2, &[SurfaceFormat::Rgba8])
            .unwrap();
        let ticket = device.dispatch(target, &gradient()).unwrap();
        assert!(matches!(
            device.dispatch(target, &gradient()),
            Err(BakeError::TargetBusy(_))
        ));
        device.cancel_bake(ticket);
        assert!(device.dispatch(target, &gradient()).is_ok());
    }

    /// Cancelled passes never write their outputs.
    #[test]
    fn test_cancelled_bake_leaves_target_untouched() {
        let mut device = CpuBakeDevice::default();
        let target = device
            .create_render_target("t", 2, &[SurfaceFormat::Rgba8])
            .unwrap();
        let ticket = device.dispatch(target, &gradient()).unwrap();
        device.cancel_bake(ticket);
        device.begin_frame(5);
        let owner = device.create_owner(None).unwrap();
        assert!(device.copy_to_texture(target, 0, owner).is_err());
        assert_eq!(device.completed_bake_count(), 0);
    }

    #[test]
    fn test_copy_to_texture_contents() {
        let mut device = CpuBakeDevice::default();
        let target = device
            .create_render_target("t", 3, &[SurfaceFormat::Rgba8, SurfaceFormat::R32Float])
            .unwrap();
        bake_now(&mut device, target);

        let owner = device.create_owner(None).unwrap();
        let color = device.copy_to_texture(target, 0, owner).unwrap();
        let sum = device.copy_to_texture(target, 1, owner).unwrap();
        let color = device.texture(color).unwrap();
        assert_eq!(color.format, SurfaceFormat::Rgba8);
        assert_eq!(color.texel(2, 0), Vec4::new(1.0, 0.0, 0.0, 1.0));
        assert_eq!(device.texture(sum).unwrap().texel(2, 2).x, 2.0);
        assert!(matches!(
            device.copy_to_texture(target, 2, owner),
            Err(BakeError::SurfaceOutOfRange { surface: 2, count: 2, .. })
        ));
    }

    /// Snapshots become readable after the snapshot latency and hold raw floats.
    #[test]
    fn test_snapshot_latency_and_bytes() {
        let mut device = CpuBakeDevice::new(CpuBakeSettings {
            snapshot_latency: 2,
            ..CpuBakeSettings::default()
        });
        let target = device
            .create_render_target("d", 2, &[SurfaceFormat::Rgba8, SurfaceFormat::R32Float])
            .unwrap();
        bake_now(&mut device, target);
        let owner = device.create_owner(None).unwrap();
        let snapshot = device.request_snapshot(target, 1, owner).unwrap();

        assert!(!device.poll_snapshot(snapshot).unwrap());
        assert!(matches!(
            device.read_snapshot(snapshot),
            Err(BakeError::SnapshotNotReady(_))
        ));
        device.begin_frame(device.frame() + 2);
        assert!(device.poll_snapshot(snapshot).unwrap());

        let bytes = device.read_snapshot(snapshot).unwrap();
        let values: Vec<f32> = bytemuck::pod_collect_to_vec(&bytes);
        assert_eq!(values, vec![0.0, 1.0, 1.0, 2.0]);
        assert_eq!(device.pending_snapshot_count(), 0);
    }

    /// Disposing an owner frees its children and everything they hold.
    #[test]
    fn test_dispose_owner_is_recursive() {
        let mut device = CpuBakeDevice::default();
        let target = device
            .create_render_target("t", 2, &[SurfaceFormat::Rgba8])
            .unwrap();
        bake_now(&mut device, target);

        let root = device.create_owner(None).unwrap();
        let child = device.create_owner(Some(root)).unwrap();
        let grandchild = device.create_owner(Some(child)).unwrap();
        let sibling = device.create_owner(Some(root)).unwrap();
        device.copy_to_texture(target, 0, grandchild).unwrap();
        device.request_snapshot(target, 0, child).unwrap();
        let kept = device.copy_to_texture(target, 0, sibling).unwrap();

        device.dispose_owner(child).unwrap();
        assert_eq!(device.live_owner_count(), 2);
        assert_eq!(device.live_texture_count(), 1);
        assert_eq!(device.pending_snapshot_count(), 0);
        assert!(device.texture(kept).is_some());
        assert!(device.create_owner(Some(child)).is_err());

        device.dispose_owner(root).unwrap();
        assert_eq!(device.live_owner_count(), 0);
        assert_eq!(device.live_texture_count(), 0);
    }

    #[test]
    fn test_dispose_texture() {
        let mut device = CpuBakeDevice::default();
        let target = device
            .create_render_target("t", 1, &[SurfaceFormat::Rgba8])
            .unwrap();
        bake_now(&mut device, target);
        let owner = device.create_owner(None).unwrap();
        let tex = device.copy_to_texture(target, 0, owner).unwrap();
        device.dispose_texture(tex).unwrap();
        assert!(device.texture(tex).is_none());
        assert!(device.dispose_texture(tex).is_err());
    }

    #[test]
    fn test_invalid_render_targets() {
        let mut device = CpuBakeDevice::default();
        assert!(matches!(
            device.create_render_target("t", 0, &[SurfaceFormat::Rgba8]),
            Err(BakeError::InvalidResolution(0))
        ));
        assert!(matches!(
            device.create_render_target("t", 4, &[]),
            Err(BakeError::NoSurfaceFormats)
        ));
    }

    /// Bound input textures are captured at dispatch and readable by the program.
    #[test]
    fn test_material_reads_bound_input() {
        let mut device = CpuBakeDevice::default();
        let source = device
            .create_render_target("src", 2, &[SurfaceFormat::R32Float])
            .unwrap();
        bake_now(&mut device, source);
        let owner = device.create_owner(None).unwrap();
        let input = device.copy_to_texture(source, 0, owner).unwrap();

        let doubled = BakeMaterial::from_fn("double", |uv: Vec2, inputs: &TexelInputs, out: &mut [Vec4]| {
            out[0] = inputs.sample(0, uv) * 2.0;
        })
        .with_input(input);
        let target = device
            .create_render_target("dst", 2, &[SurfaceFormat::R32Float])
            .unwrap();
        let ticket = device.dispatch(target, &doubled).unwrap();
        device.dispose_texture(input).unwrap();
        device.begin_frame(device.frame() + 1);
        assert_eq!(device.poll_bake(ticket).unwrap(), BakeStatus::Completed);

        let out = device.copy_to_texture(target, 0, owner).unwrap();
        assert_eq!(device.texture(out).unwrap().texel(1, 1).x, 2.0);

        let missing = BakeMaterial::from_fn("double", |_: Vec2, _: &TexelInputs, _: &mut [Vec4]| {})
            .with_input(input);
        assert!(matches!(
            device.dispatch(target, &missing),
            Err(BakeError::UnknownTexture(_))
        ));
    }

    /// A program that panics fails its pass instead of stalling the frame,
    /// on a worker thread as well as inline, and the device keeps baking.
    #[test]
    fn test_panicking_program_fails_the_pass() {
        let broken = BakeMaterial::from_fn("broken", |_: Vec2, _: &TexelInputs, _: &mut [Vec4]| {
            panic!("shader bug")
        });
        for workers in [0, 2] {
            let mut device = CpuBakeDevice::new(CpuBakeSettings {
                worker_threads: workers,
                ..CpuBakeSettings::default()
            });
            let target = device
                .create_render_target("t", 4, &[SurfaceFormat::Rgba8])
                .unwrap();
            let ticket = device.dispatch(target, &broken).unwrap();
            device.begin_frame(1);
            let BakeStatus::Failed(reason) = device.poll_bake(ticket).unwrap() else {
                panic!("panicking program must fail its pass");
            };
            assert!(reason.contains("shader bug"), "{reason}");

            let owner = device.create_owner(None).unwrap();
            assert!(matches!(
                device.copy_to_texture(target, 0, owner),
                Err(BakeError::TargetNotBaked(_))
            ));
            bake_now(&mut device, target);
        }
    }

    /// Worker threads produce the same outputs on the same frames as inline execution.
    #[test]
    fn test_worker_threads_match_inline() {
        let mut inline = CpuBakeDevice::default();
        let mut threaded = CpuBakeDevice::new(CpuBakeSettings {
            worker_threads: 2,
            ..CpuBakeSettings::default()
        });
        assert!(threaded.uses_workers());

        let mut outputs = Vec::new();
        for device in [&mut inline, &mut threaded] {
            let target = device
                .create_render_target("t", 8, &[SurfaceFormat::R32Float])
                .unwrap();
            let ticket = device.dispatch(target, &gradient()).unwrap();
            assert_eq!(device.poll_bake(ticket).unwrap(), BakeStatus::Pending);
            device.begin_frame(1);
            assert_eq!(device.poll_bake(ticket).unwrap(), BakeStatus::Completed);
            let owner = device.create_owner(None).unwrap();
            let tex = device.copy_to_texture(target, 0, owner).unwrap();
            outputs.push(device.texture(tex).unwrap().to_bytes());
        }
        assert_eq!(outputs[0], outputs[1]);
    }
}
