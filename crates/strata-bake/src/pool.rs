//! Baker pool for reusing render targets across bake requests.
//!
//! Creating a render target per request would allocate fresh surface memory
//! for every tile. The [`BakerPool`] keeps released bakers in FIFO free lists
//! keyed by their exact resolution and format set, and hands them out again to
//! the next request with the same signature.

use std::collections::{HashMap, VecDeque};

use crate::{
    BakeDevice, BakeError, BakeMaterial, BakeStatus, BakeTicket, BakerId, RenderTargetId,
    SurfaceFormat,
};

/// The exact resolution and ordered output formats a baker was created with.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BakerSignature {
    pub resolution: u32,
    pub formats: Vec<SurfaceFormat>,
}

/// Exclusive use of a pooled baker.
///
/// Leases are not `Clone`; returning one to the pool moves it back.
#[derive(Debug)]
pub struct BakerLease {
    id: BakerId,
    label: String,
    signature: BakerSignature,
    target: RenderTargetId,
    material: Option<BakeMaterial>,
    ticket: Option<BakeTicket>,
}

impl BakerLease {
    pub fn id(&self) -> BakerId {
        self.id
    }

    /// Purpose label given by the most recent acquirer.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn signature(&self) -> &BakerSignature {
        &self.signature
    }

    pub fn resolution(&self) -> u32 {
        self.signature.resolution
    }

    pub fn formats(&self) -> &[SurfaceFormat] {
        &self.signature.formats
    }

    pub fn target(&self) -> RenderTargetId {
        self.target
    }

    pub fn material(&self) -> Option<&BakeMaterial> {
        self.material.as_ref()
    }

    /// Ticket of the pass currently in flight, if any.
    pub fn pending_ticket(&self) -> Option<BakeTicket> {
        self.ticket
    }

    /// Assign `material` and dispatch it into this baker's target.
    pub fn bake<D: BakeDevice + ?Sized>(
        &mut self,
        device: &mut D,
        material: BakeMaterial,
    ) -> Result<BakeTicket, BakeError> {
        if let Some(previous) = self.ticket.take() {
            device.cancel_bake(previous);
        }
        let ticket = device.dispatch(self.target, &material)?;
        self.material = Some(material);
        self.ticket = Some(ticket);
        Ok(ticket)
    }

    /// Poll the pass in flight. The ticket is dropped once the pass completes
    /// or fails.
    pub fn poll<D: BakeDevice + ?Sized>(&mut self, device: &mut D) -> Result<BakeStatus, BakeError> {
        let ticket = self.ticket.ok_or(BakeError::NoPendingBake(self.id))?;
        let status = device.poll_bake(ticket)?;
        if status != BakeStatus::Pending {
            self.ticket = None;
        }
        Ok(status)
    }
}

/// Counters describing pool usage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BakerPoolStats {
    /// Bakers ever created (leased + free).
    pub created: usize,
    /// Bakers currently leased out.
    pub in_use: usize,
    /// Bakers waiting in free lists.
    pub free: usize,
}

/// Reusable bakers bucketed by [`BakerSignature`].
#[derive(Default)]
pub struct BakerPool {
    free: HashMap<BakerSignature, VecDeque<BakerLease>>,
    next_id: u64,
    created: usize,
    in_use: usize,
}

impl BakerPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lease a baker with exactly this resolution and format list.
    ///
    /// Returns the oldest free baker with a matching signature, or creates a
    /// new render target on `device`.
    pub fn acquire<D: BakeDevice + ?Sized>(
        &mut self,
        device: &mut D,
        label: &str,
        resolution: u32,
        formats: &[SurfaceFormat],
    ) -> Result<BakerLease, BakeError> {
        let signature = BakerSignature {
            resolution,
            formats: formats.to_vec(),
        };

        if let Some(mut lease) = self.free.get_mut(&signature).and_then(VecDeque::pop_front) {
            lease.label = label.to_string();
            self.in_use += 1;
            return Ok(lease);
        }

        let target = device.create_render_target(label, resolution, formats)?;
        let id = BakerId(self.next_id);
        self.next_id += 1;
        self.created += 1;
        self.in_use += 1;
        tracing::debug!(baker = %id, %target, label, resolution, "created baker");

        Ok(BakerLease {
            id,
            label: label.to_string(),
            signature,
            target,
            material: None,
            ticket: None,
        })
    }

    /// Return a lease to its free list.
    ///
    /// Any pass still in flight is cancelled and the material is cleared, so a
    /// late completion can never land in a baker leased to someone else.
    pub fn release<D: BakeDevice + ?Sized>(&mut self, device: &mut D, mut lease: BakerLease) {
        if let Some(ticket) = lease.ticket.take() {
            device.cancel_bake(ticket);
        }
        lease.material = None;
        self.in_use = self.in_use.saturating_sub(1);
        self.free
            .entry(lease.signature.clone())
            .or_default()
            .push_back(lease);
    }

    pub fn stats(&self) -> BakerPoolStats {
        BakerPoolStats {
            created: self.created,
            in_use: self.in_use,
            free: self.free.values().map(VecDeque::len).sum(),
        }
    }
}
