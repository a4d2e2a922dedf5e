//! Quadtree terrain consumer.
//!
//! Each LOD pass compares the vertex density every tile provides with the
//! density the LOD strategy requires, groups over-detailed subtrees and
//! divides under-detailed leaves. The new layout is switched in only once
//! every leaf has its tile data and the minimum LOD switch time has elapsed;
//! until then the previous layout stays displayed.

use std::collections::{HashMap, VecDeque};

use glam::Vec2;
use strata_bake::OwnerId;
use strata_lod::{LodStrategy, TerrainId};
use strata_terrain::{AreaKey, Curvature, TerrainDataSource, TileData, TileDataError};
use tracing::{debug, warn};

/// LOD passes an over-detailed subtree survives before it is grouped.
const LOD_UP_DELAY: u32 = 2;

/// A pass leaving tiles below this fraction of their required density is
/// incomplete, one division will not be enough.
const INCOMPLETE_RATIO: f32 = 0.25;

type NodeId = usize;

struct TileNode {
    area: AreaKey,
    depth: u32,
    parent: Option<NodeId>,
    children: Option<[NodeId; 4]>,
    owner: OwnerId,
    data: Option<TileData>,
    lod_up_delays: u32,
}

/// Counters describing the current tree.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QuadtreeStats {
    pub nodes: usize,
    pub leaves: usize,
    pub max_leaf_depth: u32,
    pub tiles_received: u64,
    pub tiles_failed: u64,
    pub lod_switches: u64,
}

pub struct TerrainQuadtree {
    id: TerrainId,
    curvature: Curvature,
    max_depth: u32,
    nodes: HashMap<NodeId, TileNode>,
    root: NodeId,
    next_id: NodeId,
    processing: bool,
    any_lod_available: bool,
    lod_incomplete: bool,
    last_switch_seconds: Option<f64>,
    /// Grouped subtrees, displayed until the next switch.
    pending_removal: Vec<NodeId>,
    stats: QuadtreeStats,
}

impl TerrainQuadtree {
    pub fn new(
        id: TerrainId,
        area: AreaKey,
        curvature: Curvature,
        max_depth: u32,
        source: &mut dyn TerrainDataSource,
    ) -> Result<Self, TileDataError> {
        let owner = source.device_mut().create_owner(None)?;
        let root = TileNode {
            area,
            depth: 0,
            parent: None,
            children: None,
            owner,
            data: None,
            lod_up_delays: 0,
        };
        Ok(Self {
            id,
            curvature,
            max_depth,
            nodes: HashMap::from([(0, root)]),
            root: 0,
            next_id: 1,
            processing: false,
            any_lod_available: false,
            lod_incomplete: false,
            last_switch_seconds: None,
            pending_removal: Vec::new(),
            stats: QuadtreeStats::default(),
        })
    }

    pub fn id(&self) -> TerrainId {
        self.id
    }

    /// True once a complete layout has been switched in.
    pub fn is_any_lod_available(&self) -> bool {
        self.any_lod_available
    }

    pub fn is_processing_new_lod(&self) -> bool {
        self.processing
    }

    pub fn stats(&self) -> QuadtreeStats {
        let ids = self.reachable();
        let mut stats = self.stats;
        stats.nodes = ids.len();
        stats.leaves = 0;
        stats.max_leaf_depth = 0;
        for node in ids.iter().filter_map(|id| self.nodes.get(id)) {
            if node.children.is_none() {
                stats.leaves += 1;
                stats.max_leaf_depth = stats.max_leaf_depth.max(node.depth);
            }
        }
        stats
    }

    /// Areas of the tiles currently displayed.
    pub fn leaf_areas(&self) -> Vec<AreaKey> {
        self.reachable()
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .filter(|node| node.children.is_none())
            .map(|node| node.area)
            .collect()
    }

    /// Poll tile data, then advance the LOD state machine by one step.
    ///
    /// The data source must already have been updated for this frame.
    pub fn update(
        &mut self,
        now_seconds: f64,
        source: &mut dyn TerrainDataSource,
        lod: &mut dyn LodStrategy,
    ) -> Result<(), TileDataError> {
        self.poll_tiles(source);

        if self.processing {
            if self.is_new_lod_ready(source) && self.is_transition_time_elapsed(now_seconds, source)
            {
                if !self.lod_incomplete && self.any_lod_available {
                    lod.signal_update_completion(self.id);
                }
                self.apply_new_lod(now_seconds, source);
            }
        } else if lod.needs_update(self.id) {
            self.begin_update(source, lod)?;
        }
        Ok(())
    }

    /// Release every tile and owner held by the tree.
    pub fn dispose(mut self, source: &mut dyn TerrainDataSource) {
        let mut roots: Vec<NodeId> = std::mem::take(&mut self.pending_removal);
        roots.push(self.root);
        for id in roots {
            self.remove_subtree(id, source);
        }
    }

    /// Node ids reachable from the root, top-down by layer.
    fn reachable(&self) -> Vec<NodeId> {
        let mut out = vec![self.root];
        let mut i = 0;
        while i < out.len() {
            if let Some(children) = self.nodes.get(&out[i]).and_then(|n| n.children) {
                out.extend(children);
            }
            i += 1;
        }
        out
    }

    fn poll_tiles(&mut self, source: &mut dyn TerrainDataSource) {
        for id in self.reachable() {
            let Some(node) = self.nodes.get_mut(&id) else {
                continue;
            };
            if node.data.is_some() {
                continue;
            }
            match source.try_get_tile_data(&node.area, self.curvature, node.owner) {
                Ok(Some(data)) => {
                    node.data = Some(data);
                    self.stats.tiles_received += 1;
                }
                Ok(None) => {}
                Err(e) => {
                    // The next poll starts a fresh request.
                    warn!(area = %node.area, error = %e, "tile data failed");
                    self.stats.tiles_failed += 1;
                }
            }
        }
    }

    fn is_new_lod_ready(&self, source: &dyn TerrainDataSource) -> bool {
        if source.is_loading() {
            return false;
        }
        self.reachable()
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .all(|node| node.children.is_some() || node.data.is_some())
    }

    fn is_transition_time_elapsed(&self, now_seconds: f64, source: &dyn TerrainDataSource) -> bool {
        if !self.any_lod_available {
            return true;
        }
        self.last_switch_seconds.is_none_or(|last| {
            now_seconds - last > f64::from(source.min_lod_switch_time_seconds())
        })
    }

    /// Height range of a node, borrowed from its closest ancestor with data.
    fn height_range(&self, id: NodeId) -> (f32, f32) {
        let mut cursor = Some(id);
        while let Some(node) = cursor.and_then(|c| self.nodes.get(&c)) {
            if let Some(data) = &node.data {
                return (data.displacement_min, data.displacement_max);
            }
            cursor = node.parent;
        }
        (0.0, 0.0)
    }

    /// Density a tile provides divided by the density it requires. Below one
    /// the tile needs more vertices.
    fn required_tess_ratio(&self, id: NodeId, tessellation: u32, lod: &dyn LodStrategy) -> f32 {
        let Some(node) = self.nodes.get(&id) else {
            return f32::INFINITY;
        };
        let quads = (tessellation * tessellation) as f32;
        let size = node.area.size();
        let tile_density = quads / (size.x * size.y);

        let (min_height, max_height) = self.height_range(id);
        let bounds = node.area.bounds(min_height, max_height);
        let normal = self
            .curvature
            .surface_normal(&node.area, Vec2::splat(0.5))
            .as_vec3();
        let required = lod.required_density(&bounds, normal, min_height, max_height);
        if required <= 0.0 {
            return f32::INFINITY;
        }
        tile_density / required
    }

    fn begin_update(
        &mut self,
        source: &mut dyn TerrainDataSource,
        lod: &dyn LodStrategy,
    ) -> Result<(), TileDataError> {
        self.lod_incomplete = false;
        let tessellation = source.tile_tessellation();
        let mut to_divide: Vec<(f32, NodeId)> = Vec::new();
        let mut queue = VecDeque::from([self.root]);

        while let Some(id) = queue.pop_front() {
            let ratio = self.required_tess_ratio(id, tessellation, lod);
            let Some(node) = self.nodes.get_mut(&id) else {
                continue;
            };
            if ratio >= 1.0 {
                let Some(children) = node.children else {
                    continue;
                };
                if node.lod_up_delays < LOD_UP_DELAY {
                    node.lod_up_delays += 1;
                    self.lod_incomplete = true;
                    queue.extend(children);
                } else {
                    node.lod_up_delays = 0;
                    node.children = None;
                    self.pending_removal.extend(children);
                }
            } else {
                node.lod_up_delays = 0;
                match node.children {
                    Some(children) => queue.extend(children),
                    None if node.depth < self.max_depth => {
                        self.lod_incomplete |= ratio < INCOMPLETE_RATIO;
                        to_divide.push((ratio, id));
                    }
                    None => {}
                }
            }
        }

        // Most under-detailed first.
        to_divide.sort_by(|a, b| a.0.total_cmp(&b.0));
        let budget = if self.any_lod_available {
            lod.max_divisions_per_update() as usize
        } else {
            usize::MAX
        };
        for &(_, id) in to_divide.iter().take(budget) {
            self.divide(id, source)?;
        }
        self.lod_incomplete |= to_divide.len() > budget;
        self.processing = true;

        debug!(
            terrain = %self.id,
            divisions = to_divide.len().min(budget),
            groups = self.pending_removal.len(),
            incomplete = self.lod_incomplete,
            "LOD update started"
        );
        Ok(())
    }

    fn divide(&mut self, id: NodeId, source: &mut dyn TerrainDataSource) -> Result<(), TileDataError> {
        let Some(node) = self.nodes.get(&id) else {
            return Ok(());
        };
        let areas = node.area.subdivide();
        let depth = node.depth + 1;

        let mut children = [0; 4];
        for (slot, area) in children.iter_mut().zip(areas) {
            let owner = source.device_mut().create_owner(None)?;
            let child = self.next_id;
            self.next_id += 1;
            self.nodes.insert(
                child,
                TileNode {
                    area,
                    depth,
                    parent: Some(id),
                    children: None,
                    owner,
                    data: None,
                    lod_up_delays: 0,
                },
            );
            *slot = child;
        }
        if let Some(node) = self.nodes.get_mut(&id) {
            node.children = Some(children);
        }
        Ok(())
    }

    fn apply_new_lod(&mut self, now_seconds: f64, source: &mut dyn TerrainDataSource) {
        for id in std::mem::take(&mut self.pending_removal) {
            self.remove_subtree(id, source);
        }
        self.processing = false;
        self.any_lod_available = true;
        self.last_switch_seconds = Some(now_seconds);
        self.stats.lod_switches += 1;
        debug!(terrain = %self.id, now_seconds, leaves = self.leaf_areas().len(), "LOD switched");
    }

    fn remove_subtree(&mut self, id: NodeId, source: &mut dyn TerrainDataSource) {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.remove(&id) else {
                continue;
            };
            if let Some(children) = node.children {
                stack.extend(children);
            }
            source.delete_tile_data(&node.area);
            // Also drops the textures of a request still in flight, which then
            // fails without anyone polling it.
            if let Err(e) = source.device_mut().dispose_owner(node.owner) {
                warn!(area = %node.area, error = %e, "failed to dispose tile owner");
            }
        }
    }
}
