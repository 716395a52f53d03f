//! Tree Support 3D - Layer-by-layer branch propagation.
//!
//! This module implements the core tree support algorithm that grows branches
//! from overhang tips down to the build surface while avoiding the model.
//!
//! # Algorithm Overview
//!
//! 1. **Insert Tips**: every accepted tip goes into the bucket of its layer
//! 2. **Create Layer Pathing**: from the highest occupied layer down to 1,
//!    every node gets one child in the layer below, at the first of nine
//!    lateral candidates that is collision-free and inside the print area
//! 3. **Merge Branches**: after each layer, nodes in the layer below whose
//!    influence circles overlap enough are combined pairwise
//!
//! Nodes live in an arena owned by the [`LayerTable`]; links between them are
//! [`NodeId`]s. Nodes merged away stay in the arena flagged `deleted` but are
//! removed from their bucket.

use crate::geometry::Point3F;
use crate::support::tip_generator::SupportTip;
use crate::support::tree_model_volumes::TreeModelVolumes;
use crate::support::tree_support_settings::{
    NodeId, SupportElement, SupportElementState, TreeSupportSettings,
};
use crate::support::{SupportError, SupportResult};
use crate::CoordF;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Merge when the planar distance is below this fraction of the summed influence radii.
pub const MERGE_OVERLAP_FACTOR: CoordF = 0.8;

/// Node arena plus one bucket of node ids per layer.
#[derive(Debug, Clone, Default)]
pub struct LayerTable {
    nodes: Vec<SupportElement>,
    buckets: Vec<Vec<NodeId>>,
}

impl LayerTable {
    /// Create a table with `num_layers` empty buckets.
    pub fn new(num_layers: usize) -> Self {
        Self {
            nodes: Vec::new(),
            buckets: vec![Vec::new(); num_layers],
        }
    }

    /// Grow the table to hold at least `num_layers` buckets.
    pub fn ensure_layers(&mut self, num_layers: usize) {
        if self.buckets.len() < num_layers {
            self.buckets.resize(num_layers, Vec::new());
        }
    }

    /// Number of layers.
    pub fn num_layers(&self) -> usize {
        self.buckets.len()
    }

    /// Add an element to the arena and to the bucket of its layer.
    pub fn push(&mut self, element: SupportElement) -> NodeId {
        let id = self.insert(element);
        let layer = self.nodes[id.0].state.layer_idx;
        self.ensure_layers(layer + 1);
        self.buckets[layer].push(id);
        id
    }

    /// Add an element to the arena only.
    fn insert(&mut self, element: SupportElement) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(element);
        id
    }

    /// Get an element by id.
    ///
    /// Ids are only ever handed out by this table, so they are always in range.
    #[inline]
    pub fn get(&self, id: NodeId) -> &SupportElement {
        &self.nodes[id.0]
    }

    #[inline]
    fn get_mut(&mut self, id: NodeId) -> &mut SupportElement {
        &mut self.nodes[id.0]
    }

    /// Node ids currently in a layer, in bucket order.
    pub fn bucket(&self, layer: usize) -> &[NodeId] {
        self.buckets.get(layer).map(Vec::as_slice).unwrap_or(&[])
    }

    fn set_bucket(&mut self, layer: usize, ids: Vec<NodeId>) {
        self.buckets[layer] = ids;
    }

    /// Highest layer holding at least one node.
    pub fn highest_occupied_layer(&self) -> Option<usize> {
        self.buckets.iter().rposition(|bucket| !bucket.is_empty())
    }

    /// All live nodes, bottom layer first, in bucket order.
    pub fn iter_live(&self) -> impl Iterator<Item = (NodeId, &SupportElement)> + '_ {
        self.buckets
            .iter()
            .flat_map(|bucket| bucket.iter())
            .map(move |&id| (id, self.get(id)))
    }

    /// Number of live nodes.
    pub fn live_count(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    /// Every node ever created, including merged-away ones.
    pub fn arena(&self) -> &[SupportElement] {
        &self.nodes
    }
}

/// Counters collected during propagation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeSupportStats {
    /// Tips inserted into the table.
    pub tips: usize,
    /// Tips dropped because they started inside a solid.
    pub rejected_tips: usize,
    /// Live nodes after generation.
    pub nodes: usize,
    /// Pairwise merges performed.
    pub merges: usize,
    /// Nodes with no valid propagation candidate.
    pub abandoned: usize,
}

/// Layer-by-layer tree support generator.
#[derive(Debug)]
pub struct TreeSupport3D {
    settings: TreeSupportSettings,
    volumes: TreeModelVolumes,
    table: LayerTable,
    /// Next layer to propagate from.
    next_layer: usize,
    stats: TreeSupportStats,
}

impl TreeSupport3D {
    /// Create a new generator with an empty layer table.
    pub fn new(settings: TreeSupportSettings, volumes: TreeModelVolumes) -> Self {
        Self {
            settings,
            volumes,
            table: LayerTable::default(),
            next_layer: 0,
            stats: TreeSupportStats::default(),
        }
    }

    /// Insert tips into the buckets of their layers.
    ///
    /// Tips that already collide with a solid at tip radius are skipped.
    pub fn insert_tips(&mut self, tips: &[SupportTip]) {
        for tip in tips {
            if self
                .volumes
                .is_colliding(tip.position, self.settings.min_radius)
            {
                debug!(
                    layer = tip.layer_idx,
                    position = %tip.position,
                    "Tip starts inside a solid, skipped"
                );
                self.stats.rejected_tips += 1;
                continue;
            }
            let state =
                SupportElementState::new_tip(tip.layer_idx, tip.position, self.stats.tips);
            self.table.push(SupportElement::new(state));
            self.stats.tips += 1;
        }
        self.next_layer = self.table.highest_occupied_layer().unwrap_or(0);
        self.stats.nodes = self.table.live_count();
    }

    /// Propagate every layer down to the build surface.
    pub fn generate(&mut self) {
        while self.step_layer() {}
    }

    /// Like [`Self::generate`], checking `should_cancel` once before each layer.
    pub fn generate_cancellable<F>(&mut self, mut should_cancel: F) -> SupportResult<()>
    where
        F: FnMut() -> bool,
    {
        while self.has_pending_layers() {
            if should_cancel() {
                return Err(SupportError::Cancelled {
                    layer: self.next_layer,
                });
            }
            self.step_layer();
        }
        Ok(())
    }

    /// Whether any layer still has to be propagated.
    #[inline]
    pub fn has_pending_layers(&self) -> bool {
        self.next_layer > 0
    }

    /// Propagate one layer into the layer below and merge there.
    ///
    /// Returns whether more layers remain.
    pub fn step_layer(&mut self) -> bool {
        if !self.has_pending_layers() {
            return false;
        }
        let layer = self.next_layer;
        let target_layer = layer - 1;

        let current: Vec<NodeId> = self.table.bucket(layer).to_vec();
        for &id in &current {
            self.propagate_element(id, target_layer);
        }

        let before_merge = self.table.bucket(target_layer).len();
        if before_merge > 1 {
            self.merge_influence_areas(target_layer);
        }
        debug!(
            layer,
            nodes = current.len(),
            below_before_merge = before_merge,
            below_after_merge = self.table.bucket(target_layer).len(),
            "Processed layer"
        );

        self.next_layer = target_layer;
        self.stats.nodes = self.table.live_count();
        self.has_pending_layers()
    }

    /// Create one child of `id` in `target_layer`, at the first valid candidate.
    fn propagate_element(&mut self, id: NodeId, target_layer: usize) -> Option<NodeId> {
        let state = self.table.get(id).state.clone();
        let child_radius = self.settings.get_radius(state.distance_to_tip + 1);
        let z = self.settings.get_actual_z(target_layer);

        for (dx, dy) in self.settings.move_candidates(state.distance_to_tip) {
            let candidate = state.position.with_z(z) + Point3F::new(dx, dy, 0.0);
            if !self.volumes.is_valid_position(candidate, child_radius) {
                continue;
            }
            let child_state = state.propagate_down(candidate, dx.hypot(dy));
            let child = self.table.push(SupportElement::with_parent(child_state, id));
            self.table.get_mut(id).children.push(child);
            return Some(child);
        }

        warn!(
            layer = state.layer_idx,
            distance_to_tip = state.distance_to_tip,
            position = %state.position,
            "No valid position below, branch abandoned"
        );
        self.table.get_mut(id).state.bits.lost = true;
        self.stats.abandoned += 1;
        None
    }

    /// Merge overlapping nodes of a layer, pairwise and greedily.
    fn merge_influence_areas(&mut self, layer: usize) {
        let elements: Vec<NodeId> = self.table.bucket(layer).to_vec();
        let mut used = vec![false; elements.len()];
        let mut merged = Vec::with_capacity(elements.len());

        for i in 0..elements.len() {
            if used[i] {
                continue;
            }
            used[i] = true;

            let mut result = elements[i];
            for j in (i + 1)..elements.len() {
                if used[j] || !self.should_merge(elements[i], elements[j]) {
                    continue;
                }
                if let Some(combined) = self.merge_elements(elements[i], elements[j]) {
                    used[j] = true;
                    result = combined;
                    break;
                }
            }
            merged.push(result);
        }

        self.table.set_bucket(layer, merged);
    }

    /// Whether two nodes' influence circles overlap enough to merge.
    fn should_merge(&self, a: NodeId, b: NodeId) -> bool {
        let a = &self.table.get(a).state;
        let b = &self.table.get(b).state;
        let distance = a.position.planar_distance(&b.position);
        let influence =
            a.get_influence_radius(&self.settings) + b.get_influence_radius(&self.settings);
        distance < influence * MERGE_OVERLAP_FACTOR
    }

    /// Replace two nodes by one at their midpoint.
    ///
    /// Returns `None` when the midpoint would collide with a solid.
    fn merge_elements(&mut self, a: NodeId, b: NodeId) -> Option<NodeId> {
        let elem_a = self.table.get(a).clone();
        let elem_b = self.table.get(b).clone();

        let position = elem_a.state.position.midpoint(&elem_b.state.position);
        let distance_to_tip = elem_a
            .state
            .distance_to_tip
            .min(elem_b.state.distance_to_tip);
        if self
            .volumes
            .is_colliding(position, self.settings.get_radius(distance_to_tip))
        {
            debug!(%position, "Merge midpoint collides, kept apart");
            return None;
        }

        // The thinner node keeps the primary ancestry.
        let (primary, secondary) = if elem_b.state.distance_to_tip < elem_a.state.distance_to_tip {
            (&elem_b, &elem_a)
        } else {
            (&elem_a, &elem_b)
        };

        let mut state = primary.state.clone();
        state.position = position;
        state.distance_to_tip = distance_to_tip;
        state.bits.to_buildplate = elem_a.state.bits.to_buildplate && elem_b.state.bits.to_buildplate;
        state.bits.to_model_gracious =
            elem_a.state.bits.to_model_gracious && elem_b.state.bits.to_model_gracious;

        let mut merged_parents = primary.merged_parents.clone();
        merged_parents.extend(secondary.parents());

        let mut children = elem_a.children.clone();
        children.extend(elem_b.children.iter().copied());

        let merged = self.table.insert(SupportElement {
            state,
            parent: primary.parent,
            merged_parents,
            children,
        });

        for original in [a, b] {
            self.table.get_mut(original).state.bits.deleted = true;
        }
        for parent in elem_a.parents().chain(elem_b.parents()) {
            let links = &mut self.table.get_mut(parent).children;
            links.retain(|&c| c != a && c != b);
            if !links.contains(&merged) {
                links.push(merged);
            }
        }

        self.stats.merges += 1;
        Some(merged)
    }

    /// The layer table.
    pub fn layer_table(&self) -> &LayerTable {
        &self.table
    }

    /// Consume the generator, returning its layer table and statistics.
    pub fn into_parts(self) -> (LayerTable, TreeSupportStats) {
        (self.table, self.stats)
    }

    /// Statistics so far.
    pub fn stats(&self) -> TreeSupportStats {
        self.stats
    }

    /// The settings in use.
    pub fn settings(&self) -> &TreeSupportSettings {
        &self.settings
    }

    /// The collision oracle in use.
    pub fn volumes(&self) -> &TreeModelVolumes {
        &self.volumes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BoundingBox3F;
    use crate::support::overhang::{OverhangKind, OverhangSample};
    use crate::support::target::Anchor;

    fn tip_at(x: f64, y: f64, layer_idx: usize, settings: &TreeSupportSettings) -> SupportTip {
        let position = Point3F::new(x, y, settings.get_actual_z(layer_idx));
        SupportTip {
            position,
            layer_idx,
            sample: OverhangSample {
                position,
                normal: Point3F::down(),
                solid: 0,
                kind: OverhangKind::FloatingBottom,
            },
        }
    }

    fn engine(proxies: Vec<BoundingBox3F>) -> TreeSupport3D {
        let settings = TreeSupportSettings::default();
        let volumes = TreeModelVolumes::from_bounds(proxies, &Anchor::default(), &settings);
        TreeSupport3D::new(settings, volumes)
    }

    fn assert_topology(table: &LayerTable) {
        for (id, element) in table.iter_live() {
            if let Some(parent) = element.parent {
                let parent = table.get(parent);
                assert_eq!(element.state.layer_idx + 1, parent.state.layer_idx, "{id}");
                assert_eq!(
                    element.state.distance_to_tip,
                    parent.state.distance_to_tip + 1,
                    "{id}"
                );
            }
        }
    }

    #[test]
    fn test_layer_table_push_and_bucket() {
        let mut table = LayerTable::new(2);
        let state = SupportElementState::new_tip(4, Point3F::zero(), 0);
        let id = table.push(SupportElement::new(state));

        assert_eq!(table.num_layers(), 5);
        assert_eq!(table.bucket(4), &[id]);
        assert_eq!(table.highest_occupied_layer(), Some(4));
        assert_eq!(table.live_count(), 1);
        assert!(table.bucket(99).is_empty());
    }

    #[test]
    fn test_single_tip_grows_straight_down() {
        let mut support = engine(Vec::new());
        let tip = tip_at(0.0, 0.0, 5, support.settings());
        support.insert_tips(&[tip]);
        support.generate();

        let table = support.layer_table();
        assert_eq!(table.live_count(), 6);
        for layer in 0..=5 {
            let bucket = table.bucket(layer);
            assert_eq!(bucket.len(), 1);
            let element = table.get(bucket[0]);
            assert_eq!(element.state.distance_to_tip, 5 - layer);
            assert!(element.state.position.x.abs() < 1e-12);
            assert!(element.state.last_move_distance.abs() < 1e-12);
        }
        assert_topology(table);
    }

    #[test]
    fn test_tip_on_layer_zero_stays_single() {
        let mut support = engine(Vec::new());
        let tip = tip_at(0.0, 0.0, 0, support.settings());
        support.insert_tips(&[tip]);
        assert!(!support.has_pending_layers());
        support.generate();

        assert_eq!(support.layer_table().live_count(), 1);
        assert_eq!(support.stats().tips, 1);
    }

    #[test]
    fn test_propagation_moves_around_obstacle() {
        // Block directly below the tip, starting 3 layers down.
        let block = BoundingBox3F::from_points_minmax(
            Point3F::new(-1.0, -1.0, 0.0),
            Point3F::new(1.0, 1.0, 1.0),
        );
        let mut support = engine(vec![block]);
        let tip = tip_at(0.0, 0.0, 10, support.settings());
        support.insert_tips(&[tip]);
        support.generate();

        let table = support.layer_table();
        for (_, element) in table.iter_live() {
            let r = element.get_radius(support.settings());
            assert!(!support.volumes().is_colliding(element.state.position, r));
        }
        let moved = table
            .iter_live()
            .any(|(_, e)| e.state.last_move_distance > 0.0);
        assert!(moved);
        assert_topology(table);
    }

    #[test]
    fn test_close_siblings_merge_into_midpoint() {
        let mut support = engine(Vec::new());
        let a = tip_at(-0.5, 0.0, 1, support.settings());
        let b = tip_at(0.5, 0.0, 1, support.settings());
        support.insert_tips(&[a, b]);
        assert_eq!(support.layer_table().bucket(1).len(), 2);

        support.step_layer();

        let table = support.layer_table();
        let below = table.bucket(0);
        assert_eq!(below.len(), 1);
        let merged = table.get(below[0]);
        assert!(merged.state.position.x.abs() < 1e-12);
        assert_eq!(merged.state.distance_to_tip, 1);
        assert!(merged.state.bits.to_buildplate);
        assert_eq!(merged.parents().count(), 2);
        assert_eq!(support.stats().merges, 1);

        // Both parents now point at the merged node.
        for parent in merged.parents() {
            assert_eq!(table.get(parent).children, vec![below[0]]);
        }
        assert_topology(table);
    }

    #[test]
    fn test_far_siblings_do_not_merge() {
        let mut support = engine(Vec::new());
        let a = tip_at(-5.0, 0.0, 1, support.settings());
        let b = tip_at(5.0, 0.0, 1, support.settings());
        support.insert_tips(&[a, b]);
        support.step_layer();

        assert_eq!(support.layer_table().bucket(0).len(), 2);
        assert_eq!(support.stats().merges, 0);
    }

    #[test]
    fn test_merge_keeps_thinner_ancestry() {
        let mut support = engine(Vec::new());
        // a grows for two layers, b is a fresh tip one layer down.
        let a = tip_at(0.3, 0.0, 2, support.settings());
        let b = tip_at(-0.3, 0.0, 1, support.settings());
        support.insert_tips(&[a, b]);
        support.step_layer();

        let table = support.layer_table();
        let bucket = table.bucket(1);
        assert_eq!(bucket.len(), 1);
        let merged = table.get(bucket[0]);
        assert_eq!(merged.state.distance_to_tip, 0);
        assert!(merged.parent.is_none());
        assert_eq!(merged.merged_parents.len(), 1);
        assert_topology(table);
    }

    #[test]
    fn test_merge_skipped_when_midpoint_collides() {
        let pillar = BoundingBox3F::from_points_minmax(
            Point3F::new(-0.2, -0.2, 0.0),
            Point3F::new(0.2, 0.2, 10.0),
        );
        let mut support = engine(vec![pillar]);
        let a = tip_at(-0.8, 0.0, 2, support.settings());
        let b = tip_at(0.8, 0.0, 2, support.settings());
        support.insert_tips(&[a, b]);
        support.step_layer();

        assert_eq!(support.layer_table().bucket(1).len(), 2);
        assert_eq!(support.stats().merges, 0);
    }

    #[test]
    fn test_abandoned_branch_is_counted() {
        // Tip sits right above a floor-wide slab: nothing below is valid.
        let slab = BoundingBox3F::from_points_minmax(
            Point3F::new(-30.0, -30.0, 0.0),
            Point3F::new(30.0, 30.0, 1.0),
        );
        let mut support = engine(vec![slab]);
        let tip = tip_at(0.0, 0.0, 8, support.settings());
        support.insert_tips(&[tip]);
        support.generate();

        let stats = support.stats();
        assert_eq!(stats.abandoned, 1);
        assert!(support
            .layer_table()
            .iter_live()
            .any(|(_, e)| e.state.bits.lost));
    }

    #[test]
    fn test_colliding_tip_rejected() {
        let block = BoundingBox3F::from_points_minmax(
            Point3F::new(-1.0, -1.0, 0.0),
            Point3F::new(1.0, 1.0, 5.0),
        );
        let mut support = engine(vec![block]);
        let tip = tip_at(0.0, 0.0, 10, support.settings());
        support.insert_tips(&[tip]);

        assert_eq!(support.stats().tips, 0);
        assert_eq!(support.stats().rejected_tips, 1);
        assert_eq!(support.layer_table().live_count(), 0);
    }

    #[test]
    fn test_generate_cancellable() {
        let mut support = engine(Vec::new());
        let tip = tip_at(0.0, 0.0, 10, support.settings());
        support.insert_tips(&[tip]);

        let mut calls = 0;
        let result = support.generate_cancellable(|| {
            calls += 1;
            calls > 3
        });

        assert!(matches!(result, Err(SupportError::Cancelled { layer: 7 })));
        assert_eq!(support.layer_table().live_count(), 4);
    }
}
