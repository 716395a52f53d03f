//! Space colonization growth.
//!
//! Branches start at a set of source points (usually the tips under the
//! model) and grow toward a set of attractors (usually the anchor). Every
//! iteration each growing branch end takes one step:
//!
//! 1. Head for the nearest attractor.
//! 2. Bend away from any solid surface closer than the repulsion distance.
//! 3. Perturb the direction by a small random vector.
//! 4. Push the new end out of any solid it collides with; a branch that
//!    cannot be placed stops growing.
//!
//! Branch ends that come close to each other are merged into a single end at
//! their midpoint, so branches converge the way a tree's do. A branch is done
//! once it is within the kill distance of an attractor.
//!
//! Unlike centralized growth, branches interact through merging, so growth
//! is sequential and driven by one random source.

use crate::geometry::Point3F;
use crate::support::branch_geometry::SupportPrimitive;
use crate::support::tree_model_volumes::TreeModelVolumes;
use crate::support::tree_support_settings::TreeSupportSettings;
use crate::support::{SupportError, SupportResult};
use crate::CoordF;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Why a branch end stopped growing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GrowthState {
    Growing,
    /// Reached the attractor with this index.
    Arrived(usize),
    /// Replaced by a newer end or merged into another branch.
    Extended,
    /// No collision-free position was found.
    Blocked,
}

/// A node of the colonization tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ColonizationNode {
    pub position: Point3F,
    pub radius: CoordF,
    /// Nodes this one grew from: none for a source, two after a merge.
    pub predecessors: Vec<usize>,
    /// Steps from the source.
    pub depth: usize,
    /// Length grown from the source (mm); the longest input for a merge.
    pub length: CoordF,
    /// Index of the source the branch started at.
    pub source: usize,
    state: GrowthState,
}

impl ColonizationNode {
    pub fn is_growing(&self) -> bool {
        self.state == GrowthState::Growing
    }

    /// Attractor reached by this node, if any.
    pub fn arrived_at(&self) -> Option<usize> {
        match self.state {
            GrowthState::Arrived(idx) => Some(idx),
            _ => None,
        }
    }
}

/// Counters for one colonization pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColonizationStats {
    pub sources: usize,
    pub attractors: usize,
    /// Attractors reached by at least one branch.
    pub attractors_reached: usize,
    pub nodes: usize,
    pub merges: usize,
    /// Branch ends that could not be placed.
    pub blocked: usize,
    /// Branch ends still growing when the iteration limit was hit.
    pub unfinished: usize,
    pub iterations: usize,
}

/// Grown tree plus its geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct ColonizationTree {
    pub nodes: Vec<ColonizationNode>,
    pub primitives: Vec<SupportPrimitive>,
    pub stats: ColonizationStats,
}

/// Grows branches from sources toward attractors.
#[derive(Debug)]
pub struct SpaceColonizationGrower<'a> {
    settings: &'a TreeSupportSettings,
    volumes: &'a TreeModelVolumes,
    nodes: Vec<ColonizationNode>,
    attractors: Vec<Point3F>,
    reached: Vec<bool>,
    stats: ColonizationStats,
    rng: StdRng,
}

impl<'a> SpaceColonizationGrower<'a> {
    pub fn new(settings: &'a TreeSupportSettings, volumes: &'a TreeModelVolumes) -> Self {
        let rng = match settings.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            settings,
            volumes,
            nodes: Vec::new(),
            attractors: Vec::new(),
            reached: Vec::new(),
            stats: ColonizationStats::default(),
            rng,
        }
    }

    /// Grow from `sources` toward `attractors`.
    pub fn grow(mut self, sources: &[Point3F], attractors: &[Point3F]) -> ColonizationTree {
        self.seed(sources, attractors);
        while self.has_pending_iterations() {
            self.step();
        }
        self.finish()
    }

    /// Like [`Self::grow`], polling `should_cancel` before every iteration.
    pub fn grow_cancellable<F>(
        mut self,
        sources: &[Point3F],
        attractors: &[Point3F],
        mut should_cancel: F,
    ) -> SupportResult<ColonizationTree>
    where
        F: FnMut() -> bool,
    {
        self.seed(sources, attractors);
        while self.has_pending_iterations() {
            if should_cancel() {
                return Err(SupportError::Cancelled {
                    layer: self.stats.iterations,
                });
            }
            self.step();
        }
        Ok(self.finish())
    }

    fn finish(mut self) -> ColonizationTree {
        let unfinished = self.nodes.iter().filter(|n| n.is_growing()).count();
        if unfinished > 0 {
            warn!(
                unfinished,
                iterations = self.stats.iterations,
                "Iteration limit reached with branches still growing"
            );
        }
        self.stats.unfinished = unfinished;
        self.stats.nodes = self.nodes.len();
        self.stats.attractors_reached = self.reached.iter().filter(|r| **r).count();

        let primitives = self.emit();
        debug!(
            nodes = self.stats.nodes,
            merges = self.stats.merges,
            blocked = self.stats.blocked,
            "Space colonization finished"
        );
        ColonizationTree {
            nodes: self.nodes,
            primitives,
            stats: self.stats,
        }
    }

    fn seed(&mut self, sources: &[Point3F], attractors: &[Point3F]) {
        self.attractors = attractors.to_vec();
        self.reached = vec![false; attractors.len()];
        self.stats.sources = sources.len();
        self.stats.attractors = attractors.len();

        let radius = self.settings.min_radius;
        for (source, position) in sources.iter().enumerate() {
            let state = if self.volumes.is_colliding(*position, radius) {
                warn!(source, position = %position, "Source inside a solid, not grown");
                self.stats.blocked += 1;
                GrowthState::Blocked
            } else {
                GrowthState::Growing
            };
            self.nodes.push(ColonizationNode {
                position: *position,
                radius,
                predecessors: Vec::new(),
                depth: 0,
                length: 0.0,
                source,
                state,
            });
        }
    }

    fn has_pending_iterations(&self) -> bool {
        self.stats.iterations < self.settings.config.colonization_max_iterations
            && self.nodes.iter().any(ColonizationNode::is_growing)
    }

    /// One growth iteration followed by a merge pass.
    fn step(&mut self) {
        let growing: Vec<usize> = (0..self.nodes.len())
            .filter(|&id| self.nodes[id].is_growing())
            .collect();
        for id in growing {
            self.grow_node(id);
        }
        self.merge_ends();
        self.stats.iterations += 1;
    }

    fn grow_node(&mut self, id: usize) {
        let settings = self.settings;
        let config = &settings.config;
        let position = self.nodes[id].position;

        let Some((attractor, target)) = self.nearest_attractor(position) else {
            self.nodes[id].state = GrowthState::Blocked;
            self.stats.blocked += 1;
            return;
        };
        let to_target = target - position;
        let distance = to_target.length();
        if distance <= config.colonization_kill_distance {
            self.nodes[id].state = GrowthState::Arrived(attractor);
            self.reached[attractor] = true;
            return;
        }

        let repulsion = self
            .volumes
            .repulsion(position, config.colonization_repulsion_distance);
        let heading = to_target.normalize() + repulsion * config.colonization_repulsion_weight;
        let direction = self.random_direction(heading.normalize(), config.colonization_randomness);

        let step = config.colonization_step.min(distance);
        let length = self.nodes[id].length + step;
        let radius = settings.radius_at_length(length);
        let stepped = position + direction * step;

        match self.volumes.try_avoid(stepped, radius) {
            Some(next) => {
                let source = self.nodes[id].source;
                let depth = self.nodes[id].depth + 1;
                self.nodes[id].state = GrowthState::Extended;
                self.nodes.push(ColonizationNode {
                    position: next,
                    radius,
                    predecessors: vec![id],
                    depth,
                    length,
                    source,
                    state: GrowthState::Growing,
                });
            }
            None => {
                warn!(
                    source = self.nodes[id].source,
                    depth = self.nodes[id].depth,
                    position = %stepped,
                    "No collision-free position, branch stopped"
                );
                self.nodes[id].state = GrowthState::Blocked;
                self.stats.blocked += 1;
            }
        }
    }

    /// Merge growing ends that came close, greedily in node order.
    fn merge_ends(&mut self) {
        let merge_distance = self.settings.config.colonization_merge_distance;
        let growing: Vec<usize> = (0..self.nodes.len())
            .filter(|&id| self.nodes[id].is_growing())
            .collect();
        let mut used = vec![false; growing.len()];

        for i in 0..growing.len() {
            if used[i] {
                continue;
            }
            for j in (i + 1)..growing.len() {
                if used[j] {
                    continue;
                }
                let (a, b) = (growing[i], growing[j]);
                if self.nodes[a].position.distance(&self.nodes[b].position) >= merge_distance {
                    continue;
                }
                if self.merge_pair(a, b) {
                    used[i] = true;
                    used[j] = true;
                    break;
                }
            }
        }
    }

    /// Replace ends `a` and `b` by one end at their midpoint.
    fn merge_pair(&mut self, a: usize, b: usize) -> bool {
        let (na, nb) = (&self.nodes[a], &self.nodes[b]);
        let position = na.position.midpoint(&nb.position);
        let length = na.length.max(nb.length);
        let radius = self.settings.radius_at_length(length);
        if !self.volumes.is_valid_position(position, radius) {
            return false;
        }

        let merged = ColonizationNode {
            position,
            radius,
            predecessors: vec![a, b],
            depth: na.depth.max(nb.depth) + 1,
            length,
            source: na.source.min(nb.source),
            state: GrowthState::Growing,
        };
        self.nodes[a].state = GrowthState::Extended;
        self.nodes[b].state = GrowthState::Extended;
        self.nodes.push(merged);
        self.stats.merges += 1;
        true
    }

    fn nearest_attractor(&self, position: Point3F) -> Option<(usize, Point3F)> {
        self.attractors
            .iter()
            .copied()
            .enumerate()
            .min_by(|a, b| position.distance(&a.1).total_cmp(&position.distance(&b.1)))
    }

    /// `heading` perturbed by a random vector with components in
    /// `[-randomness / 2, randomness / 2]`.
    fn random_direction(&mut self, heading: Point3F, randomness: CoordF) -> Point3F {
        let mut jitter = || {
            let unit: CoordF = self.rng.gen_range(-0.5..=0.5);
            unit * randomness
        };
        let offset = Point3F::new(jitter(), jitter(), jitter());
        let direction = (heading + offset).normalize();
        if direction.is_zero() {
            heading
        } else {
            direction
        }
    }

    /// A trunk per node, a connector per predecessor link and a closing
    /// connector from every arrived end to its attractor.
    fn emit(&self) -> Vec<SupportPrimitive> {
        let min_length = self.settings.config.min_connector_length;
        let height = self.settings.layer_height;

        let mut primitives = Vec::new();
        for node in &self.nodes {
            primitives.push(SupportPrimitive::trunk(
                node.position,
                node.radius,
                height,
                node.source,
                node.depth,
            ));
            for &pred in &node.predecessors {
                let from = &self.nodes[pred];
                primitives.extend(SupportPrimitive::connector(
                    from.position,
                    node.position,
                    from.radius,
                    node.radius,
                    min_length,
                    node.source,
                    node.depth,
                ));
            }
            if let Some(attractor) = node.arrived_at() {
                primitives.extend(SupportPrimitive::connector(
                    node.position,
                    self.attractors[attractor],
                    node.radius,
                    node.radius,
                    min_length,
                    node.source,
                    node.depth + 1,
                ));
            }
        }
        primitives
    }
}
