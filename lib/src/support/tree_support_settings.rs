//! Tree Support Settings - Derived settings and support element state.
//!
//! This module turns the user-facing [`TreeSupportConfig`] into the working
//! quantities the growth engine needs (radians, radii, per-layer taper) and
//! defines the support element (tree node) stored in the layer table.
//!
//! # Overview
//!
//! Each support element tracks:
//! - Its position and layer index
//! - Distance to the tip it grew from, which governs its radius
//! - Whether the branch is headed for the build plate or may rest on the model
//! - Non-owning links to its parent (toward the tip) and children (toward the anchor)

use crate::config::TreeSupportConfig;
use crate::geometry::Point3F;
use crate::CoordF;
use std::fmt;

/// Lateral scale applied to the diagonal movement candidates.
pub const DIAGONAL_MOVE_FACTOR: CoordF = 0.7;

/// Main tree support settings derived from the configuration.
#[derive(Debug, Clone)]
pub struct TreeSupportSettings {
    /// Vertical growth step (mm).
    pub layer_height: CoordF,
    /// Branch radius at the tip (mm).
    pub min_radius: CoordF,
    /// Maximum trunk radius (mm).
    pub branch_radius: CoordF,
    /// Radius growth per millimetre of branch length, `tan(branch_diameter_angle)`.
    pub taper_slope: CoordF,
    /// Radius growth per layer descended.
    pub branch_radius_increase_per_layer: CoordF,
    /// Overhang angle in radians.
    pub support_angle: CoordF,
    /// Maximum lateral move per layer.
    pub maximum_move_distance: CoordF,
    /// Maximum lateral move per layer within the tip layers.
    pub maximum_move_distance_slow: CoordF,
    /// Number of layers below a tip that move slowly.
    pub tip_layers: usize,
    /// Horizontal clearance to the model.
    pub xy_distance: CoordF,
    /// Vertical clearance to the model.
    pub z_distance: CoordF,
    /// Z of layer 0 (the build surface).
    pub build_surface_z: CoordF,
    /// Original configuration.
    pub config: TreeSupportConfig,
}

impl TreeSupportSettings {
    /// Create settings from a (validated) configuration.
    pub fn new(config: TreeSupportConfig) -> Self {
        let taper_slope = config.branch_diameter_angle.to_radians().tan();

        Self {
            layer_height: config.layer_height,
            min_radius: config.tip_radius(),
            branch_radius: config.branch_radius,
            taper_slope,
            branch_radius_increase_per_layer: config.layer_height * taper_slope,
            support_angle: config.support_angle.to_radians(),
            maximum_move_distance: config.maximum_move_distance,
            maximum_move_distance_slow: config.maximum_move_distance_slow,
            tip_layers: config.tip_layers,
            xy_distance: config.support_xy_distance,
            z_distance: config.support_z_distance,
            build_surface_z: 0.0,
            config,
        }
    }

    /// Place layer 0 at the given height.
    pub fn with_build_surface(mut self, z: CoordF) -> Self {
        self.build_surface_z = z;
        self
    }

    /// Radius of a node `effective_dtt` layers below its tip.
    pub fn get_radius(&self, effective_dtt: usize) -> CoordF {
        self.branch_radius.min(
            self.min_radius + self.branch_radius_increase_per_layer * effective_dtt as CoordF,
        )
    }

    /// Radius of a branch `length` millimetres away from its tip.
    pub fn radius_at_length(&self, length: CoordF) -> CoordF {
        let tapered = self.min_radius + length.max(0.0) * self.taper_slope;
        self.min_radius.max(self.branch_radius.min(tapered))
    }

    /// Branch radius plus the avoidance buffer.
    #[inline]
    pub fn influence_radius(&self, effective_dtt: usize) -> CoordF {
        self.get_radius(effective_dtt) + self.xy_distance
    }

    /// Maximum lateral move for a node at the given distance to tip.
    #[inline]
    pub fn max_move(&self, distance_to_tip: usize) -> CoordF {
        if distance_to_tip < self.tip_layers {
            self.maximum_move_distance_slow
        } else {
            self.maximum_move_distance
        }
    }

    /// The nine lateral candidates tried when stepping a node down, in
    /// priority order: stay, the four axis moves, then the four diagonals.
    pub fn move_candidates(&self, distance_to_tip: usize) -> [(CoordF, CoordF); 9] {
        let m = self.max_move(distance_to_tip);
        let d = m * DIAGONAL_MOVE_FACTOR;
        [
            (0.0, 0.0),
            (m, 0.0),
            (-m, 0.0),
            (0.0, m),
            (0.0, -m),
            (d, d),
            (-d, d),
            (d, -d),
            (-d, -d),
        ]
    }

    /// Get Z height for a layer index.
    #[inline]
    pub fn get_actual_z(&self, layer_idx: usize) -> CoordF {
        self.build_surface_z + layer_idx as CoordF * self.layer_height
    }

    /// Nearest layer index for a height; heights below the build surface map to layer 0.
    pub fn layer_for_z(&self, z: CoordF) -> usize {
        let layer = ((z - self.build_surface_z) / self.layer_height).round();
        if layer > 0.0 {
            layer as usize
        } else {
            0
        }
    }
}

impl Default for TreeSupportSettings {
    fn default() -> Self {
        Self::new(TreeSupportConfig::default())
    }
}

/// Index of a support element in the layer table's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Bit flags for support element state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SupportElementStateBits {
    /// Element tries to reach the build plate.
    pub to_buildplate: bool,
    /// Branch can rest on flat surface (build plate or model).
    pub to_model_gracious: bool,
    /// No propagation candidate was valid; the branch ends here.
    pub lost: bool,
    /// Merged into another element.
    pub deleted: bool,
}

/// State of a support element during tree generation.
#[derive(Debug, Clone, PartialEq)]
pub struct SupportElementState {
    /// Bit flags.
    pub bits: SupportElementStateBits,
    /// Current layer index.
    pub layer_idx: usize,
    /// Layers between this element and the tip it grew from.
    pub distance_to_tip: usize,
    /// Centre of the element.
    pub position: Point3F,
    /// Lateral distance moved when this element was created.
    pub last_move_distance: CoordF,
    /// Index of the tip the branch started at.
    pub tip_index: usize,
}

impl SupportElementState {
    /// State of a fresh tip.
    pub fn new_tip(layer_idx: usize, position: Point3F, tip_index: usize) -> Self {
        Self {
            bits: SupportElementStateBits {
                to_buildplate: true,
                to_model_gracious: false,
                ..Default::default()
            },
            layer_idx,
            distance_to_tip: 0,
            position,
            last_move_distance: 0.0,
            tip_index,
        }
    }

    /// Propagate state down one layer, to `position`.
    pub fn propagate_down(&self, position: Point3F, move_distance: CoordF) -> Self {
        Self {
            bits: SupportElementStateBits {
                to_buildplate: self.bits.to_buildplate,
                to_model_gracious: self.bits.to_model_gracious,
                ..Default::default()
            },
            layer_idx: self.layer_idx.saturating_sub(1),
            distance_to_tip: self.distance_to_tip + 1,
            position,
            last_move_distance: move_distance,
            tip_index: self.tip_index,
        }
    }

    /// Get the radius this element will have.
    #[inline]
    pub fn get_radius(&self, settings: &TreeSupportSettings) -> CoordF {
        settings.get_radius(self.distance_to_tip)
    }

    /// Radius plus avoidance buffer, used to decide merges.
    #[inline]
    pub fn get_influence_radius(&self, settings: &TreeSupportSettings) -> CoordF {
        settings.influence_radius(self.distance_to_tip)
    }
}

/// A support element (tree node) with its links.
///
/// `parent` points up toward the tip (layer + 1); `children` point down
/// toward the anchor. `merged_parents` holds the parents of elements that
/// were merged into this one and are connected by extra connectors only.
#[derive(Debug, Clone, PartialEq)]
pub struct SupportElement {
    /// Element state.
    pub state: SupportElementState,
    /// Primary parent in the layer above.
    pub parent: Option<NodeId>,
    /// Parents inherited through merging.
    pub merged_parents: Vec<NodeId>,
    /// Elements in the layer below grown from this one.
    pub children: Vec<NodeId>,
}

impl SupportElement {
    /// Create a new element without links.
    pub fn new(state: SupportElementState) -> Self {
        Self {
            state,
            parent: None,
            merged_parents: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Create with a parent.
    pub fn with_parent(state: SupportElementState, parent: NodeId) -> Self {
        Self {
            parent: Some(parent),
            ..Self::new(state)
        }
    }

    /// Whether this element starts a branch.
    #[inline]
    pub fn is_tip(&self) -> bool {
        self.parent.is_none()
    }

    /// Primary parent followed by merged parents.
    pub fn parents(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.parent.iter().chain(self.merged_parents.iter()).copied()
    }

    /// Get the radius for this element.
    #[inline]
    pub fn get_radius(&self, settings: &TreeSupportSettings) -> CoordF {
        self.state.get_radius(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_support_settings_new() {
        let settings = TreeSupportSettings::default();

        assert!((settings.min_radius - 0.4).abs() < 1e-10);
        assert!((settings.support_angle - 50.0_f64.to_radians()).abs() < 1e-10);
        assert!((settings.taper_slope - 7.0_f64.to_radians().tan()).abs() < 1e-10);
        assert!(
            (settings.branch_radius_increase_per_layer - 0.2 * settings.taper_slope).abs() < 1e-10
        );
    }

    #[test]
    fn test_get_radius_tip() {
        let settings = TreeSupportSettings::default();

        let r0 = settings.get_radius(0);
        assert!((r0 - settings.min_radius).abs() < 1e-10);

        let r1 = settings.get_radius(1);
        assert!(r1 > r0);
    }

    #[test]
    fn test_get_radius_capped_at_branch_radius() {
        let settings = TreeSupportSettings::default();
        assert!((settings.get_radius(10_000) - settings.branch_radius).abs() < 1e-10);
    }

    #[test]
    fn test_get_radius_monotonic() {
        let settings = TreeSupportSettings::default();
        let mut previous = settings.get_radius(0);
        for dtt in 1..200 {
            let r = settings.get_radius(dtt);
            assert!(r >= previous);
            previous = r;
        }
    }

    #[test]
    fn test_radius_at_length_matches_layers() {
        let settings = TreeSupportSettings::default();
        let by_layers = settings.get_radius(10);
        let by_length = settings.radius_at_length(10.0 * settings.layer_height);
        assert!((by_layers - by_length).abs() < 1e-10);
        assert!((settings.radius_at_length(-5.0) - settings.min_radius).abs() < 1e-10);
    }

    #[test]
    fn test_max_move_slow_within_tip_layers() {
        let settings = TreeSupportSettings::default();
        assert!((settings.max_move(0) - 2.5).abs() < 1e-10);
        assert!((settings.max_move(3) - 2.5).abs() < 1e-10);
        assert!((settings.max_move(4) - 5.0).abs() < 1e-10);
    }

    #[test]
    fn test_move_candidates_order() {
        let settings = TreeSupportSettings::default();
        let candidates = settings.move_candidates(10);

        assert_eq!(candidates[0], (0.0, 0.0));
        assert_eq!(candidates[1], (5.0, 0.0));
        assert_eq!(candidates[2], (-5.0, 0.0));
        assert_eq!(candidates[3], (0.0, 5.0));
        assert_eq!(candidates[4], (0.0, -5.0));
        assert!((candidates[5].0 - 3.5).abs() < 1e-10);
        assert!((candidates[8].1 + 3.5).abs() < 1e-10);
    }

    #[test]
    fn test_layer_z_mapping() {
        let settings = TreeSupportSettings::default().with_build_surface(1.0);

        assert!((settings.get_actual_z(0) - 1.0).abs() < 1e-10);
        assert!((settings.get_actual_z(5) - 2.0).abs() < 1e-10);
        assert_eq!(settings.layer_for_z(2.0), 5);
        assert_eq!(settings.layer_for_z(2.09), 5);
        assert_eq!(settings.layer_for_z(1.05), 0);
        assert_eq!(settings.layer_for_z(-3.0), 0);
    }

    #[test]
    fn test_support_element_state_new_tip() {
        let state = SupportElementState::new_tip(5, Point3F::new(1.0, 2.0, 1.0), 3);

        assert_eq!(state.layer_idx, 5);
        assert_eq!(state.distance_to_tip, 0);
        assert_eq!(state.tip_index, 3);
        assert!(state.bits.to_buildplate);
        assert!(!state.bits.to_model_gracious);
    }

    #[test]
    fn test_support_element_state_propagate_down() {
        let state = SupportElementState::new_tip(5, Point3F::new(1.0, 2.0, 1.0), 0);
        let propagated = state.propagate_down(Point3F::new(3.5, 2.0, 0.8), 2.5);

        assert_eq!(propagated.layer_idx, 4);
        assert_eq!(propagated.distance_to_tip, 1);
        assert_eq!(propagated.tip_index, 0);
        assert!((propagated.last_move_distance - 2.5).abs() < 1e-10);
        assert!(propagated.bits.to_buildplate);
        assert!(!propagated.bits.deleted);
    }

    #[test]
    fn test_support_element_parents_order() {
        let state = SupportElementState::new_tip(0, Point3F::zero(), 0);
        let mut element = SupportElement::with_parent(state, NodeId(4));
        element.merged_parents.push(NodeId(7));

        let parents: Vec<NodeId> = element.parents().collect();
        assert_eq!(parents, vec![NodeId(4), NodeId(7)]);
        assert!(!element.is_tip());
    }

    #[test]
    fn test_state_bits_default() {
        let bits = SupportElementStateBits::default();

        assert!(!bits.to_buildplate);
        assert!(!bits.to_model_gracious);
        assert!(!bits.lost);
        assert!(!bits.deleted);
    }
}
