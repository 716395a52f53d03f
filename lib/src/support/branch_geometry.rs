//! Branch geometry primitives for tree supports.
//!
//! The propagation engine only produces a graph of nodes. This module turns
//! that graph into a flat list of cylinders that a downstream mesher can
//! extrude:
//!
//! - a **trunk** per node: a vertical cylinder one layer high, centred on the
//!   node, with the node's radius
//! - a **connector** per parent link: a tapered cylinder from the child to the
//!   parent, starting at the child's radius and ending at the parent's
//!
//! Every primitive carries the index of the branch it belongs to and the
//! segment (distance to tip) of the node that emitted it, so connectivity can
//! be rebuilt after serialisation.

use crate::geometry::Point3F;
use crate::support::tree_support_3d::LayerTable;
use crate::support::tree_support_settings::{SupportElement, TreeSupportSettings};
use crate::CoordF;
use serde::{Deserialize, Serialize};

/// Shape of a support primitive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PrimitiveShape {
    /// Vertical cylinder centred on `center`.
    Trunk {
        center: Point3F,
        radius: CoordF,
        height: CoordF,
    },
    /// Tapered cylinder between two points.
    Connector {
        start: Point3F,
        end: Point3F,
        start_radius: CoordF,
        end_radius: CoordF,
    },
}

/// A primitive tagged with its place in the support tree.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SupportPrimitive {
    pub shape: PrimitiveShape,
    /// Branch (tip) index.
    pub branch: usize,
    /// Segment index along the branch.
    pub segment: usize,
}

impl SupportPrimitive {
    /// Create a trunk primitive.
    pub fn trunk(
        center: Point3F,
        radius: CoordF,
        height: CoordF,
        branch: usize,
        segment: usize,
    ) -> Self {
        Self {
            shape: PrimitiveShape::Trunk {
                center,
                radius,
                height,
            },
            branch,
            segment,
        }
    }

    /// Create a connector, or `None` if it is shorter than `min_length`.
    pub fn connector(
        start: Point3F,
        end: Point3F,
        start_radius: CoordF,
        end_radius: CoordF,
        min_length: CoordF,
        branch: usize,
        segment: usize,
    ) -> Option<Self> {
        if start.distance(&end) < min_length {
            return None;
        }
        Some(Self {
            shape: PrimitiveShape::Connector {
                start,
                end,
                start_radius,
                end_radius,
            },
            branch,
            segment,
        })
    }

    #[inline]
    pub fn is_trunk(&self) -> bool {
        matches!(self.shape, PrimitiveShape::Trunk { .. })
    }

    #[inline]
    pub fn is_connector(&self) -> bool {
        matches!(self.shape, PrimitiveShape::Connector { .. })
    }

    /// Axis length: the height of a trunk, the distance between a connector's ends.
    pub fn length(&self) -> CoordF {
        match self.shape {
            PrimitiveShape::Trunk { height, .. } => height,
            PrimitiveShape::Connector { start, end, .. } => start.distance(&end),
        }
    }

    /// Largest radius of the primitive.
    pub fn max_radius(&self) -> CoordF {
        match self.shape {
            PrimitiveShape::Trunk { radius, .. } => radius,
            PrimitiveShape::Connector {
                start_radius,
                end_radius,
                ..
            } => start_radius.max(end_radius),
        }
    }
}

/// Emits trunks and connectors for a finished layer table.
#[derive(Debug, Clone, Copy)]
pub struct BranchGeometryEmitter<'a> {
    settings: &'a TreeSupportSettings,
}

impl<'a> BranchGeometryEmitter<'a> {
    pub fn new(settings: &'a TreeSupportSettings) -> Self {
        Self { settings }
    }

    /// Emit primitives from layer 0 upward, in bucket order.
    pub fn emit(&self, table: &LayerTable) -> Vec<SupportPrimitive> {
        let mut primitives = Vec::with_capacity(table.live_count() * 2);
        for (_, element) in table.iter_live() {
            self.emit_element(table, element, &mut primitives);
        }
        primitives
    }

    /// Trunk of one node, then its connectors to the primary and merged parents.
    fn emit_element(
        &self,
        table: &LayerTable,
        element: &SupportElement,
        out: &mut Vec<SupportPrimitive>,
    ) {
        let state = &element.state;
        let radius = element.get_radius(self.settings);
        let branch = state.tip_index;
        let segment = state.distance_to_tip;

        out.push(SupportPrimitive::trunk(
            state.position,
            radius,
            self.settings.layer_height,
            branch,
            segment,
        ));

        for parent_id in element.parents() {
            let parent = table.get(parent_id);
            let connector = SupportPrimitive::connector(
                state.position,
                parent.state.position,
                radius,
                parent.get_radius(self.settings),
                self.settings.config.min_connector_length,
                branch,
                segment,
            );
            out.extend(connector);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::support::tree_support_settings::SupportElementState;

    #[test]
    fn test_connector_skips_short() {
        let a = Point3F::new(0.0, 0.0, 0.0);
        let b = Point3F::new(0.0, 0.0, 0.005);
        assert!(SupportPrimitive::connector(a, b, 1.0, 1.0, 0.01, 0, 0).is_none());

        let c = Point3F::new(0.0, 0.0, 0.2);
        let connector = SupportPrimitive::connector(a, c, 1.0, 0.5, 0.01, 3, 7).unwrap();
        assert!(connector.is_connector());
        assert!((connector.length() - 0.2).abs() < 1e-12);
        assert!((connector.max_radius() - 1.0).abs() < 1e-12);
        assert_eq!(connector.branch, 3);
        assert_eq!(connector.segment, 7);
    }

    #[test]
    fn test_trunk_length_is_height() {
        let trunk = SupportPrimitive::trunk(Point3F::zero(), 0.8, 0.2, 0, 0);
        assert!(trunk.is_trunk());
        assert!((trunk.length() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_emit_chain() {
        let settings = TreeSupportSettings::default();
        let mut table = LayerTable::new(2);
        let tip_state = SupportElementState::new_tip(1, Point3F::new(1.0, 0.0, 0.2), 5);
        let child_state = tip_state.propagate_down(Point3F::new(1.0, 0.0, 0.0), 0.0);
        let tip = table.push(SupportElement::new(tip_state));
        table.push(SupportElement::with_parent(child_state, tip));

        let primitives = BranchGeometryEmitter::new(&settings).emit(&table);

        // Child trunk, child connector, then the tip trunk.
        assert_eq!(primitives.len(), 3);
        assert!(primitives[0].is_trunk());
        assert!(primitives[1].is_connector());
        assert!(primitives[2].is_trunk());
        assert!(primitives.iter().all(|p| p.branch == 5));
        assert_eq!(primitives[0].segment, 1);
        assert_eq!(primitives[2].segment, 0);

        match primitives[1].shape {
            PrimitiveShape::Connector {
                start,
                end,
                start_radius,
                end_radius,
            } => {
                assert!(start.z.abs() < 1e-12);
                assert!((end.z - 0.2).abs() < 1e-12);
                assert!((start_radius - settings.get_radius(1)).abs() < 1e-12);
                assert!((end_radius - settings.min_radius).abs() < 1e-12);
            }
            PrimitiveShape::Trunk { .. } => panic!("expected a connector"),
        }
    }

    #[test]
    fn test_emit_merged_parents() {
        let settings = TreeSupportSettings::default();
        let mut table = LayerTable::new(2);
        let a = table.push(SupportElement::new(SupportElementState::new_tip(
            1,
            Point3F::new(-0.5, 0.0, 0.2),
            0,
        )));
        let b = table.push(SupportElement::new(SupportElementState::new_tip(
            1,
            Point3F::new(0.5, 0.0, 0.2),
            1,
        )));
        let mut merged = SupportElement::with_parent(
            SupportElementState::new_tip(0, Point3F::zero(), 0),
            a,
        );
        merged.merged_parents.push(b);
        table.push(merged);

        let primitives = BranchGeometryEmitter::new(&settings).emit(&table);
        let connectors: Vec<_> = primitives.iter().filter(|p| p.is_connector()).collect();
        assert_eq!(connectors.len(), 2);
        match connectors[1].shape {
            PrimitiveShape::Connector { end, .. } => assert!((end.x - 0.5).abs() < 1e-12),
            PrimitiveShape::Trunk { .. } => panic!("expected a connector"),
        }
    }

    #[test]
    fn test_primitive_json_tagged() {
        let trunk = SupportPrimitive::trunk(Point3F::zero(), 0.8, 0.2, 1, 2);
        let json = serde_json::to_string(&trunk).unwrap();
        assert!(json.contains("\"type\":\"trunk\""));
        let back: SupportPrimitive = serde_json::from_str(&json).unwrap();
        assert_eq!(back, trunk);
    }
}
