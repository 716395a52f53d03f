//! Inputs to support generation: target solids and the anchor.

use crate::geometry::{BoundingBox3F, Point3F, Transform3D};
use crate::CoordF;
use serde::{Deserialize, Serialize};

/// A solid that may need support.
///
/// Only its bounding proxy takes part in generation: the local bounding box
/// mapped through the world transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSolid {
    /// Display name, used in logs.
    pub name: String,
    /// Bounds in the solid's own frame.
    pub local_bounds: BoundingBox3F,
    /// Placement in the scene.
    #[serde(default)]
    pub transform: Transform3D,
}

impl TargetSolid {
    /// Create a solid from local bounds and a placement.
    pub fn new(name: impl Into<String>, local_bounds: BoundingBox3F, transform: Transform3D) -> Self {
        Self {
            name: name.into(),
            local_bounds,
            transform,
        }
    }

    /// Create a solid whose bounds are already in world space.
    pub fn from_bounds(name: impl Into<String>, world_bounds: BoundingBox3F) -> Self {
        Self::new(name, world_bounds, Transform3D::identity())
    }

    /// Create a solid from the vertices of a mesh.
    pub fn from_vertices(
        name: impl Into<String>,
        vertices: &[Point3F],
        transform: Transform3D,
    ) -> Self {
        Self::new(name, BoundingBox3F::from_points(vertices), transform)
    }

    /// World-space bounding proxy.
    pub fn world_bounds(&self) -> BoundingBox3F {
        self.transform.apply_to_bounds(&self.local_bounds)
    }
}

/// The fixed point support grows from or down to.
///
/// Its Z is the build surface in layered mode and the start of every branch
/// in centralized mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    pub position: Point3F,
    #[serde(default = "Point3F::down")]
    pub normal: Point3F,
}

impl Anchor {
    /// Anchor at `position` facing down.
    pub fn new(position: Point3F) -> Self {
        Self {
            position,
            normal: Point3F::down(),
        }
    }

    /// Override the anchor normal.
    pub fn with_normal(mut self, normal: Point3F) -> Self {
        self.normal = normal.normalize();
        self
    }

    /// Height of the build surface.
    #[inline]
    pub fn build_surface_z(&self) -> CoordF {
        self.position.z
    }
}

impl Default for Anchor {
    fn default() -> Self {
        Self::new(Point3F::zero())
    }
}
