//! Axis-aligned bounding boxes.
//!
//! Target solids are represented by their world-space AABB. The box also
//! answers the planar questions the support engine asks of a footprint:
//! half extents, the radius of the inscribing and circumscribing circles.

use super::Point3F;
use crate::CoordF;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A 3D axis-aligned bounding box with floating-point coordinates (in mm).
#[derive(Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox3F {
    pub min: Point3F,
    pub max: Point3F,
    defined: bool,
}

impl BoundingBox3F {
    /// Create a new empty bounding box.
    #[inline]
    pub fn new() -> Self {
        Self {
            min: Point3F::new(CoordF::MAX, CoordF::MAX, CoordF::MAX),
            max: Point3F::new(CoordF::MIN, CoordF::MIN, CoordF::MIN),
            defined: false,
        }
    }

    /// Create a bounding box from two opposite corners.
    ///
    /// The corners may be given in any order.
    #[inline]
    pub fn from_points_minmax(a: Point3F, b: Point3F) -> Self {
        Self {
            min: Point3F::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: Point3F::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
            defined: true,
        }
    }

    /// Create a bounding box from a slice of points.
    pub fn from_points(points: &[Point3F]) -> Self {
        let mut bb = Self::new();
        for p in points {
            bb.merge_point(*p);
        }
        bb
    }

    /// Check if the bounding box is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.defined
    }

    /// Merge a point into the bounding box.
    pub fn merge_point(&mut self, p: Point3F) {
        if self.defined {
            self.min.x = self.min.x.min(p.x);
            self.min.y = self.min.y.min(p.y);
            self.min.z = self.min.z.min(p.z);
            self.max.x = self.max.x.max(p.x);
            self.max.y = self.max.y.max(p.y);
            self.max.z = self.max.z.max(p.z);
        } else {
            self.min = p;
            self.max = p;
            self.defined = true;
        }
    }

    /// Get the size in x direction.
    #[inline]
    pub fn size_x(&self) -> CoordF {
        if self.defined {
            self.max.x - self.min.x
        } else {
            0.0
        }
    }

    /// Get the size in y direction.
    #[inline]
    pub fn size_y(&self) -> CoordF {
        if self.defined {
            self.max.y - self.min.y
        } else {
            0.0
        }
    }

    /// Get the size in z direction.
    #[inline]
    pub fn size_z(&self) -> CoordF {
        if self.defined {
            self.max.z - self.min.z
        } else {
            0.0
        }
    }

    /// Get the size.
    #[inline]
    pub fn size(&self) -> Point3F {
        Point3F::new(self.size_x(), self.size_y(), self.size_z())
    }

    /// Get the center.
    #[inline]
    pub fn center(&self) -> Point3F {
        Point3F::new(
            (self.min.x + self.max.x) / 2.0,
            (self.min.y + self.max.y) / 2.0,
            (self.min.z + self.max.z) / 2.0,
        )
    }

    /// Half extents of the XY footprint.
    #[inline]
    pub fn planar_half_extents(&self) -> (CoordF, CoordF) {
        (self.size_x() / 2.0, self.size_y() / 2.0)
    }

    /// Largest planar half extent (the footprint "radius" used by overhang tests).
    #[inline]
    pub fn planar_radius(&self) -> CoordF {
        let (hx, hy) = self.planar_half_extents();
        hx.max(hy)
    }

    /// Radius of the circle circumscribing the XY footprint.
    #[inline]
    pub fn planar_circumradius(&self) -> CoordF {
        let (hx, hy) = self.planar_half_extents();
        (hx * hx + hy * hy).sqrt()
    }

    /// Eight corners of the box.
    pub fn corners(&self) -> [Point3F; 8] {
        let (a, b) = (self.min, self.max);
        [
            Point3F::new(a.x, a.y, a.z),
            Point3F::new(b.x, a.y, a.z),
            Point3F::new(a.x, b.y, a.z),
            Point3F::new(b.x, b.y, a.z),
            Point3F::new(a.x, a.y, b.z),
            Point3F::new(b.x, a.y, b.z),
            Point3F::new(a.x, b.y, b.z),
            Point3F::new(b.x, b.y, b.z),
        ]
    }

    /// Point of the box nearest to `p`; `p` itself when it lies inside.
    #[inline]
    pub fn closest_point(&self, p: &Point3F) -> Point3F {
        Point3F::new(
            p.x.clamp(self.min.x, self.max.x),
            p.y.clamp(self.min.y, self.max.y),
            p.z.clamp(self.min.z, self.max.z),
        )
    }

    /// Check if this bounding box intersects another.
    #[inline]
    pub fn intersects(&self, other: &BoundingBox3F) -> bool {
        self.defined
            && other.defined
            && self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }
}

impl fmt::Debug for BoundingBox3F {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.defined {
            write!(f, "BoundingBox3F({:?} - {:?})", self.min, self.max)
        } else {
            write!(f, "BoundingBox3F(undefined)")
        }
    }
}

impl fmt::Display for BoundingBox3F {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.defined {
            write!(f, "[{} - {}]", self.min, self.max)
        } else {
            write!(f, "[undefined]")
        }
    }
}
