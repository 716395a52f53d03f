//! Affine placement of target solids.
//!
//! A solid is described in its own local frame and placed in the scene by a
//! `Transform3D`. Only the resulting world-space bounds matter to the
//! support engine, so the transform mostly exists to map local corners.

use super::{BoundingBox3F, Point3F};
use crate::CoordF;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A 3D affine transformation matrix.
///
/// Represented as a 4x4 matrix in homogeneous coordinates.
#[derive(Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform3D {
    /// The 4x4 matrix stored in column-major order.
    /// [m00, m10, m20, m30, m01, m11, m21, m31, m02, m12, m22, m32, m03, m13, m23, m33]
    pub matrix: [CoordF; 16],
}

impl Transform3D {
    /// Create an identity transform.
    pub fn identity() -> Self {
        Self {
            matrix: [
                1.0, 0.0, 0.0, 0.0, // Column 0
                0.0, 1.0, 0.0, 0.0, // Column 1
                0.0, 0.0, 1.0, 0.0, // Column 2
                0.0, 0.0, 0.0, 1.0, // Column 3
            ],
        }
    }

    /// Create a translation transform.
    pub fn translation(tx: CoordF, ty: CoordF, tz: CoordF) -> Self {
        let mut t = Self::identity();
        t.set(0, 3, tx);
        t.set(1, 3, ty);
        t.set(2, 3, tz);
        t
    }

    /// Create a scaling transform.
    pub fn scaling(sx: CoordF, sy: CoordF, sz: CoordF) -> Self {
        let mut t = Self::identity();
        t.set(0, 0, sx);
        t.set(1, 1, sy);
        t.set(2, 2, sz);
        t
    }

    /// Rotation around the Z (build) axis, angle in radians.
    pub fn rotation_z(angle: CoordF) -> Self {
        let (sin_a, cos_a) = angle.sin_cos();
        let mut t = Self::identity();
        t.set(0, 0, cos_a);
        t.set(0, 1, -sin_a);
        t.set(1, 0, sin_a);
        t.set(1, 1, cos_a);
        t
    }

    /// Get a matrix element by row and column.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> CoordF {
        self.matrix[col * 4 + row]
    }

    /// Set a matrix element by row and column.
    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: CoordF) {
        self.matrix[col * 4 + row] = value;
    }

    /// Compose transformations.
    /// Returns a transform that first applies self, then other.
    pub fn then(&self, other: &Transform3D) -> Self {
        let mut result = Self::identity();
        for i in 0..4 {
            for j in 0..4 {
                let mut sum = 0.0;
                for k in 0..4 {
                    sum += other.get(i, k) * self.get(k, j);
                }
                result.set(i, j, sum);
            }
        }
        result
    }

    /// Apply this transform to a point.
    pub fn apply(&self, p: Point3F) -> Point3F {
        let x = self.get(0, 0) * p.x + self.get(0, 1) * p.y + self.get(0, 2) * p.z + self.get(0, 3);
        let y = self.get(1, 0) * p.x + self.get(1, 1) * p.y + self.get(1, 2) * p.z + self.get(1, 3);
        let z = self.get(2, 0) * p.x + self.get(2, 1) * p.y + self.get(2, 2) * p.z + self.get(2, 3);
        let w = self.get(3, 0) * p.x + self.get(3, 1) * p.y + self.get(3, 2) * p.z + self.get(3, 3);

        if w.abs() > 1e-10 {
            Point3F::new(x / w, y / w, z / w)
        } else {
            Point3F::new(x, y, z)
        }
    }

    /// World-space AABB of a local box: the bounds of its eight mapped corners.
    pub fn apply_to_bounds(&self, bounds: &BoundingBox3F) -> BoundingBox3F {
        if bounds.is_empty() {
            return *bounds;
        }
        let mut out = BoundingBox3F::new();
        for corner in bounds.corners() {
            out.merge_point(self.apply(corner));
        }
        out
    }
}

impl Default for Transform3D {
    fn default() -> Self {
        Self::identity()
    }
}

impl fmt::Debug for Transform3D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Transform3D(")?;
        for i in 0..3 {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(
                f,
                "[{:.4}, {:.4}, {:.4}, {:.4}]",
                self.get(i, 0),
                self.get(i, 1),
                self.get(i, 2),
                self.get(i, 3)
            )?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_transform3d_identity() {
        let t = Transform3D::identity();
        let p = Point3F::new(1.0, 2.0, 3.0);
        assert_eq!(t.apply(p), p);
        assert_eq!(t, Transform3D::default());
    }

    #[test]
    fn test_transform3d_translation() {
        let t = Transform3D::translation(10.0, -5.0, 2.0);
        let p = t.apply(Point3F::new(1.0, 1.0, 1.0));
        assert_eq!(p, Point3F::new(11.0, -4.0, 3.0));
        assert_eq!(t.get(0, 3), 10.0);
    }

    #[test]
    fn test_transform3d_rotation_z() {
        let t = Transform3D::rotation_z(FRAC_PI_2);
        let p = t.apply(Point3F::new(1.0, 0.0, 0.0));
        assert_relative_eq!(p.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(p.y, 1.0, epsilon = 1e-12);
        assert_relative_eq!(p.z, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_transform3d_compose() {
        // Scale first, then translate.
        let t = Transform3D::scaling(2.0, 2.0, 2.0).then(&Transform3D::translation(1.0, 0.0, 0.0));
        let p = t.apply(Point3F::new(1.0, 1.0, 1.0));
        assert_eq!(p, Point3F::new(3.0, 2.0, 2.0));
    }

    #[test]
    fn test_transform3d_bounds_of_rotated_box() {
        let local = BoundingBox3F::from_points_minmax(
            Point3F::new(-2.0, -1.0, -1.0),
            Point3F::new(2.0, 1.0, 1.0),
        );
        let world = Transform3D::rotation_z(FRAC_PI_2).apply_to_bounds(&local);
        assert_relative_eq!(world.size_x(), 2.0, epsilon = 1e-9);
        assert_relative_eq!(world.size_y(), 4.0, epsilon = 1e-9);
        assert_relative_eq!(world.size_z(), 2.0, epsilon = 1e-9);
    }
}
