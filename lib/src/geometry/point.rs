//! 3D point and vector type.
//!
//! All support geometry is expressed in millimetres with `f64` coordinates.
//! `Point3F` doubles as a direction vector; the arithmetic operators are
//! implemented component-wise.

use crate::{CoordF, EPSILON};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub};

/// A 3D point with floating-point coordinates (in mm).
#[derive(Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point3F {
    pub x: CoordF,
    pub y: CoordF,
    pub z: CoordF,
}

impl Point3F {
    /// Create a new 3D floating-point point.
    #[inline]
    pub const fn new(x: CoordF, y: CoordF, z: CoordF) -> Self {
        Self { x, y, z }
    }

    /// Create a point at the origin.
    #[inline]
    pub const fn zero() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
        }
    }

    /// Unit vector pointing down the build axis.
    #[inline]
    pub const fn down() -> Self {
        Self::new(0.0, 0.0, -1.0)
    }

    /// Calculate squared distance.
    #[inline]
    pub fn distance_squared(&self, other: &Point3F) -> CoordF {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        let dz = other.z - self.z;
        dx * dx + dy * dy + dz * dz
    }

    /// Calculate distance.
    #[inline]
    pub fn distance(&self, other: &Point3F) -> CoordF {
        self.distance_squared(other).sqrt()
    }

    /// Distance between the XY projections of two points.
    #[inline]
    pub fn planar_distance(&self, other: &Point3F) -> CoordF {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Calculate squared length.
    #[inline]
    pub fn length_squared(&self) -> CoordF {
        self.x * self.x + self.y * self.y + self.z * self.z
    }

    /// Calculate length.
    #[inline]
    pub fn length(&self) -> CoordF {
        self.length_squared().sqrt()
    }

    /// Normalize to unit length. Zero vectors are returned unchanged.
    #[inline]
    pub fn normalize(&self) -> Self {
        let len = self.length();
        if len > 0.0 {
            Self {
                x: self.x / len,
                y: self.y / len,
                z: self.z / len,
            }
        } else {
            *self
        }
    }

    /// Cross product.
    #[inline]
    pub fn cross(&self, other: &Point3F) -> Point3F {
        Point3F {
            x: self.y * other.z - self.z * other.y,
            y: self.z * other.x - self.x * other.z,
            z: self.x * other.y - self.y * other.x,
        }
    }

    /// Midpoint between two points.
    #[inline]
    pub fn midpoint(&self, other: &Point3F) -> Point3F {
        Point3F {
            x: (self.x + other.x) * 0.5,
            y: (self.y + other.y) * 0.5,
            z: (self.z + other.z) * 0.5,
        }
    }

    /// Same point with a different Z.
    #[inline]
    pub const fn with_z(&self, z: CoordF) -> Point3F {
        Point3F {
            x: self.x,
            y: self.y,
            z,
        }
    }

    /// Two unit vectors that, together with `self` (assumed normalized),
    /// form an orthonormal basis.
    pub fn perpendicular_basis(&self) -> (Point3F, Point3F) {
        // Cross with the axis the vector is least aligned with.
        let helper = if self.z.abs() < 0.9 {
            Point3F::new(0.0, 0.0, 1.0)
        } else {
            Point3F::new(1.0, 0.0, 0.0)
        };
        let u = self.cross(&helper).normalize();
        let v = self.cross(&u).normalize();
        (u, v)
    }

    /// Check if approximately equal.
    #[inline]
    pub fn approx_eq(&self, other: &Point3F, epsilon: CoordF) -> bool {
        (self.x - other.x).abs() < epsilon
            && (self.y - other.y).abs() < epsilon
            && (self.z - other.z).abs() < epsilon
    }

    /// Check whether the vector has (numerically) zero length.
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.length_squared() < EPSILON * EPSILON
    }
}

impl fmt::Debug for Point3F {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Point3F({:.6}, {:.6}, {:.6})", self.x, self.y, self.z)
    }
}

impl fmt::Display for Point3F {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3}, {:.3})", self.x, self.y, self.z)
    }
}

impl Add for Point3F {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Self {
            x: self.x + other.x,
            y: self.y + other.y,
            z: self.z + other.z,
        }
    }
}

impl AddAssign for Point3F {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.x += other.x;
        self.y += other.y;
        self.z += other.z;
    }
}

impl Sub for Point3F {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Self {
            x: self.x - other.x,
            y: self.y - other.y,
            z: self.z - other.z,
        }
    }
}

impl Neg for Point3F {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Self {
            x: -self.x,
            y: -self.y,
            z: -self.z,
        }
    }
}

impl Mul<CoordF> for Point3F {
    type Output = Self;

    #[inline]
    fn mul(self, scalar: CoordF) -> Self {
        Self {
            x: self.x * scalar,
            y: self.y * scalar,
            z: self.z * scalar,
        }
    }
}

impl Div<CoordF> for Point3F {
    type Output = Self;

    #[inline]
    fn div(self, scalar: CoordF) -> Self {
        Self {
            x: self.x / scalar,
            y: self.y / scalar,
            z: self.z / scalar,
        }
    }
}

impl From<(CoordF, CoordF, CoordF)> for Point3F {
    #[inline]
    fn from((x, y, z): (CoordF, CoordF, CoordF)) -> Self {
        Self { x, y, z }
    }
}

impl From<[CoordF; 3]> for Point3F {
    #[inline]
    fn from([x, y, z]: [CoordF; 3]) -> Self {
        Self { x, y, z }
    }
}
