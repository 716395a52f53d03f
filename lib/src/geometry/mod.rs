//! Geometric primitives.
//!
//! Everything is expressed in millimetres with `f64` coordinates and Z up.

mod bounding_box;
mod point;
mod transform;

pub use bounding_box::BoundingBox3F;
pub use point::Point3F;
pub use transform::Transform3D;
