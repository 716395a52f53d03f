//! Organic tree support generation.
//!
//! Given a set of target solids (approximated by their world-space bounding
//! boxes), an anchor point and a [`TreeSupportConfig`], this crate produces an
//! ordered list of tapered-cylinder primitives describing organic tree
//! supports. Meshing and slicing of those primitives happen downstream.
//!
//! Three growth modes are provided:
//! - **Layered**: tips are placed under overhangs and grown down one layer at
//!   a time, avoiding the model and merging branches that come close.
//! - **Centralized**: every branch is grown from the single anchor point up to
//!   an overhang, with decaying organic jitter.
//! - **Space colonization**: branches grow from tips (or any source points)
//!   toward attractors, bending away from nearby solids.
//!
//! ```no_run
//! use organic_support::{
//!     Anchor, BoundingBox3F, GenerationMode, Point3F, TargetSolid, TreeSupportConfig,
//!     TreeSupportGenerator,
//! };
//!
//! let solid = TargetSolid::from_bounds(
//!     "cube",
//!     BoundingBox3F::from_points_minmax(Point3F::new(-5.0, -5.0, 5.0), Point3F::new(5.0, 5.0, 10.0)),
//! );
//! let generator = TreeSupportGenerator::new(TreeSupportConfig::default())?;
//! let result = generator.generate(&[solid], &Anchor::default(), GenerationMode::Layered)?;
//! println!("{} primitives", result.primitives.len());
//! # Ok::<(), organic_support::SupportError>(())
//! ```

pub mod config;
pub mod geometry;
pub mod support;

/// Floating-point coordinate type (millimetres).
pub type CoordF = f64;

/// Tolerance for geometric comparisons (mm).
pub const EPSILON: CoordF = 1e-9;

pub use config::{ConfigError, ConfigResult, TreeSupportConfig};
pub use geometry::{BoundingBox3F, Point3F, Transform3D};
pub use support::{
    Anchor, GenerationMode, PrimitiveShape, SupportError, SupportPrimitive, SupportResult,
    TargetSolid, TreeSupportGenerator, TreeSupportResult,
};
