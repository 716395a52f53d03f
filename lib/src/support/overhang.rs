//! Overhang detection on bounding proxies.
//!
//! Two passes exist. A solid resting on the build surface is scanned at
//! every layer height on a ring just outside its footprint; a ring point is
//! an overhang while its excess over the footprint radius is more than the
//! support angle can carry at that height. A floating solid instead gets a
//! uniform grid of downward-facing samples under its whole bottom face.

use crate::geometry::{BoundingBox3F, Point3F};
use crate::support::target::TargetSolid;
use crate::support::tree_support_settings::TreeSupportSettings;
use crate::CoordF;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use tracing::debug;

/// Radius of the edge sampling ring relative to the footprint radius.
const EDGE_RING_FACTOR: CoordF = 1.2;

/// Where an overhang sample came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OverhangKind {
    /// Perimeter point past the support angle.
    Edge,
    /// Point under the bottom face of a floating solid.
    FloatingBottom,
}

/// A point that needs support.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverhangSample {
    pub position: Point3F,
    /// Outward surface normal.
    pub normal: Point3F,
    /// Index of the originating solid.
    pub solid: usize,
    pub kind: OverhangKind,
}

/// Scans target solids for regions needing support.
#[derive(Debug, Clone, Copy)]
pub struct OverhangDetector<'a> {
    settings: &'a TreeSupportSettings,
}

impl<'a> OverhangDetector<'a> {
    pub fn new(settings: &'a TreeSupportSettings) -> Self {
        Self { settings }
    }

    /// Detect samples on all solids, concatenated in solid order.
    pub fn detect(&self, solids: &[TargetSolid]) -> Vec<OverhangSample> {
        let mut samples = Vec::new();
        for (index, solid) in solids.iter().enumerate() {
            let bounds = solid.world_bounds();
            let found = self.detect_solid(index, &bounds);
            debug!(
                solid = %solid.name,
                samples = found.len(),
                floating = self.is_floating(&bounds),
                "Detected overhangs"
            );
            samples.extend(found);
        }
        samples
    }

    /// Detect samples on a single bounding proxy.
    pub fn detect_solid(&self, solid: usize, bounds: &BoundingBox3F) -> Vec<OverhangSample> {
        if bounds.is_empty() {
            return Vec::new();
        }
        if self.is_floating(bounds) {
            self.floating_samples(solid, bounds)
        } else {
            self.edge_samples(solid, bounds)
        }
    }

    /// A solid floats when its lowest point is clearly above the build surface.
    pub fn is_floating(&self, bounds: &BoundingBox3F) -> bool {
        bounds.min.z > self.settings.build_surface_z + self.settings.config.floating_threshold
    }

    /// Ring samples at each layer height where the ring's excess over the
    /// footprint radius is more than half of what the support angle carries.
    pub fn edge_samples(&self, solid: usize, bounds: &BoundingBox3F) -> Vec<OverhangSample> {
        let config = &self.settings.config;
        let layer_height = self.settings.layer_height;
        let layers = (bounds.size_z() / layer_height).ceil() as usize;
        let center = bounds.center();
        let object_radius = bounds.planar_radius();
        let ring_radius = object_radius * EDGE_RING_FACTOR;
        let excess = ring_radius - object_radius;
        if excess <= 0.0 {
            return Vec::new();
        }
        let tan_angle = self.settings.support_angle.tan();

        let mut samples = Vec::new();
        for layer in 1..layers {
            let z = bounds.min.z + layer as CoordF * layer_height;
            let height_above_base = z - bounds.min.z;
            if height_above_base <= config.min_overhang_height {
                continue;
            }
            let max_supported_overhang = height_above_base * tan_angle;
            if excess <= max_supported_overhang / 2.0 {
                // The carried overhang only grows with height.
                break;
            }

            for i in 0..config.perimeter_samples {
                let angle = i as CoordF / config.perimeter_samples as CoordF * TAU;
                let (sin_a, cos_a) = angle.sin_cos();
                samples.push(OverhangSample {
                    position: Point3F::new(
                        center.x + cos_a * ring_radius,
                        center.y + sin_a * ring_radius,
                        z,
                    ),
                    normal: Point3F::new(cos_a, sin_a, 0.0),
                    solid,
                    kind: OverhangKind::Edge,
                });
            }
        }
        samples
    }

    /// Grid of samples under the bottom face. Never empty for a defined box.
    pub fn floating_samples(&self, solid: usize, bounds: &BoundingBox3F) -> Vec<OverhangSample> {
        let spacing = self.settings.config.floating_grid_spacing;
        let (nx, ny) = grid_counts(bounds.size_x(), bounds.size_y(), spacing);
        let cell_x = bounds.size_x() / nx as CoordF;
        let cell_y = bounds.size_y() / ny as CoordF;

        let mut samples = Vec::with_capacity(nx * ny);
        for i in 0..nx {
            for j in 0..ny {
                samples.push(OverhangSample {
                    position: Point3F::new(
                        bounds.min.x + (i as CoordF + 0.5) * cell_x,
                        bounds.min.y + (j as CoordF + 0.5) * cell_y,
                        bounds.min.z,
                    ),
                    normal: Point3F::down(),
                    solid,
                    kind: OverhangKind::FloatingBottom,
                });
            }
        }
        samples
    }
}

// ============================================================================
// Helper functions
// ============================================================================

/// Grid point counts per axis, at least one each.
fn grid_counts(size_x: CoordF, size_y: CoordF, spacing: CoordF) -> (usize, usize) {
    let count = |size: CoordF| ((size / spacing).ceil() as usize).max(1);
    (count(size_x), count(size_y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TreeSupportConfig;

    fn cube(min: (f64, f64, f64), max: (f64, f64, f64)) -> BoundingBox3F {
        BoundingBox3F::from_points_minmax(min.into(), max.into())
    }

    #[test]
    fn test_grid_counts_clamp() {
        assert_eq!(grid_counts(0.0, 0.0, 4.0), (1, 1));
        assert_eq!(grid_counts(8.0, 9.0, 4.0), (2, 3));
    }

    #[test]
    fn test_is_floating() {
        let settings = TreeSupportSettings::default();
        let detector = OverhangDetector::new(&settings);

        assert!(!detector.is_floating(&cube((-1.0, -1.0, 0.0), (1.0, 1.0, 2.0))));
        assert!(!detector.is_floating(&cube((-1.0, -1.0, 0.5), (1.0, 1.0, 2.0))));
        assert!(detector.is_floating(&cube((-1.0, -1.0, 0.6), (1.0, 1.0, 2.0))));
    }

    #[test]
    fn test_floating_samples_grid() {
        let settings = TreeSupportSettings::default();
        let detector = OverhangDetector::new(&settings);
        let bounds = cube((-4.0, -2.0, 5.0), (4.0, 2.0, 7.0));

        let samples = detector.detect_solid(2, &bounds);
        assert_eq!(samples.len(), 2);
        for s in &samples {
            assert_eq!(s.kind, OverhangKind::FloatingBottom);
            assert_eq!(s.normal, Point3F::down());
            assert_eq!(s.solid, 2);
            assert!((s.position.z - 5.0).abs() < 1e-10);
        }
        assert!((samples[0].position.x + 2.0).abs() < 1e-10);
        assert!((samples[1].position.x - 2.0).abs() < 1e-10);
        assert!(samples[0].position.y.abs() < 1e-10);
    }

    #[test]
    fn test_floating_zero_area_box() {
        let settings = TreeSupportSettings::default();
        let detector = OverhangDetector::new(&settings);
        let bounds = cube((3.0, 3.0, 5.0), (3.0, 3.0, 5.0));

        let samples = detector.detect_solid(0, &bounds);
        assert_eq!(samples.len(), 1);
        assert!(samples[0].position.approx_eq(&Point3F::new(3.0, 3.0, 5.0), 1e-12));
    }

    #[test]
    fn test_edge_samples_ring_around_cube() {
        let settings = TreeSupportSettings::default();
        let detector = OverhangDetector::new(&settings);
        let bounds = cube((-5.0, -5.0, 0.0), (5.0, 5.0, 10.0));

        let samples = detector.detect_solid(0, &bounds);
        // Excess 1.0 is carried once z·tan(50°)/2 reaches it, above z ≈ 1.68:
        // layers at z 0.6 to 1.6, 16 samples each.
        assert_eq!(samples.len(), 6 * 16);
        for s in &samples {
            assert_eq!(s.kind, OverhangKind::Edge);
            assert!(s.position.z > 0.5 && s.position.z < 1.7);
            assert!(s.normal.z.abs() < 1e-12);
            assert!((s.position.planar_distance(&Point3F::zero()) - 6.0).abs() < 1e-10);
        }
        // Axis directions are sampled too, not only the corners.
        assert!(samples
            .iter()
            .any(|s| (s.position.x - 6.0).abs() < 1e-10 && s.position.y.abs() < 1e-10));
    }

    #[test]
    fn test_edge_samples_long_thin_bar() {
        let settings = TreeSupportSettings::default();
        let detector = OverhangDetector::new(&settings);
        let bounds = cube((-10.0, -1.0, 0.0), (10.0, 1.0, 5.0));

        let samples = detector.detect_solid(0, &bounds);
        assert!(!samples.is_empty());
        // Excess 2.0 holds up to z ≈ 3.36: layers at z 0.6 to 3.2.
        assert_eq!(samples.len(), 14 * 16);
        for s in &samples {
            assert!((s.position.planar_distance(&Point3F::zero()) - 12.0).abs() < 1e-10);
            assert!(s.position.z < 3.4);
        }
    }

    #[test]
    fn test_zero_footprint_has_no_edge_samples() {
        let settings = TreeSupportSettings::default();
        let detector = OverhangDetector::new(&settings);
        let bounds = cube((1.0, 1.0, 0.0), (1.0, 1.0, 5.0));
        assert!(detector.detect_solid(0, &bounds).is_empty());
    }

    #[test]
    fn test_edge_samples_respect_min_height() {
        let settings = TreeSupportSettings::new(TreeSupportConfig {
            min_overhang_height: 100.0,
            ..Default::default()
        });
        let detector = OverhangDetector::new(&settings);
        let bounds = cube((-5.0, -5.0, 0.0), (5.0, 5.0, 10.0));
        assert!(detector.detect_solid(0, &bounds).is_empty());
    }

    #[test]
    fn test_flat_solid_has_no_edge_layers() {
        let settings = TreeSupportSettings::default();
        let detector = OverhangDetector::new(&settings);
        let bounds = cube((-5.0, -5.0, 0.0), (5.0, 5.0, 0.0));
        assert!(detector.detect_solid(0, &bounds).is_empty());
    }

    #[test]
    fn test_detect_concatenates_in_solid_order() {
        let settings = TreeSupportSettings::default();
        let detector = OverhangDetector::new(&settings);
        let solids = vec![
            TargetSolid::from_bounds("a", cube((-1.0, -1.0, 4.0), (1.0, 1.0, 5.0))),
            TargetSolid::from_bounds("b", cube((6.0, 6.0, 4.0), (8.0, 8.0, 5.0))),
        ];

        let samples = detector.detect(&solids);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].solid, 0);
        assert_eq!(samples[1].solid, 1);
    }
}
