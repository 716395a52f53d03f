//! Tree Model Volumes - Collision detection and avoidance.
//!
//! `TreeModelVolumes` answers the questions the growth engine asks about the
//! model: does a branch of radius R at this position touch any solid, where
//! should it go instead, and is a position inside the printable area.
//!
//! # Key Concepts
//!
//! - **Bounding proxies**: every solid is represented by its world AABB. A
//!   branch is tested as a cube of half-size R against each proxy.
//! - **Push-out**: a colliding position is moved radially away from the
//!   nearest proxy's centroid, far enough that the cube clears that proxy
//!   plus the XY avoidance distance.
//! - **Print area**: a rectangle centred on the anchor plus a floor tolerance
//!   below the build surface.

use crate::geometry::{BoundingBox3F, Point3F};
use crate::support::target::{Anchor, TargetSolid};
use crate::support::tree_support_settings::TreeSupportSettings;
use crate::CoordF;
use std::f64::consts::SQRT_2;

/// Extra clearance added to push-outs so the result does not sit exactly on
/// the proxy boundary.
const PUSH_MARGIN: CoordF = 1e-6;

/// Collision oracle over the target solids' bounding proxies.
#[derive(Debug, Clone)]
pub struct TreeModelVolumes {
    /// World bounds of each solid.
    proxies: Vec<BoundingBox3F>,
    /// Avoidance buffer kept around every proxy.
    xy_distance: CoordF,
    /// Centre of the print area.
    area_center: Point3F,
    print_area_half_x: CoordF,
    print_area_half_y: CoordF,
    /// Lowest Z a branch may reach.
    floor_z: CoordF,
}

impl TreeModelVolumes {
    /// Create volumes for the given solids.
    pub fn new(solids: &[TargetSolid], anchor: &Anchor, settings: &TreeSupportSettings) -> Self {
        Self::from_bounds(
            solids.iter().map(TargetSolid::world_bounds).collect(),
            anchor,
            settings,
        )
    }

    /// Create volumes from world-space proxies directly.
    pub fn from_bounds(
        proxies: Vec<BoundingBox3F>,
        anchor: &Anchor,
        settings: &TreeSupportSettings,
    ) -> Self {
        let config = &settings.config;
        Self {
            proxies,
            xy_distance: settings.xy_distance,
            area_center: anchor.position,
            print_area_half_x: config.print_area_half_x,
            print_area_half_y: config.print_area_half_y,
            floor_z: anchor.build_surface_z() - config.floor_tolerance,
        }
    }

    /// The bounding proxies, in solid order.
    pub fn proxies(&self) -> &[BoundingBox3F] {
        &self.proxies
    }

    /// Whether a cube of half-size `radius` at `position` touches any proxy.
    pub fn is_colliding(&self, position: Point3F, radius: CoordF) -> bool {
        self.colliding_solids(position, radius).next().is_some()
    }

    /// Indices of all proxies touched by the query cube.
    pub fn colliding_solids(
        &self,
        position: Point3F,
        radius: CoordF,
    ) -> impl Iterator<Item = usize> + '_ {
        let query = query_box(position, radius);
        self.proxies
            .iter()
            .enumerate()
            .filter(move |(_, proxy)| proxy.intersects(&query))
            .map(|(idx, _)| idx)
    }

    /// Colliding proxy whose centroid is nearest in the plane.
    fn nearest_colliding(&self, position: Point3F, radius: CoordF) -> Option<usize> {
        self.colliding_solids(position, radius).min_by(|&a, &b| {
            let da = self.proxies[a].center().planar_distance(&position);
            let db = self.proxies[b].center().planar_distance(&position);
            da.total_cmp(&db)
        })
    }

    /// Move `position` radially out of proxy `idx`, keeping its Z.
    fn push_out(&self, idx: usize, position: Point3F, radius: CoordF) -> Point3F {
        let proxy = &self.proxies[idx];
        let centroid = proxy.center().with_z(position.z);
        let away = position - centroid;
        let direction = if away.is_zero() {
            Point3F::new(1.0, 0.0, 0.0)
        } else {
            away.normalize()
        };
        let distance =
            proxy.planar_circumradius() + radius * SQRT_2 + self.xy_distance + PUSH_MARGIN;
        centroid + direction * distance
    }

    /// A position clear of the nearest colliding proxy, or `position` itself
    /// when nothing collides.
    ///
    /// A single push may land inside another proxy; see [`Self::try_avoid`].
    pub fn get_avoidance_area(&self, position: Point3F, radius: CoordF) -> Point3F {
        match self.nearest_colliding(position, radius) {
            Some(idx) => self.push_out(idx, position, radius),
            None => position,
        }
    }

    /// Push `position` out of colliding proxies, at most once per proxy.
    ///
    /// Returns `None` when a collision remains or the result has left the
    /// print area.
    pub fn try_avoid(&self, position: Point3F, radius: CoordF) -> Option<Point3F> {
        let mut current = position;
        let mut pushed = vec![false; self.proxies.len()];

        while let Some(idx) = self.nearest_colliding(current, radius) {
            if pushed[idx] {
                return None;
            }
            pushed[idx] = true;
            current = self.push_out(idx, current, radius);
        }
        self.is_in_bounds(current).then_some(current)
    }

    /// Unit vector pointing away from the nearest proxy surface within
    /// `max_distance`, scaled down linearly with distance.
    ///
    /// Zero when no proxy is that close or `position` lies inside one.
    pub fn repulsion(&self, position: Point3F, max_distance: CoordF) -> Point3F {
        let nearest = self
            .proxies
            .iter()
            .map(|proxy| proxy.closest_point(&position))
            .map(|surface| (surface, surface.distance(&position)))
            .min_by(|a, b| a.1.total_cmp(&b.1));

        match nearest {
            Some((surface, distance)) if distance > 0.0 && distance < max_distance => {
                (position - surface).normalize() * (1.0 - distance / max_distance)
            }
            _ => Point3F::zero(),
        }
    }

    /// Whether `position` lies inside the print area and above the floor.
    pub fn is_in_bounds(&self, position: Point3F) -> bool {
        (position.x - self.area_center.x).abs() <= self.print_area_half_x
            && (position.y - self.area_center.y).abs() <= self.print_area_half_y
            && position.z >= self.floor_z
    }

    /// Whether a branch of `radius` may be placed at `position`.
    pub fn is_valid_position(&self, position: Point3F, radius: CoordF) -> bool {
        !self.is_colliding(position, radius) && self.is_in_bounds(position)
    }
}

/// Query cube of half-size `radius` around `position`.
fn query_box(position: Point3F, radius: CoordF) -> BoundingBox3F {
    let half = Point3F::new(radius, radius, radius);
    BoundingBox3F::from_points_minmax(position - half, position + half)
}
