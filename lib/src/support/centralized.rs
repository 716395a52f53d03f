//! Centralized organic growth.
//!
//! Instead of growing down from every tip, each branch starts at the anchor
//! and walks toward one target, one step per iteration:
//!
//! 1. Step toward the target, slowly during the first part of the walk and
//!    faster afterwards.
//! 2. Add a random offset perpendicular to the step. Its size shrinks as the
//!    branch approaches the target so branches converge cleanly.
//! 3. Push the new position out of any solid it collides with.
//! 4. Emit a connector from the previous position and a trunk at the new one.
//!
//! The radius tapers from the trunk radius at the anchor to the tip radius at
//! the target and never increases along a path. Targets are independent of each other, so they are grown in
//! parallel; output order always follows target order.

use crate::geometry::Point3F;
use crate::support::branch_geometry::SupportPrimitive;
use crate::support::tree_model_volumes::TreeModelVolumes;
use crate::support::tree_support_settings::TreeSupportSettings;
use crate::CoordF;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Outcome of growing one branch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathReport {
    /// Index of the target in the input list.
    pub target_index: usize,
    pub target: Point3F,
    /// Steps taken.
    pub iterations: usize,
    /// The branch ended within one layer height of the target.
    pub reached: bool,
    /// The branch ended early: out of steps or boxed in by solids.
    pub truncated: bool,
    /// Steps whose position had to be pushed out of a solid.
    pub avoidance_pushes: usize,
}

/// One grown branch.
#[derive(Debug, Clone, PartialEq)]
pub struct CentralizedPath {
    pub report: PathReport,
    pub primitives: Vec<SupportPrimitive>,
}

/// Grows branches from a single start point to a list of targets.
#[derive(Debug, Clone, Copy)]
pub struct CentralizedPathGrower<'a> {
    settings: &'a TreeSupportSettings,
    volumes: &'a TreeModelVolumes,
}

impl<'a> CentralizedPathGrower<'a> {
    pub fn new(settings: &'a TreeSupportSettings, volumes: &'a TreeModelVolumes) -> Self {
        Self { settings, volumes }
    }

    /// Grow a branch to every target, in target order.
    ///
    /// Targets closer to `start` than the minimum branch length are skipped.
    pub fn grow_all(&self, start: Point3F, targets: &[Point3F]) -> Vec<CentralizedPath> {
        let grow = |(index, target): (usize, &Point3F)| -> Option<CentralizedPath> {
            if start.distance(target) < self.settings.config.min_branch_length {
                debug!(index, "Target too close to the anchor, skipped");
                return None;
            }
            let mut rng = self.rng_for(index);
            Some(self.grow_path(start, *target, index, &mut rng))
        };

        if self.settings.config.parallel {
            targets.par_iter().enumerate().filter_map(grow).collect()
        } else {
            targets.iter().enumerate().filter_map(grow).collect()
        }
    }

    /// Random source for one target: seeded per target when a seed is configured.
    fn rng_for(&self, index: usize) -> StdRng {
        match self.settings.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(index as u64)),
            None => StdRng::from_entropy(),
        }
    }

    /// Grow a single branch from `start` toward `target`.
    pub fn grow_path<R: Rng + ?Sized>(
        &self,
        start: Point3F,
        target: Point3F,
        target_index: usize,
        rng: &mut R,
    ) -> CentralizedPath {
        let settings = self.settings;
        let config = &settings.config;
        let tolerance = settings.layer_height;
        let total = start.distance(&target);
        let budget = (total / settings.layer_height).ceil() as usize;

        let mut primitives = Vec::new();
        let mut current = start;
        let mut current_radius = settings.radius_at_length(total);
        let mut iterations = 0;
        let mut avoidance_pushes = 0;
        let mut boxed_in = false;
        let mut reached = total <= tolerance;

        while !reached && iterations < budget {
            let progress = iterations as CoordF / budget as CoordF;
            let to_target = target - current;
            let remaining = to_target.length();

            let cap = if progress < config.slow_progress_fraction {
                settings.maximum_move_distance_slow
            } else {
                settings.maximum_move_distance
            };
            let step = remaining.min(cap);
            let direction = to_target.normalize();

            let (u, v) = direction.perpendicular_basis();
            let amplitude = config.organic_factor * step * (1.0 - progress);
            let ju: CoordF = rng.gen_range(-0.5..=0.5);
            let jv: CoordF = rng.gen_range(-0.5..=0.5);
            let jitter = u * (ju * amplitude) + v * (jv * amplitude);
            let stepped = current + direction * step + jitter;

            // A push-out can move away from the target; the radius still never grows.
            let radius = settings
                .radius_at_length(stepped.distance(&target))
                .min(current_radius);
            let next = match self.volumes.try_avoid(stepped, radius) {
                Some(next) => next,
                None => {
                    warn!(
                        target_index,
                        iteration = iterations,
                        position = %stepped,
                        "No collision-free position, branch stopped"
                    );
                    boxed_in = true;
                    break;
                }
            };
            if next != stepped {
                avoidance_pushes += 1;
            }
            iterations += 1;

            primitives.extend(SupportPrimitive::connector(
                current,
                next,
                current_radius,
                radius,
                config.min_connector_length,
                target_index,
                iterations,
            ));
            primitives.push(SupportPrimitive::trunk(
                next,
                radius,
                settings.layer_height,
                target_index,
                iterations,
            ));

            current = next;
            current_radius = radius;
            reached = current.distance(&target) <= tolerance;
        }

        if reached && !self.volumes.is_colliding(target, settings.min_radius) {
            primitives.extend(SupportPrimitive::connector(
                current,
                target,
                current_radius,
                settings.min_radius,
                config.min_connector_length,
                target_index,
                iterations + 1,
            ));
        }

        if !reached && !boxed_in {
            warn!(
                target_index,
                iterations,
                remaining = current.distance(&target),
                "Step budget exhausted before reaching the target"
            );
        }
        debug!(target_index, iterations, reached, avoidance_pushes, "Grew branch");

        CentralizedPath {
            report: PathReport {
                target_index,
                target,
                iterations,
                reached,
                truncated: !reached,
                avoidance_pushes,
            },
            primitives,
        }
    }
}
