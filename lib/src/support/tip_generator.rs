//! Branch tip placement.
//!
//! Overhang samples are thinned greedily: a sample is kept only when it is at
//! least the branch distance away from every sample kept before it. Each kept
//! sample becomes a tip, nudged off the surface so the branch does not start
//! inside its own solid, and snapped to the layer grid.

use crate::geometry::Point3F;
use crate::support::overhang::{OverhangKind, OverhangSample};
use crate::support::tree_support_settings::TreeSupportSettings;
use tracing::debug;

/// An accepted branch tip.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupportTip {
    /// Tip centre, snapped to its layer height.
    pub position: Point3F,
    /// Layer the tip sits on.
    pub layer_idx: usize,
    /// The sample the tip was created from.
    pub sample: OverhangSample,
}

/// Turns overhang samples into branch tips.
#[derive(Debug, Clone, Copy)]
pub struct TipGenerator<'a> {
    settings: &'a TreeSupportSettings,
}

impl<'a> TipGenerator<'a> {
    pub fn new(settings: &'a TreeSupportSettings) -> Self {
        Self { settings }
    }

    /// Keep samples that are far enough from all previously kept samples.
    ///
    /// Order-dependent: the first sample in iteration order wins.
    pub fn select_samples(&self, samples: &[OverhangSample]) -> Vec<OverhangSample> {
        let min_distance = self.settings.config.tree_support_branch_distance;
        let mut accepted: Vec<OverhangSample> = Vec::new();

        for sample in samples {
            let too_close = accepted
                .iter()
                .any(|kept| kept.position.distance(&sample.position) < min_distance);
            if !too_close {
                accepted.push(*sample);
            }
        }

        debug!(
            accepted = accepted.len(),
            rejected = samples.len() - accepted.len(),
            "Selected tip samples"
        );
        accepted
    }

    /// Select samples and place a tip for each.
    pub fn generate(&self, samples: &[OverhangSample]) -> Vec<SupportTip> {
        self.select_samples(samples)
            .into_iter()
            .map(|sample| self.place_tip(sample))
            .collect()
    }

    /// Offset a sample off its surface and snap it to the layer grid.
    pub fn place_tip(&self, sample: OverhangSample) -> SupportTip {
        let clearance = match sample.kind {
            OverhangKind::Edge => self.settings.xy_distance,
            OverhangKind::FloatingBottom => self.settings.z_distance,
        } + self.settings.min_radius;

        let offset = sample.position + sample.normal * clearance;
        let layer_idx = self.settings.layer_for_z(offset.z);

        SupportTip {
            position: offset.with_z(self.settings.get_actual_z(layer_idx)),
            layer_idx,
            sample,
        }
    }
}
