//! Organic tree support generation.
//!
//! # Algorithm Overview
//!
//! 1. **Overhang Detection**: every target solid's bounding proxy is scanned
//!    for perimeter points sticking out past the support angle, or, for a
//!    floating solid, covered with a grid of samples under its bottom face.
//!
//! 2. **Tip Placement**: samples closer together than the branch distance are
//!    collapsed; each survivor becomes a branch tip just off the surface.
//!
//! 3. **Growth**, in one of three modes:
//!    - [`GenerationMode::Layered`]: tips are grown down layer by layer,
//!      stepping around the model and merging branches that come close.
//!    - [`GenerationMode::Centralized`]: every branch is grown from the
//!      anchor up to one tip with decaying organic jitter.
//!    - [`GenerationMode::SpaceColonization`]: tips grow toward the anchor
//!      as an attractor, repelled by nearby solids and merging on contact.
//!
//! 4. **Geometry**: the result is a flat list of trunk and connector
//!    cylinders, tagged with branch and segment indices.
//!
//! Key submodules:
//! - `tree_model_volumes`: Collision detection and avoidance computation
//! - `tree_support_settings`: Derived settings and support element state
//! - `tree_support_3d`: Layer-by-layer propagation and merging
//! - `centralized`: Anchor-to-tip growth
//! - `space_colonization`: Attractor-driven growth from explicit sources

pub mod branch_geometry;
pub mod centralized;
pub mod overhang;
pub mod space_colonization;
pub mod target;
pub mod tip_generator;
pub mod tree_model_volumes;
pub mod tree_support_3d;
pub mod tree_support_settings;

// Re-export tree support types for convenience
pub use branch_geometry::{BranchGeometryEmitter, PrimitiveShape, SupportPrimitive};
pub use centralized::{CentralizedPath, CentralizedPathGrower, PathReport};
pub use overhang::{OverhangDetector, OverhangKind, OverhangSample};
pub use space_colonization::{
    ColonizationNode, ColonizationStats, ColonizationTree, SpaceColonizationGrower,
};
pub use target::{Anchor, TargetSolid};
pub use tip_generator::{SupportTip, TipGenerator};
pub use tree_model_volumes::TreeModelVolumes;
pub use tree_support_3d::{LayerTable, TreeSupport3D, TreeSupportStats};
pub use tree_support_settings::{NodeId, SupportElement, TreeSupportSettings};

use crate::config::{ConfigError, TreeSupportConfig};
use crate::geometry::Point3F;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Error type for support generation.
#[derive(Debug, thiserror::Error)]
pub enum SupportError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Generation cancelled before layer {layer}")]
    Cancelled { layer: usize },
}

/// Result type for support generation.
pub type SupportResult<T> = Result<T, SupportError>;

/// How branches are grown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    /// From each tip down to the build surface, one layer at a time.
    #[default]
    Layered,
    /// From the anchor up to each tip.
    Centralized,
    /// From each tip toward the anchor as an attractor.
    SpaceColonization,
}

/// Output of a generation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeSupportResult {
    pub mode: GenerationMode,
    /// Support geometry, in emission order.
    pub primitives: Vec<SupportPrimitive>,
    /// Overhang samples detected.
    pub sample_count: usize,
    /// Tips placed after de-duplication.
    pub tip_count: usize,
    /// Propagation statistics (layered mode).
    pub stats: Option<TreeSupportStats>,
    /// One report per grown branch (centralized mode).
    pub paths: Vec<PathReport>,
    /// Growth counters (space colonization mode).
    #[serde(default)]
    pub colonization: Option<ColonizationStats>,
}

impl TreeSupportResult {
    /// An empty result for the given mode.
    pub fn empty(mode: GenerationMode) -> Self {
        Self {
            mode,
            primitives: Vec::new(),
            sample_count: 0,
            tip_count: 0,
            stats: None,
            paths: Vec::new(),
            colonization: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }

    pub fn trunk_count(&self) -> usize {
        self.primitives.iter().filter(|p| p.is_trunk()).count()
    }

    pub fn connector_count(&self) -> usize {
        self.primitives.iter().filter(|p| p.is_connector()).count()
    }

    /// Serialize the result for a downstream mesher.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Tree support generator.
///
/// Holds a validated configuration; every call to [`Self::generate`] is an
/// independent pass with its own node arena.
#[derive(Debug, Clone, Default)]
pub struct TreeSupportGenerator {
    config: TreeSupportConfig,
}

impl TreeSupportGenerator {
    /// Create a generator, validating the configuration.
    pub fn new(config: TreeSupportConfig) -> SupportResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &TreeSupportConfig {
        &self.config
    }

    /// Settings for a pass against the given anchor.
    fn settings_for(&self, anchor: &Anchor) -> TreeSupportSettings {
        TreeSupportSettings::new(self.config.clone()).with_build_surface(anchor.build_surface_z())
    }

    /// Generate supports for `solids`.
    pub fn generate(
        &self,
        solids: &[TargetSolid],
        anchor: &Anchor,
        mode: GenerationMode,
    ) -> SupportResult<TreeSupportResult> {
        self.generate_cancellable(solids, anchor, mode, || false)
    }

    /// Like [`Self::generate`], polling `should_cancel` between layers.
    ///
    /// In centralized mode the predicate is polled once, before growth starts;
    /// in space colonization mode once per growth iteration.
    pub fn generate_cancellable<F>(
        &self,
        solids: &[TargetSolid],
        anchor: &Anchor,
        mode: GenerationMode,
        should_cancel: F,
    ) -> SupportResult<TreeSupportResult>
    where
        F: FnMut() -> bool,
    {
        info!(?mode, solids = solids.len(), "Generating tree supports");
        let samples = self.detect_overhangs(solids, anchor);
        self.run(&samples, solids, anchor, mode, should_cancel)
    }

    /// Overhang samples on all solids, in solid order.
    pub fn detect_overhangs(&self, solids: &[TargetSolid], anchor: &Anchor) -> Vec<OverhangSample> {
        let settings = self.settings_for(anchor);
        OverhangDetector::new(&settings).detect(solids)
    }

    /// Generate supports from already detected samples.
    ///
    /// `solids` are still needed for collision avoidance.
    pub fn generate_from_samples(
        &self,
        samples: &[OverhangSample],
        solids: &[TargetSolid],
        anchor: &Anchor,
        mode: GenerationMode,
    ) -> SupportResult<TreeSupportResult> {
        self.run(samples, solids, anchor, mode, || false)
    }

    /// Grow branches from explicit `sources` toward explicit `attractors`
    /// by space colonization.
    ///
    /// No overhang detection takes place; `solids` only act as obstacles.
    pub fn generate_between(
        &self,
        sources: &[Point3F],
        attractors: &[Point3F],
        solids: &[TargetSolid],
        anchor: &Anchor,
    ) -> TreeSupportResult {
        info!(
            sources = sources.len(),
            attractors = attractors.len(),
            "Growing tree supports between points"
        );
        let settings = self.settings_for(anchor);
        let volumes = TreeModelVolumes::new(solids, anchor, &settings);
        let tree = SpaceColonizationGrower::new(&settings, &volumes).grow(sources, attractors);

        TreeSupportResult {
            primitives: tree.primitives,
            colonization: Some(tree.stats),
            ..TreeSupportResult::empty(GenerationMode::SpaceColonization)
        }
    }

    fn run<F>(
        &self,
        samples: &[OverhangSample],
        solids: &[TargetSolid],
        anchor: &Anchor,
        mode: GenerationMode,
        mut should_cancel: F,
    ) -> SupportResult<TreeSupportResult>
    where
        F: FnMut() -> bool,
    {
        if samples.is_empty() {
            info!(?mode, "No overhangs found, nothing to support");
            return Ok(TreeSupportResult::empty(mode));
        }

        let settings = self.settings_for(anchor);
        let tips = TipGenerator::new(&settings).generate(samples);
        let volumes = TreeModelVolumes::new(solids, anchor, &settings);

        let mut result = TreeSupportResult {
            sample_count: samples.len(),
            tip_count: tips.len(),
            ..TreeSupportResult::empty(mode)
        };

        match mode {
            GenerationMode::Layered => {
                let mut engine = TreeSupport3D::new(settings.clone(), volumes);
                engine.insert_tips(&tips);
                engine.generate_cancellable(should_cancel)?;

                let (table, stats) = engine.into_parts();
                result.primitives = BranchGeometryEmitter::new(&settings).emit(&table);
                result.stats = Some(stats);
            }
            GenerationMode::Centralized => {
                if should_cancel() {
                    return Err(SupportError::Cancelled { layer: 0 });
                }
                let targets: Vec<_> = tips.iter().map(|tip| tip.position).collect();
                let paths =
                    CentralizedPathGrower::new(&settings, &volumes).grow_all(anchor.position, &targets);
                for path in paths {
                    result.paths.push(path.report);
                    result.primitives.extend(path.primitives);
                }
            }
            GenerationMode::SpaceColonization => {
                let sources: Vec<_> = tips.iter().map(|tip| tip.position).collect();
                let tree = SpaceColonizationGrower::new(&settings, &volumes).grow_cancellable(
                    &sources,
                    &[anchor.position],
                    should_cancel,
                )?;
                result.primitives = tree.primitives;
                result.colonization = Some(tree.stats);
            }
        }

        info!(
            ?mode,
            samples = result.sample_count,
            tips = result.tip_count,
            primitives = result.primitives.len(),
            "Tree support generation finished"
        );
        Ok(result)
    }
}
