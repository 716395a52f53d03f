//! Tree support configuration.
//!
//! `TreeSupportConfig` is the single parameter record consumed by the
//! support generator. It can be loaded from and saved to JSON; missing
//! fields fall back to their defaults.

use crate::CoordF;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Error type for configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Parameters controlling organic tree support generation.
///
/// Lengths are in millimetres, angles in degrees.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeSupportConfig {
    // === Branch shape ===
    /// Maximum radius of a branch trunk (mm).
    pub branch_radius: CoordF,

    /// Diameter of a branch at its tip (mm).
    pub tip_diameter: CoordF,

    /// Taper angle: how fast the radius grows per unit of descent (degrees).
    pub branch_diameter_angle: CoordF,

    // === Movement ===
    /// Maximum lateral move per layer once past the tip layers (mm).
    pub maximum_move_distance: CoordF,

    /// Maximum lateral move per layer within the tip layers (mm).
    pub maximum_move_distance_slow: CoordF,

    /// Vertical growth step (mm).
    pub layer_height: CoordF,

    /// Number of layers below a tip that use the slow move distance.
    pub tip_layers: usize,

    // === Overhang detection ===
    /// Overhang angle beyond which a surface needs support (degrees).
    pub support_angle: CoordF,

    /// Angular samples around a solid's footprint per sampled height.
    pub perimeter_samples: usize,

    /// Edge samples this close above a solid's base are ignored (mm).
    pub min_overhang_height: CoordF,

    /// Height above the build surface beyond which a solid counts as floating (mm).
    pub floating_threshold: CoordF,

    /// Grid spacing of floating-bottom samples (mm).
    pub floating_grid_spacing: CoordF,

    // === Clearances ===
    /// Horizontal gap kept between support and model (mm).
    pub support_xy_distance: CoordF,

    /// Vertical gap kept between support and model (mm).
    pub support_z_distance: CoordF,

    /// Minimum separation between two branch tips (mm).
    pub tree_support_branch_distance: CoordF,

    /// Resolution of collision queries (mm).
    ///
    /// Accepted and validated for compatibility with existing profiles but
    /// not read: collisions are tested exactly against bounding proxies.
    pub tree_support_collision_resolution: CoordF,

    // === Print area ===
    /// Half width of the printable area around the anchor along X (mm).
    pub print_area_half_x: CoordF,

    /// Half depth of the printable area around the anchor along Y (mm).
    pub print_area_half_y: CoordF,

    /// How far below the build surface a node may sit (mm).
    pub floor_tolerance: CoordF,

    // === Emission ===
    /// Connectors shorter than this are not emitted (mm).
    pub min_connector_length: CoordF,

    // === Centralized growth ===
    /// Amplitude of the organic jitter relative to the step length.
    pub organic_factor: CoordF,

    /// Fraction of a path's progress that uses the slow step cap.
    pub slow_progress_fraction: CoordF,

    /// Targets closer than this to the anchor are not grown (mm).
    pub min_branch_length: CoordF,

    /// Seed for the organic jitter. `None` draws from system entropy.
    pub seed: Option<u64>,

    /// Grow centralized paths on the rayon thread pool.
    pub parallel: bool,

    // === Space colonization ===
    /// Length of one growth step (mm).
    pub colonization_step: CoordF,

    /// A branch within this distance of an attractor has arrived (mm).
    pub colonization_kill_distance: CoordF,

    /// Growing branch ends closer than this are merged (mm).
    pub colonization_merge_distance: CoordF,

    /// Solids closer than this push growing branches away (mm).
    pub colonization_repulsion_distance: CoordF,

    /// Weight of the repulsion relative to the pull of the attractor.
    pub colonization_repulsion_weight: CoordF,

    /// Size of the random perturbation added to every growth direction.
    pub colonization_randomness: CoordF,

    /// Upper bound on growth iterations.
    pub colonization_max_iterations: usize,
}

impl Default for TreeSupportConfig {
    fn default() -> Self {
        Self {
            // Branch shape
            branch_radius: 1.5,
            tip_diameter: 0.8,
            branch_diameter_angle: 7.0,

            // Movement
            maximum_move_distance: 5.0,
            maximum_move_distance_slow: 2.5,
            layer_height: 0.2,
            tip_layers: 4,

            // Overhang detection
            support_angle: 50.0,
            perimeter_samples: 16,
            min_overhang_height: 0.5,
            floating_threshold: 0.5,
            floating_grid_spacing: 4.0,

            // Clearances
            support_xy_distance: 0.7,
            support_z_distance: 0.2,
            tree_support_branch_distance: 4.0,
            tree_support_collision_resolution: 0.5,

            // Print area
            print_area_half_x: 20.0,
            print_area_half_y: 20.0,
            floor_tolerance: 1.0,

            // Emission
            min_connector_length: 0.01,

            // Centralized growth
            organic_factor: 0.3,
            slow_progress_fraction: 0.3,
            min_branch_length: 0.1,
            seed: None,
            parallel: true,

            // Space colonization
            colonization_step: 0.5,
            colonization_kill_distance: 1.0,
            colonization_merge_distance: 1.5,
            colonization_repulsion_distance: 2.0,
            colonization_repulsion_weight: 0.5,
            colonization_randomness: 0.3,
            colonization_max_iterations: 1000,
        }
    }
}

impl TreeSupportConfig {
    /// Load a configuration from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse a configuration from a JSON string and validate it.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Save to a JSON file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let content = self.to_json()?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Builder-style seed override.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Tip radius (mm).
    #[inline]
    pub fn tip_radius(&self) -> CoordF {
        self.tip_diameter / 2.0
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        let values: [(&'static str, CoordF); 27] = [
            ("branch_radius", self.branch_radius),
            ("tip_diameter", self.tip_diameter),
            ("branch_diameter_angle", self.branch_diameter_angle),
            ("maximum_move_distance", self.maximum_move_distance),
            ("maximum_move_distance_slow", self.maximum_move_distance_slow),
            ("layer_height", self.layer_height),
            ("support_angle", self.support_angle),
            ("min_overhang_height", self.min_overhang_height),
            ("floating_threshold", self.floating_threshold),
            ("floating_grid_spacing", self.floating_grid_spacing),
            ("support_xy_distance", self.support_xy_distance),
            ("support_z_distance", self.support_z_distance),
            ("tree_support_branch_distance", self.tree_support_branch_distance),
            (
                "tree_support_collision_resolution",
                self.tree_support_collision_resolution,
            ),
            ("print_area_half_x", self.print_area_half_x),
            ("print_area_half_y", self.print_area_half_y),
            ("floor_tolerance", self.floor_tolerance),
            ("min_connector_length", self.min_connector_length),
            ("organic_factor", self.organic_factor),
            ("slow_progress_fraction", self.slow_progress_fraction),
            ("min_branch_length", self.min_branch_length),
            ("colonization_step", self.colonization_step),
            ("colonization_kill_distance", self.colonization_kill_distance),
            ("colonization_merge_distance", self.colonization_merge_distance),
            (
                "colonization_repulsion_distance",
                self.colonization_repulsion_distance,
            ),
            (
                "colonization_repulsion_weight",
                self.colonization_repulsion_weight,
            ),
            ("colonization_randomness", self.colonization_randomness),
        ];
        for (field, value) in values {
            if !value.is_finite() {
                return Err(ConfigError::invalid(field, "must be finite"));
            }
        }

        if self.layer_height <= 0.0 {
            return Err(ConfigError::invalid("layer_height", "must be positive"));
        }
        if self.tip_diameter <= 0.0 {
            return Err(ConfigError::invalid("tip_diameter", "must be positive"));
        }
        if self.branch_radius < self.tip_radius() {
            return Err(ConfigError::invalid(
                "branch_radius",
                format!(
                    "must be at least half the tip diameter ({:.3})",
                    self.tip_radius()
                ),
            ));
        }
        if !(0.0..90.0).contains(&self.branch_diameter_angle) {
            return Err(ConfigError::invalid(
                "branch_diameter_angle",
                "must be in [0, 90) degrees",
            ));
        }
        if self.support_angle <= 0.0 || self.support_angle >= 90.0 {
            return Err(ConfigError::invalid(
                "support_angle",
                "must be in (0, 90) degrees",
            ));
        }
        if self.maximum_move_distance < 0.0 {
            return Err(ConfigError::invalid(
                "maximum_move_distance",
                "cannot be negative",
            ));
        }
        if self.maximum_move_distance_slow < 0.0 {
            return Err(ConfigError::invalid(
                "maximum_move_distance_slow",
                "cannot be negative",
            ));
        }
        if self.maximum_move_distance_slow > self.maximum_move_distance {
            return Err(ConfigError::invalid(
                "maximum_move_distance_slow",
                "cannot exceed maximum_move_distance",
            ));
        }

        let non_negative: [(&'static str, CoordF); 14] = [
            ("support_xy_distance", self.support_xy_distance),
            ("support_z_distance", self.support_z_distance),
            ("tree_support_branch_distance", self.tree_support_branch_distance),
            (
                "tree_support_collision_resolution",
                self.tree_support_collision_resolution,
            ),
            ("min_overhang_height", self.min_overhang_height),
            ("floating_threshold", self.floating_threshold),
            ("floor_tolerance", self.floor_tolerance),
            ("min_connector_length", self.min_connector_length),
            ("min_branch_length", self.min_branch_length),
            ("colonization_kill_distance", self.colonization_kill_distance),
            ("colonization_merge_distance", self.colonization_merge_distance),
            (
                "colonization_repulsion_distance",
                self.colonization_repulsion_distance,
            ),
            (
                "colonization_repulsion_weight",
                self.colonization_repulsion_weight,
            ),
            ("colonization_randomness", self.colonization_randomness),
        ];
        for (field, value) in non_negative {
            if value < 0.0 {
                return Err(ConfigError::invalid(field, "cannot be negative"));
            }
        }

        if self.print_area_half_x <= 0.0 {
            return Err(ConfigError::invalid("print_area_half_x", "must be positive"));
        }
        if self.print_area_half_y <= 0.0 {
            return Err(ConfigError::invalid("print_area_half_y", "must be positive"));
        }
        if self.floating_grid_spacing <= 0.0 {
            return Err(ConfigError::invalid(
                "floating_grid_spacing",
                "must be positive",
            ));
        }
        if self.perimeter_samples == 0 {
            return Err(ConfigError::invalid(
                "perimeter_samples",
                "at least one sample is required",
            ));
        }
        if self.organic_factor < 0.0 {
            return Err(ConfigError::invalid("organic_factor", "cannot be negative"));
        }
        if !(0.0..=1.0).contains(&self.slow_progress_fraction) {
            return Err(ConfigError::invalid(
                "slow_progress_fraction",
                "must be in [0, 1]",
            ));
        }
        if self.colonization_step <= 0.0 {
            return Err(ConfigError::invalid("colonization_step", "must be positive"));
        }
        if self.colonization_max_iterations == 0 {
            return Err(ConfigError::invalid(
                "colonization_max_iterations",
                "at least one iteration is required",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invalid_field(config: &TreeSupportConfig) -> Option<&'static str> {
        match config.validate() {
            Err(ConfigError::Invalid { field, .. }) => Some(field),
            _ => None,
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = TreeSupportConfig::default();
        assert!(config.validate().is_ok());
        assert!((config.tip_radius() - 0.4).abs() < 1e-10);
        assert_eq!(config.tip_layers, 4);
        assert_eq!(config.perimeter_samples, 16);
        assert!(config.seed.is_none());
    }

    #[test]
    fn test_zero_layer_height_rejected() {
        let config = TreeSupportConfig {
            layer_height: 0.0,
            ..Default::default()
        };
        assert_eq!(invalid_field(&config), Some("layer_height"));
    }

    #[test]
    fn test_branch_radius_below_tip_rejected() {
        let config = TreeSupportConfig {
            branch_radius: 0.3,
            ..Default::default()
        };
        assert_eq!(invalid_field(&config), Some("branch_radius"));
    }

    #[test]
    fn test_slow_move_cannot_exceed_fast() {
        let config = TreeSupportConfig {
            maximum_move_distance: 1.0,
            maximum_move_distance_slow: 2.0,
            ..Default::default()
        };
        assert_eq!(invalid_field(&config), Some("maximum_move_distance_slow"));
    }

    #[test]
    fn test_angles_out_of_range_rejected() {
        let steep = TreeSupportConfig {
            support_angle: 90.0,
            ..Default::default()
        };
        assert_eq!(invalid_field(&steep), Some("support_angle"));

        let taper = TreeSupportConfig {
            branch_diameter_angle: -1.0,
            ..Default::default()
        };
        assert_eq!(invalid_field(&taper), Some("branch_diameter_angle"));
    }

    #[test]
    fn test_non_finite_rejected() {
        let config = TreeSupportConfig {
            support_xy_distance: f64::NAN,
            ..Default::default()
        };
        assert_eq!(invalid_field(&config), Some("support_xy_distance"));
    }

    #[test]
    fn test_zero_grid_spacing_rejected() {
        let config = TreeSupportConfig {
            floating_grid_spacing: 0.0,
            ..Default::default()
        };
        assert_eq!(invalid_field(&config), Some("floating_grid_spacing"));
    }

    #[test]
    fn test_colonization_step_must_be_positive() {
        let config = TreeSupportConfig {
            colonization_step: 0.0,
            ..Default::default()
        };
        assert_eq!(invalid_field(&config), Some("colonization_step"));

        let config = TreeSupportConfig {
            colonization_repulsion_weight: -0.5,
            ..Default::default()
        };
        assert_eq!(invalid_field(&config), Some("colonization_repulsion_weight"));
    }

    #[test]
    fn test_json_partial_uses_defaults() {
        let config = TreeSupportConfig::from_json(r#"{ "layer_height": 0.3, "seed": 7 }"#)
            .expect("partial config should parse");
        assert!((config.layer_height - 0.3).abs() < 1e-10);
        assert_eq!(config.seed, Some(7));
        assert!((config.branch_radius - 1.5).abs() < 1e-10);
    }

    #[test]
    fn test_json_roundtrip() {
        let config = TreeSupportConfig::default().with_seed(42);
        let json = config.to_json().unwrap();
        let parsed = TreeSupportConfig::from_json(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_from_json_validates() {
        let result = TreeSupportConfig::from_json(r#"{ "tip_diameter": 0.0 }"#);
        assert!(matches!(
            result,
            Err(ConfigError::Invalid {
                field: "tip_diameter",
                ..
            })
        ));
    }

    #[test]
    fn test_from_json_malformed() {
        let result = TreeSupportConfig::from_json("{ not json");
        assert!(matches!(result, Err(ConfigError::Json(_))));
    }

    #[test]
    fn test_save_and_load_file() {
        let path = std::env::temp_dir().join(format!(
            "organic_support_config_{}.json",
            std::process::id()
        ));
        let config = TreeSupportConfig {
            tip_layers: 6,
            ..Default::default()
        };
        config.save_to_file(&path).unwrap();
        let loaded = TreeSupportConfig::from_file(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded.tip_layers, 6);
    }
}
