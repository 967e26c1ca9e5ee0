// src/config.rs - Pipeline parameters for contact angle measurement

use serde::{Deserialize, Serialize};
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::Path;

use crate::errors::{ContactAngleError, Result};

/// Configuration for the measurement pipeline
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// Longest image side processed; larger inputs are downscaled
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,

    // Baseline RANSAC parameters
    #[serde(default = "default_ransac_iterations")]
    pub ransac_iterations: usize,

    #[serde(default = "default_inlier_threshold")]
    pub inlier_threshold: f64,

    #[serde(default = "default_baseline_slope_prior_weight")]
    pub baseline_slope_prior_weight: f64,

    /// Seed for every random draw made during one measurement
    #[serde(default = "default_seed")]
    pub seed: u64,

    // Preprocessing
    #[serde(default = "default_clahe_tile_size")]
    pub clahe_tile_size: u32,

    #[serde(default = "default_clahe_low_percentile")]
    pub clahe_low_percentile: f64,

    #[serde(default = "default_clahe_high_percentile")]
    pub clahe_high_percentile: f64,

    #[serde(default = "default_clahe_min_range")]
    pub clahe_min_range: u8,

    #[serde(default = "default_median_radius")]
    pub median_radius: u32,

    // Segmentation
    #[serde(default = "default_gradient_threshold_floor")]
    pub gradient_threshold_floor: f64,

    #[serde(default = "default_gradient_threshold_median_factor")]
    pub gradient_threshold_median_factor: f64,

    #[serde(default = "default_close_radius")]
    pub close_radius: u32,

    #[serde(default = "default_open_radius")]
    pub open_radius: u32,

    #[serde(default = "default_fill_holes")]
    pub fill_holes: bool,

    // Contour
    #[serde(default = "default_contour_smoothing_half_window")]
    pub contour_smoothing_half_window: usize,

    #[serde(default = "default_min_contour_points")]
    pub min_contour_points: usize,

    // Contact localisation and subpixel refinement
    #[serde(default = "default_contact_epsilon")]
    pub contact_epsilon: f64,

    #[serde(default = "default_refine_samples")]
    pub refine_samples: usize,

    #[serde(default = "default_refine_spacing")]
    pub refine_spacing: f64,

    #[serde(default = "default_refine_min_gradient")]
    pub refine_min_gradient: f64,

    // Tangent estimation
    #[serde(default = "default_tangent_half_window")]
    pub tangent_half_window: usize,

    #[serde(default = "default_tangent_baseline_clearance")]
    pub tangent_baseline_clearance: f64,

    // Uncertainty model
    #[serde(default = "default_random_uncertainty_deg")]
    pub random_uncertainty_deg: f64,

    #[serde(default = "default_numerical_uncertainty_deg")]
    pub numerical_uncertainty_deg: f64,

    #[serde(default = "default_uncertainty_cap_deg")]
    pub uncertainty_cap_deg: f64,

    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Attach intermediate diagnostics to every result
    #[serde(default)]
    pub collect_debug: bool,
}

fn default_max_dimension() -> u32 {
    1200
}

fn default_ransac_iterations() -> usize {
    800
}

fn default_inlier_threshold() -> f64 {
    2.0
}

fn default_baseline_slope_prior_weight() -> f64 {
    10.0
}

fn default_seed() -> u64 {
    0x5EED_C0DE
}

fn default_clahe_tile_size() -> u32 {
    64
}

fn default_clahe_low_percentile() -> f64 {
    2.0
}

fn default_clahe_high_percentile() -> f64 {
    98.0
}

fn default_clahe_min_range() -> u8 {
    16
}

fn default_median_radius() -> u32 {
    1
}

fn default_gradient_threshold_floor() -> f64 {
    12.0
}

fn default_gradient_threshold_median_factor() -> f64 {
    0.9
}

fn default_close_radius() -> u32 {
    2
}

fn default_open_radius() -> u32 {
    1
}

fn default_fill_holes() -> bool {
    true
}

fn default_contour_smoothing_half_window() -> usize {
    4
}

fn default_min_contour_points() -> usize {
    20
}

fn default_contact_epsilon() -> f64 {
    2.0
}

fn default_refine_samples() -> usize {
    25
}

fn default_refine_spacing() -> f64 {
    0.6
}

fn default_refine_min_gradient() -> f64 {
    2.0
}

fn default_tangent_half_window() -> usize {
    20
}

fn default_tangent_baseline_clearance() -> f64 {
    2.0
}

fn default_random_uncertainty_deg() -> f64 {
    0.2
}

fn default_numerical_uncertainty_deg() -> f64 {
    0.1
}

fn default_uncertainty_cap_deg() -> f64 {
    5.0
}

fn default_cache_capacity() -> usize {
    64
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_dimension: default_max_dimension(),
            ransac_iterations: default_ransac_iterations(),
            inlier_threshold: default_inlier_threshold(),
            baseline_slope_prior_weight: default_baseline_slope_prior_weight(),
            seed: default_seed(),
            clahe_tile_size: default_clahe_tile_size(),
            clahe_low_percentile: default_clahe_low_percentile(),
            clahe_high_percentile: default_clahe_high_percentile(),
            clahe_min_range: default_clahe_min_range(),
            median_radius: default_median_radius(),
            gradient_threshold_floor: default_gradient_threshold_floor(),
            gradient_threshold_median_factor: default_gradient_threshold_median_factor(),
            close_radius: default_close_radius(),
            open_radius: default_open_radius(),
            fill_holes: default_fill_holes(),
            contour_smoothing_half_window: default_contour_smoothing_half_window(),
            min_contour_points: default_min_contour_points(),
            contact_epsilon: default_contact_epsilon(),
            refine_samples: default_refine_samples(),
            refine_spacing: default_refine_spacing(),
            refine_min_gradient: default_refine_min_gradient(),
            tangent_half_window: default_tangent_half_window(),
            tangent_baseline_clearance: default_tangent_baseline_clearance(),
            random_uncertainty_deg: default_random_uncertainty_deg(),
            numerical_uncertainty_deg: default_numerical_uncertainty_deg(),
            uncertainty_cap_deg: default_uncertainty_cap_deg(),
            cache_capacity: default_cache_capacity(),
            collect_debug: false,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ContactAngleError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ContactAngleError::ConfigLoad {
            source: e,
            path: path.to_path_buf(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_dimension < 32 {
            return Err(ContactAngleError::Config(
                "max_dimension must be >= 32".to_string(),
            ));
        }

        if self.ransac_iterations == 0 {
            return Err(ContactAngleError::Config(
                "ransac_iterations must be > 0".to_string(),
            ));
        }

        if self.inlier_threshold <= 0.0 {
            return Err(ContactAngleError::Config(
                "inlier_threshold must be > 0.0".to_string(),
            ));
        }

        if self.baseline_slope_prior_weight < 0.0 {
            return Err(ContactAngleError::Config(
                "baseline_slope_prior_weight must be >= 0.0".to_string(),
            ));
        }

        if self.clahe_tile_size < 8 {
            return Err(ContactAngleError::Config(
                "clahe_tile_size must be >= 8".to_string(),
            ));
        }

        if !(0.0..100.0).contains(&self.clahe_low_percentile)
            || self.clahe_high_percentile <= self.clahe_low_percentile
            || self.clahe_high_percentile > 100.0
        {
            return Err(ContactAngleError::Config(
                "clahe percentiles must satisfy 0 <= low < high <= 100".to_string(),
            ));
        }

        if self.gradient_threshold_floor < 0.0 || self.gradient_threshold_median_factor < 0.0 {
            return Err(ContactAngleError::Config(
                "gradient threshold parameters must be >= 0.0".to_string(),
            ));
        }

        if self.min_contour_points < 5 {
            return Err(ContactAngleError::Config(
                "min_contour_points must be >= 5".to_string(),
            ));
        }

        if self.refine_samples < 5 || self.refine_spacing <= 0.0 {
            return Err(ContactAngleError::Config(
                "refine_samples must be >= 5 and refine_spacing > 0.0".to_string(),
            ));
        }

        if self.tangent_half_window < 2 {
            return Err(ContactAngleError::Config(
                "tangent_half_window must be >= 2".to_string(),
            ));
        }

        if self.contact_epsilon <= 0.0 || self.tangent_baseline_clearance < 0.0 {
            return Err(ContactAngleError::Config(
                "contact_epsilon must be > 0.0 and tangent_baseline_clearance >= 0.0".to_string(),
            ));
        }

        if self.uncertainty_cap_deg <= 0.0 {
            return Err(ContactAngleError::Config(
                "uncertainty_cap_deg must be > 0.0".to_string(),
            ));
        }

        Ok(())
    }

    /// Distance from the baseline below which boundary points are left out of
    /// tangent fits. Never less than the reach of contour smoothing plus
    /// mask closing, which both bend the outline at the foot.
    pub fn tangent_clearance(&self) -> f64 {
        let distortion = self.contour_smoothing_half_window + self.close_radius as usize;
        self.tangent_baseline_clearance.max(distortion as f64)
    }

    /// Feed every field that affects contact analysis into `state`
    pub fn hash_analysis_fields<H: Hasher>(&self, state: &mut H) {
        self.close_radius.hash(state);
        self.contour_smoothing_half_window.hash(state);
        self.contact_epsilon.to_bits().hash(state);
        self.refine_samples.hash(state);
        self.refine_spacing.to_bits().hash(state);
        self.refine_min_gradient.to_bits().hash(state);
        self.tangent_half_window.hash(state);
        self.tangent_baseline_clearance.to_bits().hash(state);
        self.random_uncertainty_deg.to_bits().hash(state);
        self.numerical_uncertainty_deg.to_bits().hash(state);
        self.uncertainty_cap_deg.to_bits().hash(state);
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            ContactAngleError::Config(format!("Failed to serialize config: {}", e))
        })?;

        fs::write(path, content)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config: Config = toml::from_str("seed = 7\ninlier_threshold = 1.5\n").unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.inlier_threshold, 1.5);
        assert_eq!(config.max_dimension, 1200);
        assert_eq!(config.clahe_tile_size, 64);
    }

    #[test]
    fn rejects_inverted_percentiles() {
        let config = Config {
            clahe_low_percentile: 90.0,
            clahe_high_percentile: 10.0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ContactAngleError::Config(_))));
    }

    #[test]
    fn tangent_clearance_covers_smoothing_and_closing() {
        let config = Config::default();
        assert_eq!(config.tangent_clearance(), 6.0);
        let wide = Config { tangent_baseline_clearance: 9.5, ..Config::default() };
        assert_eq!(wide.tangent_clearance(), 9.5);
    }

    #[test]
    fn analysis_hash_tracks_tangent_settings() {
        use std::collections::hash_map::DefaultHasher;
        let digest = |config: &Config| {
            let mut hasher = DefaultHasher::new();
            config.hash_analysis_fields(&mut hasher);
            hasher.finish()
        };
        let base = Config::default();
        let other = Config { tangent_half_window: 3, ..Config::default() };
        let reseeded = Config { seed: 1, ..Config::default() };
        assert_ne!(digest(&base), digest(&other));
        assert_eq!(digest(&base), digest(&reseeded));
    }

    #[test]
    fn round_trips_through_a_file() {
        let dir = std::env::temp_dir().join(format!("contact_angle_cfg_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        let config = Config { seed: 42, ..Config::default() };
        config.save_to_file(&path).unwrap();
        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded, config);
        fs::remove_dir_all(&dir).ok();
    }
}
