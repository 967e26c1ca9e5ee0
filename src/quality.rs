// src/quality.rs - Uncertainty budget and confidence classification

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::geometry::LineModel;
use crate::tangent::TangentEstimate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceLabel {
    High,
    Medium,
    Low,
}

impl ConfidenceLabel {
    pub fn from_quality(overall: f64) -> Self {
        if overall > 0.8 {
            ConfidenceLabel::High
        } else if overall > 0.6 {
            ConfidenceLabel::Medium
        } else {
            ConfidenceLabel::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub systematic_uncertainty: f64,
    pub random_uncertainty: f64,
    pub geometric_uncertainty: f64,
    pub numerical_uncertainty: f64,
    /// Quadrature sum of the four components, capped
    pub total_uncertainty: f64,
    pub contour_smoothness: f64,
    pub baseline_quality: f64,
    pub symmetry: f64,
    pub reliability: f64,
    pub overall_quality: f64,
    pub confidence_label: ConfidenceLabel,
}

/// Inputs gathered from the earlier stages
pub struct QualityInputs<'a> {
    pub contour_roughness: f64,
    pub baseline: &'a LineModel,
    pub left_tangent: &'a TangentEstimate,
    pub right_tangent: &'a TangentEstimate,
    pub left_angle: f64,
    pub right_angle: f64,
}

pub fn score_quality(inputs: &QualityInputs, config: &Config) -> QualityMetrics {
    // Every local fit attempted on either side, winners and losers alike
    let residuals: Vec<f64> = [inputs.left_tangent, inputs.right_tangent]
        .iter()
        .flat_map(|t| std::iter::once(t.residual).chain(t.rival_residual))
        .collect();
    let systematic = residuals.iter().sum::<f64>() / residuals.len() as f64;
    let max_residual = inputs
        .left_tangent
        .max_residual
        .max(inputs.right_tangent.max_residual);
    let geometric = 0.5 * max_residual;
    let random = config.random_uncertainty_deg;
    let numerical = config.numerical_uncertainty_deg;

    let total = (systematic.powi(2) + random.powi(2) + geometric.powi(2) + numerical.powi(2))
        .sqrt()
        .min(config.uncertainty_cap_deg);

    let contour_smoothness = 1.0 / (1.0 + 2.0 * inputs.contour_roughness.max(0.0));
    let baseline_quality = 1.0 / (1.0 + inputs.baseline.rms_residual.max(0.0));
    let symmetry = 1.0 - ((inputs.left_angle - inputs.right_angle).abs() / 90.0).min(1.0);
    let reliability = (1.0 - total / config.uncertainty_cap_deg).clamp(0.0, 1.0);
    let overall_quality = (contour_smoothness + baseline_quality + symmetry + reliability) / 4.0;

    QualityMetrics {
        systematic_uncertainty: systematic,
        random_uncertainty: random,
        geometric_uncertainty: geometric,
        numerical_uncertainty: numerical,
        total_uncertainty: total,
        contour_smoothness,
        baseline_quality,
        symmetry,
        reliability,
        overall_quality,
        confidence_label: ConfidenceLabel::from_quality(overall_quality),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tangent::TangentMethod;
    use assert_approx_eq::assert_approx_eq;

    fn tangent(residual: f64, max_residual: f64) -> TangentEstimate {
        TangentEstimate {
            direction: (0.0, -1.0),
            slope: f64::INFINITY,
            method: TangentMethod::Circle,
            residual,
            max_residual,
            rival_residual: None,
            support: 21,
            chord: (0.0, -1.0),
        }
    }

    #[test]
    fn clean_symmetric_measurement_is_high_confidence() {
        let baseline = LineModel::horizontal(100.0);
        let (l, r) = (tangent(0.05, 0.1), tangent(0.05, 0.1));
        let inputs = QualityInputs {
            contour_roughness: 0.02,
            baseline: &baseline,
            left_tangent: &l,
            right_tangent: &r,
            left_angle: 90.0,
            right_angle: 90.0,
        };
        let q = score_quality(&inputs, &Config::default());
        let expected_total = (0.05f64.powi(2) + 0.2f64.powi(2) + 0.05f64.powi(2) + 0.1f64.powi(2)).sqrt();
        assert_approx_eq!(q.total_uncertainty, expected_total, 1e-12);
        assert_eq!(q.confidence_label, ConfidenceLabel::High);
    }

    #[test]
    fn losing_fits_count_towards_systematic_uncertainty() {
        let baseline = LineModel::horizontal(100.0);
        let l = TangentEstimate {
            rival_residual: Some(0.25),
            ..tangent(0.05, 0.1)
        };
        let r = tangent(0.06, 0.1);
        let inputs = QualityInputs {
            contour_roughness: 0.02,
            baseline: &baseline,
            left_tangent: &l,
            right_tangent: &r,
            left_angle: 90.0,
            right_angle: 90.0,
        };
        let q = score_quality(&inputs, &Config::default());
        assert_approx_eq!(q.systematic_uncertainty, (0.05 + 0.25 + 0.06) / 3.0, 1e-12);
    }

    #[test]
    fn total_uncertainty_is_capped() {
        let baseline = LineModel::horizontal(100.0);
        let (l, r) = (tangent(9.0, 30.0), tangent(7.0, 12.0));
        let inputs = QualityInputs {
            contour_roughness: 1.5,
            baseline: &baseline,
            left_tangent: &l,
            right_tangent: &r,
            left_angle: 40.0,
            right_angle: 150.0,
        };
        let q = score_quality(&inputs, &Config::default());
        assert_approx_eq!(q.total_uncertainty, 5.0);
        assert_approx_eq!(q.reliability, 0.0);
        assert_approx_eq!(q.symmetry, 0.0);
        assert_eq!(q.confidence_label, ConfidenceLabel::Low);
    }

    #[test]
    fn labels_follow_thresholds() {
        assert_eq!(ConfidenceLabel::from_quality(0.81), ConfidenceLabel::High);
        assert_eq!(ConfidenceLabel::from_quality(0.8), ConfidenceLabel::Medium);
        assert_eq!(ConfidenceLabel::from_quality(0.6), ConfidenceLabel::Low);
    }
}
