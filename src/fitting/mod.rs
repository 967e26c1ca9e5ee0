// src/fitting/mod.rs - Least-squares and robust estimators for the baseline and tangent stages

pub mod circle;
pub mod ellipse;
pub mod line;
pub mod local;

pub use circle::{fit_circle_kasa, fit_circle_robust, fit_circle_taubin, CircleFit};
pub use ellipse::fit_ellipse;
pub use line::{fit_line_ransac, fit_line_ridge, LineFitParams};
pub use local::{
    pca_direction, secant_direction, theil_sen_direction, Axis, LocalQuadratic,
};
