// src/tangent.rs - Local boundary tangent at a contact point

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::contact::refine_subpixel;
use crate::contour::Contour;
use crate::errors::{ContactAngleError, Result};
use crate::fitting::{
    fit_circle_robust, pca_direction, secant_direction, theil_sen_direction, Axis, LocalQuadratic,
};
use crate::geometry::{centroid, LineModel, Point};
use crate::image_utils::GrayscaleImage;

/// Share of neighbourhood points kept by the trimmed circle refits
const CIRCLE_KEEP_FRACTION: f64 = 0.65;
const CIRCLE_PASSES: usize = 2;
/// Largest move accepted when snapping a boundary point onto the grey edge
const EDGE_SNAP_MAX_OFFSET: f64 = 3.0;
const EDGE_SNAP_MIN_POINTS: usize = 5;

/// Estimator that produced a tangent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TangentMethod {
    Quadratic,
    Circle,
    Pca,
    TheilSen,
    Secant,
}

/// Boundary tangent at a contact point.
///
/// `direction` is a unit vector in image coordinates pointing from the contact
/// point along the boundary, away from the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TangentEstimate {
    pub direction: (f64, f64),
    /// Image-frame slope `dy/dx`; infinite for a vertical tangent
    pub slope: f64,
    pub method: TangentMethod,
    /// RMS residual of the winning fit (0 for the direct estimators)
    pub residual: f64,
    /// Largest residual of the winning fit
    pub max_residual: f64,
    /// RMS residual of the local fit that lost, when both fits succeeded
    #[serde(default)]
    pub rival_residual: Option<f64>,
    pub support: usize,
    /// Unit chord from the contact point to the neighbourhood centroid
    pub chord: (f64, f64),
}

impl TangentEstimate {
    fn new(direction: (f64, f64), method: TangentMethod, residual: f64, max_residual: f64, support: usize) -> Self {
        let slope = if direction.0.abs() < 1e-12 {
            f64::INFINITY
        } else {
            direction.1 / direction.0
        };
        Self {
            direction,
            slope,
            method,
            residual,
            max_residual,
            rival_residual: None,
            support,
            chord: (0.0, 0.0),
        }
    }

    pub fn is_vertical(&self) -> bool {
        self.slope.is_infinite()
    }
}

/// Sign of the baseline half-plane holding the droplet: -1 above the line
/// in image coordinates, +1 below
pub fn droplet_side(contour: &Contour, baseline: &LineModel) -> f64 {
    if baseline.signed_distance(&contour.centroid()) > 0.0 {
        1.0
    } else {
        -1.0
    }
}

/// Contour points nearest to `contact` that lie on the droplet side of the
/// baseline with at least `clearance` pixels to spare. Falls back to the ring
/// window around the nearest contour point when too few qualify.
pub fn tangent_neighbourhood(
    contour: &Contour,
    contact: &Point,
    baseline: &LineModel,
    half_window: usize,
    clearance: f64,
) -> Vec<Point> {
    let count = 2 * half_window + 1;
    let side = droplet_side(contour, baseline);

    let mut eligible: Vec<(f64, Point)> = contour
        .points()
        .iter()
        .filter(|p| side * baseline.signed_distance(p) >= clearance)
        .map(|p| (p.distance(contact), *p))
        .collect();
    if eligible.len() >= 3 {
        eligible.sort_by(|a, b| a.0.total_cmp(&b.0));
        return eligible.into_iter().take(count).map(|(_, p)| p).collect();
    }

    match contour.nearest_index(contact) {
        Some(center) => {
            let h = half_window.min(contour.len().saturating_sub(1) / 2) as isize;
            (-h..=h).map(|k| contour.wrapped(center as isize + k)).collect()
        }
        None => Vec::new(),
    }
}

/// Move each point onto the strongest grey-level edge along the common
/// normal of `points`. Points whose edge is weak or more than a few pixels
/// away are dropped; when fewer than half survive the input is returned.
pub fn snap_to_edge(points: &[Point], image: &GrayscaleImage, config: &Config) -> Vec<Point> {
    let Some((tx, ty)) = pca_direction(points) else {
        return points.to_vec();
    };
    let normal = (-ty, tx);
    let snapped: Vec<Point> = points
        .iter()
        .filter_map(|p| {
            let r = refine_subpixel(
                image,
                p,
                normal,
                config.refine_samples,
                config.refine_spacing,
                config.refine_min_gradient,
            );
            (r.refined && r.offset.abs() <= EDGE_SNAP_MAX_OFFSET).then_some(r.position)
        })
        .collect();
    if snapped.len() >= EDGE_SNAP_MIN_POINTS.max(points.len() / 2) {
        snapped
    } else {
        debug!("tangent: {} of {} points on the grey edge, keeping the outline", snapped.len(), points.len());
        points.to_vec()
    }
}

/// Unit vector from the contact point to the neighbourhood centroid
fn chord_direction(contact: &Point, neighbourhood: &[Point]) -> (f64, f64) {
    centroid(neighbourhood)
        .and_then(|c| secant_direction(contact, &c))
        .unwrap_or((0.0, 0.0))
}

/// Flip `direction` so it points along the chord into the neighbourhood
fn orient(direction: (f64, f64), chord: (f64, f64)) -> (f64, f64) {
    if direction.0 * chord.0 + direction.1 * chord.1 < 0.0 {
        (-direction.0, -direction.1)
    } else {
        direction
    }
}

fn quadratic_candidate(neighbourhood: &[Point], contact: &Point) -> Option<TangentEstimate> {
    match LocalQuadratic::fit(neighbourhood, *contact) {
        Ok(fit) => {
            let direction = fit.direction()?;
            let max_residual = neighbourhood
                .iter()
                .map(|p| match fit.axis {
                    Axis::X => (p.y - fit.value_at(p.x)).abs(),
                    Axis::Y => (p.x - fit.value_at(p.y)).abs(),
                })
                .fold(0.0, f64::max);
            Some(TangentEstimate::new(
                direction,
                TangentMethod::Quadratic,
                fit.rms_residual,
                max_residual,
                neighbourhood.len(),
            ))
        }
        Err(e) => {
            debug!("tangent: {}", e);
            None
        }
    }
}

/// The tangent is taken where the fitted circle meets the baseline, unless
/// that foot lies beyond the neighbourhood, in which case the contact is used
fn circle_candidate(neighbourhood: &[Point], contact: &Point, baseline: &LineModel) -> Option<TangentEstimate> {
    let fit = fit_circle_robust(neighbourhood, CIRCLE_KEEP_FRACTION, CIRCLE_PASSES)?;
    let reach = neighbourhood.iter().map(|p| p.distance(contact)).fold(0.0, f64::max);
    let foot = fit
        .circle
        .intersect_line(baseline)
        .into_iter()
        .min_by(|a, b| a.distance(contact).total_cmp(&b.distance(contact)))
        .filter(|p| p.distance(contact) <= reach)
        .unwrap_or(*contact);
    let (rx, ry) = (foot.x - fit.circle.center_x, foot.y - fit.circle.center_y);
    let norm = rx.hypot(ry);
    if norm < 1e-9 {
        return None;
    }
    Some(TangentEstimate::new(
        (-ry / norm, rx / norm),
        TangentMethod::Circle,
        fit.rms_residual,
        fit.max_residual,
        fit.retained,
    ))
}

/// Tangent at `contact` from the surrounding boundary.
///
/// With an image the neighbourhood is first snapped onto the grey-level edge.
/// The quadratic and robust circle fits compete on RMS residual; when both
/// fail the estimate degrades to PCA, then Theil–Sen, then a secant.
pub fn estimate_tangent(
    contour: &Contour,
    contact: &Point,
    baseline: &LineModel,
    image: Option<&GrayscaleImage>,
    config: &Config,
) -> Result<TangentEstimate> {
    let mut neighbourhood = tangent_neighbourhood(
        contour,
        contact,
        baseline,
        config.tangent_half_window,
        config.tangent_clearance(),
    );
    if neighbourhood.len() < 2 {
        return Err(ContactAngleError::DegenerateGeometry(format!(
            "only {} boundary points near contact ({:.1}, {:.1})",
            neighbourhood.len(),
            contact.x,
            contact.y
        )));
    }
    if let Some(image) = image {
        neighbourhood = snap_to_edge(&neighbourhood, image, config);
    }

    let quadratic = quadratic_candidate(&neighbourhood, contact);
    let circle = circle_candidate(&neighbourhood, contact, baseline);
    let fitted = match (quadratic, circle) {
        (Some(q), Some(c)) => {
            let (winner, loser) = if c.residual < q.residual { (c, q) } else { (q, c) };
            Some(TangentEstimate {
                rival_residual: Some(loser.residual),
                ..winner
            })
        }
        (q, c) => q.or(c),
    };

    let estimate = match fitted {
        Some(estimate) => estimate,
        None => {
            warn!("tangent: local fits failed near ({:.1}, {:.1}), using direct estimators", contact.x, contact.y);
            let n = neighbourhood.len();
            let fallback = pca_direction(&neighbourhood)
                .map(|d| TangentEstimate::new(d, TangentMethod::Pca, 0.0, 0.0, n))
                .or_else(|| {
                    theil_sen_direction(&neighbourhood)
                        .map(|d| TangentEstimate::new(d, TangentMethod::TheilSen, 0.0, 0.0, n))
                })
                .or_else(|| {
                    let far = neighbourhood
                        .iter()
                        .max_by(|a, b| a.distance(contact).total_cmp(&b.distance(contact)))?;
                    secant_direction(contact, far)
                        .map(|d| TangentEstimate::new(d, TangentMethod::Secant, 0.0, 0.0, n))
                });
            fallback.ok_or_else(|| {
                ContactAngleError::DegenerateGeometry("no tangent direction near contact".to_string())
            })?
        }
    };

    let chord = chord_direction(contact, &neighbourhood);
    let direction = orient(estimate.direction, chord);
    let estimate = TangentEstimate {
        chord,
        rival_residual: estimate.rival_residual,
        ..TangentEstimate::new(
            direction,
            estimate.method,
            estimate.residual,
            estimate.max_residual,
            estimate.support,
        )
    };
    debug!(
        "tangent at ({:.1}, {:.1}): {:?}, direction ({:.3}, {:.3}), residual {:.3}",
        contact.x, contact.y, estimate.method, direction.0, direction.1, estimate.residual
    );
    Ok(estimate)
}
