// src/contact.rs - Contact point localisation and subpixel edge refinement

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::baseline::ContactHints;
use crate::config::Config;
use crate::contour::Contour;
use crate::errors::{ContactAngleError, Result};
use crate::geometry::{median, LineModel, Point, Scale};
use crate::image_utils::GrayscaleImage;
use crate::tangent::estimate_tangent;

/// Which end of the baseline a contact point belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

/// How the initial contact position was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContactSource {
    Hint,
    Intersection,
    NearestWithinEpsilon,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContactPoint {
    pub side: Side,
    /// Final (subpixel) position
    pub position: Point,
    /// Position before refinement
    pub initial: Point,
    /// Image-frame slope of the boundary tangent at the contact
    pub tangent_slope: f64,
    /// Edge gradient signal-to-noise next to the contact
    pub edge_snr: f64,
    pub refined: bool,
    pub source: ContactSource,
}

impl ContactPoint {
    pub fn scaled(&self, scale: Scale) -> ContactPoint {
        ContactPoint {
            position: self.position.scaled(scale),
            initial: self.initial.scaled(scale),
            ..*self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContactPair {
    pub left: ContactPoint,
    pub right: ContactPoint,
}

/// Outcome of sampling intensity along an edge normal
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeRefinement {
    pub position: Point,
    /// Signed displacement along the normal, in pixels
    pub offset: f64,
    pub peak_gradient: f64,
    pub edge_snr: f64,
    pub refined: bool,
}

/// Points where consecutive contour points straddle the baseline
pub fn baseline_crossings(contour: &Contour, baseline: &LineModel) -> Vec<Point> {
    let n = contour.len();
    let mut crossings = Vec::new();
    for i in 0..n {
        let a = contour.wrapped(i as isize);
        let b = contour.wrapped(i as isize + 1);
        let (da, db) = (baseline.signed_distance(&a), baseline.signed_distance(&b));
        if da == 0.0 {
            crossings.push(a);
        } else if da * db < 0.0 {
            let t = da / (da - db);
            crossings.push(Point::new(a.x + t * (b.x - a.x), a.y + t * (b.y - a.y)));
        }
    }
    crossings
}

/// Contour points within `epsilon` of the baseline, projected onto it
pub fn nearest_within_epsilon(contour: &Contour, baseline: &LineModel, epsilon: f64) -> Vec<Point> {
    contour
        .points()
        .iter()
        .filter(|p| baseline.distance(p) <= epsilon)
        .map(|p| baseline.project(p))
        .collect()
}

fn extremes(points: &[Point]) -> Option<(Point, Point)> {
    let left = points.iter().copied().min_by(|a, b| a.x.total_cmp(&b.x))?;
    let right = points.iter().copied().max_by(|a, b| a.x.total_cmp(&b.x))?;
    (right.x - left.x > 1.0).then_some((left, right))
}

/// Initial left and right contacts: detector hints first, then the outermost
/// baseline crossings, then the outermost points within `epsilon`
pub fn initial_contacts(
    contour: &Contour,
    baseline: &LineModel,
    hints: Option<&ContactHints>,
    epsilon: f64,
) -> Result<(Point, Point, ContactSource)> {
    if let Some(h) = hints {
        return Ok((baseline.project(&h.left), baseline.project(&h.right), ContactSource::Hint));
    }

    let mut candidates = baseline_crossings(contour, baseline);
    if let Some((left, right)) = extremes(&candidates) {
        return Ok((left, right, ContactSource::Intersection));
    }

    debug!(
        "contact: {} baseline crossings, widening to {:.1} px",
        candidates.len(),
        epsilon
    );
    candidates.extend(nearest_within_epsilon(contour, baseline, epsilon));
    extremes(&candidates)
        .map(|(left, right)| (left, right, ContactSource::NearestWithinEpsilon))
        .ok_or_else(|| {
            ContactAngleError::DegenerateGeometry(format!(
                "contour never comes within {:.1} px of the baseline",
                epsilon
            ))
        })
}

/// Locate the strongest edge along `normal` through `origin`.
///
/// Samples `samples` bilinear intensities `spacing` pixels apart, takes central
/// differences and refines the |gradient| peak with a parabola through its
/// neighbours (offset clamped to one sample). Below `min_gradient` the origin
/// is returned unchanged.
pub fn refine_subpixel(
    image: &GrayscaleImage,
    origin: &Point,
    normal: (f64, f64),
    samples: usize,
    spacing: f64,
    min_gradient: f64,
) -> EdgeRefinement {
    let unchanged = EdgeRefinement {
        position: *origin,
        offset: 0.0,
        peak_gradient: 0.0,
        edge_snr: 0.0,
        refined: false,
    };
    let norm = normal.0.hypot(normal.1);
    if samples < 5 || norm < 1e-12 || spacing <= 0.0 {
        return unchanged;
    }
    let (nx, ny) = (normal.0 / norm, normal.1 / norm);

    let half = (samples - 1) as f64 / 2.0;
    let offsets: Vec<f64> = (0..samples).map(|i| (i as f64 - half) * spacing).collect();
    let intensity: Vec<f64> = offsets
        .iter()
        .map(|t| image.sample_bilinear(origin.x + t * nx, origin.y + t * ny))
        .collect();
    let gradient: Vec<f64> = (1..samples - 1)
        .map(|i| ((intensity[i + 1] - intensity[i - 1]) / (2.0 * spacing)).abs())
        .collect();

    // gradient[k] belongs to sample k + 1
    let Some((k, &peak)) = gradient
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
    else {
        return unchanged;
    };
    let noise = median(&gradient).unwrap_or(0.0);
    let edge_snr = peak / (noise + 1.0);
    if peak < min_gradient {
        return EdgeRefinement { edge_snr, peak_gradient: peak, ..unchanged };
    }

    let mut delta = 0.0;
    if k >= 1 && k + 1 < gradient.len() {
        let (a, b, c) = (gradient[k - 1], peak, gradient[k + 1]);
        let denom = a - 2.0 * b + c;
        if denom.abs() > 1e-12 {
            delta = (0.5 * (a - c) / denom).clamp(-1.0, 1.0);
        }
    }
    let offset = offsets[k + 1] + delta * spacing;
    EdgeRefinement {
        position: Point::new(origin.x + offset * nx, origin.y + offset * ny),
        offset,
        peak_gradient: peak,
        edge_snr,
        refined: true,
    }
}

/// Edge contrast a little way up the boundary from the contact, where the
/// droplet edge is clear of the substrate
fn edge_contrast(image: &GrayscaleImage, contact: &Point, direction: (f64, f64), config: &Config) -> f64 {
    let reach = 2.0 * config.tangent_baseline_clearance + 2.0;
    let above = Point::new(contact.x + reach * direction.0, contact.y + reach * direction.1);
    refine_subpixel(
        image,
        &above,
        (-direction.1, direction.0),
        config.refine_samples,
        config.refine_spacing,
        config.refine_min_gradient,
    )
    .edge_snr
}

fn localize_one(
    side: Side,
    initial: Point,
    source: ContactSource,
    contour: &Contour,
    baseline: &LineModel,
    image: Option<&GrayscaleImage>,
    config: &Config,
) -> ContactPoint {
    let mut contact = ContactPoint {
        side,
        position: initial,
        initial,
        tangent_slope: f64::NAN,
        edge_snr: 0.0,
        refined: false,
        source,
    };

    let tangent = match estimate_tangent(contour, &initial, baseline, image, config) {
        Ok(t) => t,
        Err(e) => {
            warn!("contact {:?}: no tangent for refinement: {}", side, e);
            return contact;
        }
    };
    contact.tangent_slope = tangent.slope;

    if let Some(image) = image {
        let normal = (-tangent.direction.1, tangent.direction.0);
        let refinement = refine_subpixel(
            image,
            &initial,
            normal,
            config.refine_samples,
            config.refine_spacing,
            config.refine_min_gradient,
        );
        contact.position = refinement.position;
        contact.refined = refinement.refined;
        contact.edge_snr = edge_contrast(image, &initial, tangent.direction, config);
        debug!(
            "contact {:?}: ({:.2}, {:.2}) -> ({:.2}, {:.2}), peak {:.1}, snr {:.2}",
            side,
            initial.x,
            initial.y,
            contact.position.x,
            contact.position.y,
            refinement.peak_gradient,
            contact.edge_snr
        );
    }
    contact
}

/// Find both contact points; refinement needs the preprocessed image and is
/// skipped without one
pub fn localize_contacts(
    contour: &Contour,
    baseline: &LineModel,
    hints: Option<&ContactHints>,
    image: Option<&GrayscaleImage>,
    config: &Config,
) -> Result<ContactPair> {
    let (left, right, source) = initial_contacts(contour, baseline, hints, config.contact_epsilon)?;
    Ok(ContactPair {
        left: localize_one(Side::Left, left, source, contour, baseline, image, config),
        right: localize_one(Side::Right, right, source, contour, baseline, image, config),
    })
}
