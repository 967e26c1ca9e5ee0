// src/angle.rs - Contact angle from the tangent and baseline directions

use serde::{Deserialize, Serialize};

use crate::contact::{ContactPair, Side};
use crate::errors::{ContactAngleError, Result};
use crate::geometry::LineModel;
use crate::tangent::TangentEstimate;

/// Below this many degrees the tangent is treated as parallel to the baseline
const NEAR_PARALLEL_DEG: f64 = 2.0;

/// Baseline direction from a contact point towards the droplet, image frame
pub fn baseline_toward_droplet(baseline: &LineModel, side: Side) -> (f64, f64) {
    let (dx, dy) = baseline.direction();
    match side {
        Side::Left => (dx, dy),
        Side::Right => (-dx, -dy),
    }
}

#[inline]
fn to_y_up(v: (f64, f64)) -> (f64, f64) {
    (v.0, -v.1)
}

fn unit(v: (f64, f64)) -> Option<(f64, f64)> {
    let norm = v.0.hypot(v.1);
    (norm > 1e-12 && norm.is_finite()).then(|| (v.0 / norm, v.1 / norm))
}

/// Angle for an exactly vertical tangent: `90° ± atan(m)` depending on side
/// and on whether the boundary rises or falls from the baseline
pub fn vertical_tangent_angle(baseline_slope: f64, side: Side, rising: bool) -> f64 {
    let tilt = baseline_slope.atan().to_degrees();
    match (side, rising) {
        (Side::Left, true) | (Side::Right, false) => 90.0 + tilt,
        (Side::Right, true) | (Side::Left, false) => 90.0 - tilt,
    }
}

/// Interior angle in degrees between the oriented tangent and the baseline
/// direction pointing into the droplet, measured in a y-up frame
pub fn contact_angle(tangent: &TangentEstimate, baseline: &LineModel, side: Side) -> Result<f64> {
    if !baseline.slope.is_finite() {
        return Err(ContactAngleError::DegenerateGeometry(format!(
            "baseline slope {}",
            baseline.slope
        )));
    }

    if tangent.is_vertical() {
        let rising = tangent.direction.1 < 0.0;
        return Ok(vertical_tangent_angle(baseline.slope, side, rising));
    }

    let t = unit(to_y_up(tangent.direction)).ok_or_else(|| {
        ContactAngleError::DegenerateGeometry("zero-length tangent".to_string())
    })?;
    let b = unit(to_y_up(baseline_toward_droplet(baseline, side))).ok_or_else(|| {
        ContactAngleError::DegenerateGeometry("zero-length baseline direction".to_string())
    })?;

    let angle = (t.0 * b.0 + t.1 * b.1).clamp(-1.0, 1.0).acos().to_degrees();
    let acute = angle.min(180.0 - angle);
    if acute >= NEAR_PARALLEL_DEG {
        return Ok(angle);
    }

    // Nearly parallel: the tangent's orientation is unreliable, so blend
    // between the two readings by where the boundary actually goes
    match unit(to_y_up(tangent.chord)) {
        Some(chord) => {
            let along = (chord.0 * b.0 + chord.1 * b.1).clamp(-1.0, 1.0);
            let weight = 0.5 * (1.0 - along);
            Ok((acute * (1.0 - weight) + (180.0 - acute) * weight).clamp(0.0, 180.0))
        }
        None => Ok(angle),
    }
}

/// Per-side angles with their summary
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AngleSummary {
    pub left_deg: f64,
    pub right_deg: f64,
    pub mean_deg: f64,
    pub best_deg: f64,
    pub best_side: Side,
}

/// Side with the stronger edge; equal contrast falls back to the smaller
/// tangent residual, then to the left side
pub fn best_side(contacts: &ContactPair, left: &TangentEstimate, right: &TangentEstimate) -> Side {
    let (l, r) = (contacts.left.edge_snr, contacts.right.edge_snr);
    if (l - r).abs() > 1e-9 {
        return if l > r { Side::Left } else { Side::Right };
    }
    if right.residual < left.residual {
        Side::Right
    } else {
        Side::Left
    }
}

pub fn summarize(
    contacts: &ContactPair,
    left: &TangentEstimate,
    right: &TangentEstimate,
    baseline: &LineModel,
) -> Result<AngleSummary> {
    let left_deg = contact_angle(left, baseline, Side::Left)?;
    let right_deg = contact_angle(right, baseline, Side::Right)?;
    let best_side = best_side(contacts, left, right);
    let best_deg = match best_side {
        Side::Left => left_deg,
        Side::Right => right_deg,
    };
    Ok(AngleSummary {
        left_deg,
        right_deg,
        mean_deg: 0.5 * (left_deg + right_deg),
        best_deg,
        best_side,
    })
}
