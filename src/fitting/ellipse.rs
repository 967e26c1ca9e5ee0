// src/fitting/ellipse.rs - Algebraic ellipse fit for the overlay and the service response

use nalgebra::{Matrix6, SymmetricEigen, Vector6};

use crate::geometry::{BoundingBox, EllipseModel, Point};

/// Conic `A x² + B xy + C y² + D x + E y + F = 0`
type Conic = [f64; 6];

/// Shift to the centroid and scale so the mean radius is √2
fn normalization(points: &[Point]) -> (f64, f64, f64) {
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.x).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.y).sum::<f64>() / n;
    let mean_dist = points
        .iter()
        .map(|p| (p.x - mean_x).hypot(p.y - mean_y))
        .sum::<f64>()
        / n;
    let scale = if mean_dist > 1e-15 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };
    (mean_x, mean_y, scale)
}

fn denormalize(c: &Vector6<f64>, mx: f64, my: f64, s: f64) -> Conic {
    let (a_, b_, c_, d_, e_, f_) = (c[0], c[1], c[2], c[3], c[4], c[5]);
    let s2 = s * s;
    [
        a_ * s2,
        b_ * s2,
        c_ * s2,
        -2.0 * a_ * s2 * mx - b_ * s2 * my + d_ * s,
        -b_ * s2 * mx - 2.0 * c_ * s2 * my + e_ * s,
        a_ * s2 * mx * mx + b_ * s2 * mx * my + c_ * s2 * my * my - d_ * s * mx - e_ * s * my + f_,
    ]
}

/// Least-squares conic with unit coefficient norm: the eigenvector of the
/// smallest eigenvalue of the scatter matrix
fn fit_conic(points: &[Point]) -> Option<Conic> {
    if points.len() < 6 {
        return None;
    }
    let (mx, my, s) = normalization(points);
    let mut scatter = Matrix6::<f64>::zeros();
    for p in points {
        let (x, y) = ((p.x - mx) * s, (p.y - my) * s);
        let row = Vector6::new(x * x, x * y, y * y, x, y, 1.0);
        scatter += row * row.transpose();
    }
    let eigen = SymmetricEigen::new(scatter);
    let smallest = eigen.eigenvalues.imin();
    let coeffs: Vector6<f64> = eigen.eigenvectors.column(smallest).into_owned();
    if coeffs.iter().any(|v| !v.is_finite()) {
        return None;
    }
    Some(denormalize(&coeffs, mx, my, s))
}

/// Geometric parameters of an elliptic conic; `None` for other conics
fn conic_to_ellipse(conic: &Conic) -> Option<EllipseModel> {
    let [a, b, c, d, e, f] = *conic;
    let denom = 4.0 * a * c - b * b;
    if denom <= 0.0 {
        return None;
    }
    let cx = (b * e - 2.0 * c * d) / denom;
    let cy = (b * d - 2.0 * a * e) / denom;

    let angle = if (a - c).abs() < 1e-15 {
        if b > 0.0 {
            std::f64::consts::FRAC_PI_4
        } else if b < 0.0 {
            -std::f64::consts::FRAC_PI_4
        } else {
            0.0
        }
    } else {
        0.5 * b.atan2(a - c)
    };

    let sum = a + c;
    let diff = ((a - c).powi(2) + b * b).sqrt();
    let (lambda1, lambda2) = ((sum + diff) / 2.0, (sum - diff) / 2.0);
    let f_center = a * cx * cx + b * cx * cy + c * cy * cy + d * cx + e * cy + f;
    if f_center.abs() < 1e-15 {
        return None;
    }
    let (a_sq, b_sq) = (-f_center / lambda1, -f_center / lambda2);
    if a_sq <= 0.0 || b_sq <= 0.0 {
        return None;
    }

    let (semi_a, semi_b, angle) = if a_sq >= b_sq {
        (a_sq.sqrt(), b_sq.sqrt(), angle)
    } else {
        (b_sq.sqrt(), a_sq.sqrt(), angle + std::f64::consts::FRAC_PI_2)
    };
    let mut angle_deg = angle.to_degrees();
    while angle_deg > 90.0 {
        angle_deg -= 180.0;
    }
    while angle_deg <= -90.0 {
        angle_deg += 180.0;
    }

    let model = EllipseModel {
        cx,
        cy,
        a: semi_a,
        b: semi_b,
        angle_deg,
    };
    [model.cx, model.cy, model.a, model.b, model.angle_deg]
        .iter()
        .all(|v| v.is_finite())
        .then_some(model)
}

/// Axis-aligned ellipse inscribed in the bounding box of the points
pub fn bounding_box_ellipse(bbox: &BoundingBox) -> EllipseModel {
    EllipseModel {
        cx: bbox.center_x(),
        cy: 0.5 * (bbox.min_y + bbox.max_y),
        a: bbox.width() / 2.0,
        b: bbox.height() / 2.0,
        angle_deg: 0.0,
    }
}

/// Fit an ellipse to the outline; falls back to the bounding box ellipse when
/// the points do not determine one. `None` only for an empty point set.
pub fn fit_ellipse(points: &[Point]) -> Option<EllipseModel> {
    let bbox = BoundingBox::from_points(points)?;
    Some(
        fit_conic(points)
            .and_then(|conic| conic_to_ellipse(&conic))
            .unwrap_or_else(|| bounding_box_ellipse(&bbox)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn recovers_rotated_ellipse() {
        let truth = EllipseModel {
            cx: 120.0,
            cy: 90.0,
            a: 40.0,
            b: 22.0,
            angle_deg: 25.0,
        };
        let points: Vec<Point> = (0..72)
            .map(|i| truth.point_at(i as f64 * std::f64::consts::TAU / 72.0))
            .collect();
        let fit = fit_ellipse(&points).unwrap();
        assert_approx_eq!(fit.cx, 120.0, 1e-6);
        assert_approx_eq!(fit.cy, 90.0, 1e-6);
        assert_approx_eq!(fit.a, 40.0, 1e-6);
        assert_approx_eq!(fit.b, 22.0, 1e-6);
        assert_approx_eq!(fit.angle_deg, 25.0, 1e-6);
    }

    #[test]
    fn collinear_points_fall_back_to_bounds() {
        let points: Vec<Point> = (0..10).map(|i| Point::new(i as f64 * 2.0, 5.0)).collect();
        let fit = fit_ellipse(&points).unwrap();
        assert_approx_eq!(fit.cx, 9.0);
        assert_approx_eq!(fit.a, 9.0);
        assert_approx_eq!(fit.b, 0.0);
        assert_eq!(fit.angle_deg, 0.0);
    }

    #[test]
    fn empty_input_has_no_ellipse() {
        assert!(fit_ellipse(&[]).is_none());
    }
}
