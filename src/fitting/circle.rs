// src/fitting/circle.rs - Algebraic circle fits (Kåsa, Taubin) and a trimmed robust wrapper

use nalgebra::{Matrix3, Vector3};

use crate::geometry::{centroid, CircleModel, Point};

/// Result of a robust circle fit
#[derive(Debug, Clone, Copy)]
pub struct CircleFit {
    pub circle: CircleModel,
    /// RMS geometric residual over the retained points
    pub rms_residual: f64,
    /// Largest geometric residual over the retained points
    pub max_residual: f64,
    pub retained: usize,
}

fn valid_circle(circle: CircleModel) -> Option<CircleModel> {
    let ok = circle.center_x.is_finite()
        && circle.center_y.is_finite()
        && circle.radius.is_finite()
        && circle.radius > 1e-6;
    ok.then_some(circle)
}

/// Kåsa fit: linear least squares on `x² + y² + D x + E y + F = 0`
pub fn fit_circle_kasa(points: &[Point]) -> Option<CircleModel> {
    if points.len() < 3 {
        return None;
    }
    let c = centroid(points)?;
    let mut normal = Matrix3::<f64>::zeros();
    let mut rhs = Vector3::<f64>::zeros();
    for p in points {
        let (x, y) = (p.x - c.x, p.y - c.y);
        let row = Vector3::new(x, y, 1.0);
        normal += row * row.transpose();
        rhs += row * -(x * x + y * y);
    }
    let solution = normal.lu().solve(&rhs)?;
    let (d, e, f) = (solution[0], solution[1], solution[2]);
    let (cx, cy) = (-0.5 * d, -0.5 * e);
    let r_sq = cx * cx + cy * cy - f;
    if r_sq <= 0.0 {
        return None;
    }
    valid_circle(CircleModel {
        center_x: cx + c.x,
        center_y: cy + c.y,
        radius: r_sq.sqrt(),
    })
}

/// Taubin fit solved by Newton iteration on its characteristic polynomial;
/// better conditioned than Kåsa on short arcs
pub fn fit_circle_taubin(points: &[Point]) -> Option<CircleModel> {
    if points.len() < 3 {
        return None;
    }
    let c = centroid(points)?;
    let n = points.len() as f64;
    let (mut mxx, mut myy, mut mxy, mut mxz, mut myz, mut mzz) = (0.0, 0.0, 0.0, 0.0, 0.0, 0.0);
    for p in points {
        let (x, y) = (p.x - c.x, p.y - c.y);
        let z = x * x + y * y;
        mxx += x * x;
        myy += y * y;
        mxy += x * y;
        mxz += x * z;
        myz += y * z;
        mzz += z * z;
    }
    mxx /= n;
    myy /= n;
    mxy /= n;
    mxz /= n;
    myz /= n;
    mzz /= n;

    let mz = mxx + myy;
    let cov_xy = mxx * myy - mxy * mxy;
    let var_z = mzz - mz * mz;
    let a3 = 4.0 * mz;
    let a2 = -3.0 * mz * mz - mzz;
    let a1 = var_z * mz + 4.0 * cov_xy * mz - mxz * mxz - myz * myz;
    let a0 = mxz * (mxz * myy - myz * mxy) + myz * (myz * mxx - mxz * mxy) - var_z * cov_xy;
    let a22 = a2 + a2;
    let a33 = a3 + a3 + a3;

    let mut x = 0.0;
    let mut y = a0;
    for _ in 0..100 {
        let dy = a1 + x * (a22 + a33 * x);
        if dy == 0.0 {
            break;
        }
        let x_new = x - y / dy;
        if x_new == x || !x_new.is_finite() {
            break;
        }
        let y_new = a0 + x_new * (a1 + x_new * (a2 + x_new * a3));
        if y_new.abs() >= y.abs() {
            break;
        }
        x = x_new;
        y = y_new;
    }

    let det = x * x - x * mz + cov_xy;
    if det.abs() < 1e-12 {
        return None;
    }
    let center_x = (mxz * (myy - x) - myz * mxy) / det / 2.0;
    let center_y = (myz * (mxx - x) - mxz * mxy) / det / 2.0;
    valid_circle(CircleModel {
        center_x: center_x + c.x,
        center_y: center_y + c.y,
        radius: (center_x * center_x + center_y * center_y + mz).sqrt(),
    })
}

fn residual_stats(circle: &CircleModel, points: &[Point]) -> (f64, f64) {
    if points.is_empty() {
        return (0.0, 0.0);
    }
    let (sum_sq, max) = points.iter().fold((0.0, 0.0f64), |(s, m), p| {
        let r = circle.residual(p);
        (s + r * r, m.max(r))
    });
    ((sum_sq / points.len() as f64).sqrt(), max)
}

/// Kåsa initialisation followed by trimmed Taubin refits that keep the
/// `keep_fraction` of points with the smallest residuals
pub fn fit_circle_robust(points: &[Point], keep_fraction: f64, passes: usize) -> Option<CircleFit> {
    let mut circle = fit_circle_kasa(points).or_else(|| fit_circle_taubin(points))?;
    let keep = ((points.len() as f64 * keep_fraction.clamp(0.1, 1.0)).round() as usize)
        .clamp(3.min(points.len()), points.len());

    let mut retained: Vec<Point> = points.to_vec();
    for _ in 0..passes {
        let mut ranked: Vec<(f64, Point)> = points.iter().map(|p| (circle.residual(p), *p)).collect();
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0));
        retained = ranked.into_iter().take(keep).map(|(_, p)| p).collect();
        match fit_circle_taubin(&retained).or_else(|| fit_circle_kasa(&retained)) {
            Some(refined) => circle = refined,
            None => break,
        }
    }

    let (rms_residual, max_residual) = residual_stats(&circle, &retained);
    Some(CircleFit {
        circle,
        rms_residual,
        max_residual,
        retained: retained.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn arc(cx: f64, cy: f64, r: f64, from_deg: f64, to_deg: f64, count: usize) -> Vec<Point> {
        (0..count)
            .map(|i| {
                let t = (from_deg + (to_deg - from_deg) * i as f64 / (count - 1) as f64).to_radians();
                Point::new(cx + r * t.cos(), cy + r * t.sin())
            })
            .collect()
    }

    #[test]
    fn kasa_recovers_full_circle() {
        let c = fit_circle_kasa(&arc(50.0, 40.0, 20.0, 0.0, 350.0, 36)).unwrap();
        assert_approx_eq!(c.center_x, 50.0, 1e-6);
        assert_approx_eq!(c.center_y, 40.0, 1e-6);
        assert_approx_eq!(c.radius, 20.0, 1e-6);
    }

    #[test]
    fn taubin_recovers_short_arc() {
        let c = fit_circle_taubin(&arc(-10.0, 5.0, 80.0, 10.0, 40.0, 25)).unwrap();
        assert_approx_eq!(c.center_x, -10.0, 1e-5);
        assert_approx_eq!(c.center_y, 5.0, 1e-5);
        assert_approx_eq!(c.radius, 80.0, 1e-5);
    }

    #[test]
    fn collinear_points_have_no_circle() {
        let line: Vec<Point> = (0..10).map(|i| Point::new(i as f64, 2.0 * i as f64)).collect();
        assert!(fit_circle_kasa(&line).is_none());
    }

    #[test]
    fn robust_fit_ignores_outliers() {
        let mut points = arc(0.0, 0.0, 30.0, 0.0, 180.0, 40);
        points.push(Point::new(0.0, 80.0));
        points.push(Point::new(60.0, -40.0));
        let fit = fit_circle_robust(&points, 0.65, 3).unwrap();
        assert_approx_eq!(fit.circle.radius, 30.0, 1e-4);
        assert!(fit.max_residual < 1e-4);
    }
}
