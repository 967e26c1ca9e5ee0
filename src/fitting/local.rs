// src/fitting/local.rs - Local curve fits around one contour point
//
// Quadratic, PCA, Theil–Sen and a two-point secant. All directions are unit
// vectors in image coordinates.

use nalgebra::{Matrix2, Matrix3, SymmetricEigen, Vector3};

use crate::errors::{ContactAngleError, Result};
use crate::geometry::{median, Point};

/// Independent variable of a local fit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    /// `y = f(x)`
    X,
    /// `x = f(y)`
    Y,
}

impl Axis {
    /// The coordinate with the larger spread becomes the independent variable
    pub fn dominant(points: &[Point]) -> Axis {
        let n = points.len().max(1) as f64;
        let mean_x = points.iter().map(|p| p.x).sum::<f64>() / n;
        let mean_y = points.iter().map(|p| p.y).sum::<f64>() / n;
        let var_x = points.iter().map(|p| (p.x - mean_x).powi(2)).sum::<f64>();
        let var_y = points.iter().map(|p| (p.y - mean_y).powi(2)).sum::<f64>();
        if var_x >= var_y {
            Axis::X
        } else {
            Axis::Y
        }
    }

    #[inline]
    fn split(self, p: &Point) -> (f64, f64) {
        match self {
            Axis::X => (p.x, p.y),
            Axis::Y => (p.y, p.x),
        }
    }
}

fn normalize(dx: f64, dy: f64) -> Option<(f64, f64)> {
    let norm = dx.hypot(dy);
    if norm < 1e-12 || !norm.is_finite() {
        return None;
    }
    Some((dx / norm, dy / norm))
}

/// Least-squares parabola `v = a u² + b u + c` in coordinates centred on an
/// origin and scaled to unit spread
#[derive(Debug, Clone, Copy)]
pub struct LocalQuadratic {
    pub axis: Axis,
    pub a: f64,
    pub b: f64,
    pub c: f64,
    origin: Point,
    scale: f64,
    /// RMS residual of the dependent coordinate, in pixels
    pub rms_residual: f64,
}

impl LocalQuadratic {
    pub fn fit(points: &[Point], origin: Point) -> Result<Self> {
        if points.len() < 3 {
            return Err(ContactAngleError::NumericalInstability(format!(
                "quadratic fit needs 3 points, got {}",
                points.len()
            )));
        }
        let axis = Axis::dominant(points);
        let (u0, v0) = axis.split(&origin);

        let scale = points
            .iter()
            .map(|p| (axis.split(p).0 - u0).abs())
            .fold(0.0, f64::max)
            .max(1e-9);

        let mut normal = Matrix3::<f64>::zeros();
        let mut rhs = Vector3::<f64>::zeros();
        for p in points {
            let (u, v) = axis.split(p);
            let u = (u - u0) / scale;
            let row = Vector3::new(u * u, u, 1.0);
            normal += row * row.transpose();
            rhs += row * (v - v0);
        }

        let det = normal.determinant();
        if !det.is_finite() || det.abs() < 1e-10 * (points.len() as f64).powi(3) {
            return Err(ContactAngleError::NumericalInstability(format!(
                "quadratic normal equations are singular (det {:.3e})",
                det
            )));
        }
        let solution = normal.lu().solve(&rhs).ok_or_else(|| {
            ContactAngleError::NumericalInstability("quadratic solve failed".to_string())
        })?;

        let mut fit = LocalQuadratic {
            axis,
            a: solution[0],
            b: solution[1],
            c: solution[2],
            origin,
            scale,
            rms_residual: 0.0,
        };
        let sum_sq: f64 = points
            .iter()
            .map(|p| {
                let (u, v) = axis.split(p);
                (v - fit.value_at(u)).powi(2)
            })
            .sum();
        fit.rms_residual = (sum_sq / points.len() as f64).sqrt();
        Ok(fit)
    }

    /// Dependent coordinate at an independent coordinate in the image frame
    pub fn value_at(&self, u: f64) -> f64 {
        let (u0, v0) = self.axis.split(&self.origin);
        let t = (u - u0) / self.scale;
        v0 + self.a * t * t + self.b * t + self.c
    }

    /// Derivative `dv/du` at the origin
    pub fn derivative_at_origin(&self) -> f64 {
        self.b / self.scale
    }

    /// Unit tangent at the origin
    pub fn direction(&self) -> Option<(f64, f64)> {
        let d = self.derivative_at_origin();
        match self.axis {
            Axis::X => normalize(1.0, d),
            Axis::Y => normalize(d, 1.0),
        }
    }
}

/// Principal axis of the local covariance
pub fn pca_direction(points: &[Point]) -> Option<(f64, f64)> {
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.x).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.y).sum::<f64>() / n;
    let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
    for p in points {
        let (dx, dy) = (p.x - mean_x, p.y - mean_y);
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }
    let cov = Matrix2::new(sxx / n, sxy / n, sxy / n, syy / n);
    let eigen = SymmetricEigen::new(cov);
    let major = eigen.eigenvalues.imax();
    if eigen.eigenvalues[major] < 1e-12 {
        return None;
    }
    let v = eigen.eigenvectors.column(major);
    normalize(v[0], v[1])
}

/// Median of pairwise slopes along the dominant axis
pub fn theil_sen_direction(points: &[Point]) -> Option<(f64, f64)> {
    if points.len() < 2 {
        return None;
    }
    let axis = Axis::dominant(points);
    let mut slopes = Vec::with_capacity(points.len() * (points.len() - 1) / 2);
    for (i, p) in points.iter().enumerate() {
        let (u1, v1) = axis.split(p);
        for q in &points[i + 1..] {
            let (u2, v2) = axis.split(q);
            let du = u2 - u1;
            if du.abs() > 1e-9 {
                slopes.push((v2 - v1) / du);
            }
        }
    }
    let slope = median(&slopes)?;
    match axis {
        Axis::X => normalize(1.0, slope),
        Axis::Y => normalize(slope, 1.0),
    }
}

/// Direction of the chord from `from` to `to`
pub fn secant_direction(from: &Point, to: &Point) -> Option<(f64, f64)> {
    normalize(to.x - from.x, to.y - from.y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn quadratic_derivative_matches_parabola() {
        // y = 0.02 (x - 10)^2 + 3, slope at x = 14 is 0.16
        let points: Vec<Point> = (0..21)
            .map(|i| {
                let x = i as f64;
                Point::new(x, 0.02 * (x - 10.0).powi(2) + 3.0)
            })
            .collect();
        let fit = LocalQuadratic::fit(&points, Point::new(14.0, 3.32)).unwrap();
        assert_eq!(fit.axis, Axis::X);
        assert_approx_eq!(fit.derivative_at_origin(), 0.16, 1e-9);
        assert_approx_eq!(fit.rms_residual, 0.0, 1e-9);
    }

    #[test]
    fn steep_neighbourhood_uses_transposed_fit() {
        let points: Vec<Point> = (0..15).map(|i| Point::new(20.0 + 0.1 * i as f64, 100.0 - i as f64)).collect();
        let fit = LocalQuadratic::fit(&points, points[0]).unwrap();
        assert_eq!(fit.axis, Axis::Y);
        let (dx, dy) = fit.direction().unwrap();
        assert_approx_eq!((dx / dy).abs(), 0.1, 1e-9);
    }

    #[test]
    fn repeated_point_is_singular() {
        let points = vec![Point::new(1.0, 1.0); 6];
        assert!(matches!(
            LocalQuadratic::fit(&points, Point::new(1.0, 1.0)),
            Err(ContactAngleError::NumericalInstability(_))
        ));
    }

    #[test]
    fn pca_and_theil_sen_agree_on_a_line() {
        let points: Vec<Point> = (0..10).map(|i| Point::new(i as f64, 0.5 * i as f64)).collect();
        let (px, py) = pca_direction(&points).unwrap();
        let (tx, ty) = theil_sen_direction(&points).unwrap();
        assert_approx_eq!((py / px), 0.5, 1e-9);
        assert_approx_eq!((ty / tx), 0.5, 1e-9);
    }

    #[test]
    fn theil_sen_shrugs_off_a_spike() {
        let mut points: Vec<Point> = (0..11).map(|i| Point::new(i as f64, 2.0)).collect();
        points[5].y = 5.0;
        let (dx, dy) = theil_sen_direction(&points).unwrap();
        assert_approx_eq!(dy / dx, 0.0, 1e-9);
    }

    #[test]
    fn secant_of_coincident_points_is_none() {
        let p = Point::new(3.0, 4.0);
        assert!(secant_direction(&p, &p).is_none());
        assert_eq!(secant_direction(&p, &Point::new(3.0, 9.0)), Some((0.0, 1.0)));
    }
}
