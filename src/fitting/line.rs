// src/fitting/line.rs - RANSAC line fitting with a ridge prior towards horizontal

use rand::rngs::StdRng;
use rand::Rng;

use crate::geometry::{LineModel, Point};

/// Parameters of a single baseline line fit
#[derive(Debug, Clone, Copy)]
pub struct LineFitParams {
    pub iterations: usize,
    /// Maximum perpendicular distance of an inlier, in pixels
    pub inlier_threshold: f64,
    /// Ridge weight on the slope; 0 gives ordinary least squares
    pub prior_weight: f64,
}

/// Least squares `y = m x + c` minimising `Σ(y - m x - c)² + w m²`
pub fn fit_line_ridge(points: &[Point], prior_weight: f64) -> Option<LineModel> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.x).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.y).sum::<f64>() / n;
    let (sxx, sxy) = points.iter().fold((0.0, 0.0), |(sxx, sxy), p| {
        let (dx, dy) = (p.x - mean_x, p.y - mean_y);
        (sxx + dx * dx, sxy + dx * dy)
    });

    let denom = sxx + prior_weight.max(0.0);
    if denom < 1e-12 {
        // Single abscissa without a prior: the line is vertical
        if points.len() == 1 || prior_weight > 0.0 {
            return Some(LineModel::horizontal(mean_y));
        }
        return None;
    }
    let slope = sxy / denom;
    if !slope.is_finite() {
        return None;
    }
    let mut line = LineModel::new(slope, mean_y - slope * mean_x);
    line.rms_residual = rms_distance(&line, points);
    line.support_points = points.to_vec();
    Some(line)
}

fn rms_distance(line: &LineModel, points: &[Point]) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = points.iter().map(|p| line.distance(p).powi(2)).sum();
    (sum_sq / points.len() as f64).sqrt()
}

/// Inliers of `line` and the sum of their distances
fn score_line(line: &LineModel, points: &[Point], threshold: f64) -> (usize, f64) {
    points.iter().fold((0usize, 0.0), |(count, total), p| {
        let d = line.distance(p);
        if d <= threshold {
            (count + 1, total + d)
        } else {
            (count, total)
        }
    })
}

/// RANSAC with a soft horizontal prior.
///
/// Each trial samples two points and shrinks their slope towards zero with
/// the ridge weight; the trial with most inliers (ties: smaller summed
/// distance) is refit over its inliers. The returned model's
/// `support_points` are the inliers of the refit line.
pub fn fit_line_ransac(points: &[Point], params: &LineFitParams, rng: &mut StdRng) -> Option<LineModel> {
    let n = points.len();
    if n < 2 {
        return None;
    }
    let w = params.prior_weight.max(0.0);

    let mut best: Option<(LineModel, usize, f64)> = None;
    for _ in 0..params.iterations.max(1) {
        let i = rng.gen_range(0..n);
        let mut j = rng.gen_range(0..n - 1);
        if j >= i {
            j += 1;
        }
        let (p, q) = (points[i], points[j]);
        let (dx, dy) = (q.x - p.x, q.y - p.y);
        let denom = dx * dx + 2.0 * w;
        if denom < 1e-12 {
            continue;
        }
        let slope = dx * dy / denom;
        let mid = Point::new(0.5 * (p.x + q.x), 0.5 * (p.y + q.y));
        let trial = LineModel::new(slope, mid.y - slope * mid.x);

        let (count, total) = score_line(&trial, points, params.inlier_threshold);
        let better = match &best {
            None => true,
            Some((_, best_count, best_total)) => {
                count > *best_count || (count == *best_count && total < *best_total)
            }
        };
        if better {
            best = Some((trial, count, total));
            if count == n {
                break;
            }
        }
    }

    let (trial, _, _) = best?;
    let inliers: Vec<Point> = points
        .iter()
        .copied()
        .filter(|p| trial.distance(p) <= params.inlier_threshold)
        .collect();
    let refit = fit_line_ridge(&inliers, w).unwrap_or(trial);

    // Final support is judged against the refit line
    let support: Vec<Point> = points
        .iter()
        .copied()
        .filter(|p| refit.distance(p) <= params.inlier_threshold)
        .collect();
    let mut line = LineModel::new(refit.slope, refit.intercept);
    line.rms_residual = rms_distance(&line, &support);
    line.support_points = support;
    Some(line)
}
