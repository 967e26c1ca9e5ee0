// src/contour.rs - Boundary tracing, angular ordering and smoothing of the droplet outline

use log::debug;
use serde::Serialize;

use crate::config::Config;
use crate::errors::{ContactAngleError, Result};
use crate::geometry::{centroid, BoundingBox, Point, Scale};
use crate::image_utils::BinaryMask;
use crate::morphology::VON_NEUMANN_NEIGHBORHOOD;

/// Closed droplet outline, ordered by polar angle around its centroid
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contour {
    points: Vec<Point>,
    #[serde(skip)]
    centroid: Point,
}

impl Contour {
    /// Order arbitrary boundary points by polar angle around their centroid
    pub fn from_unordered(mut points: Vec<Point>) -> Self {
        let center = centroid(&points).unwrap_or_default();
        points.sort_by(|a, b| {
            let angle_a = (a.y - center.y).atan2(a.x - center.x);
            let angle_b = (b.y - center.y).atan2(b.x - center.x);
            angle_a
                .total_cmp(&angle_b)
                .then_with(|| a.distance(&center).total_cmp(&b.distance(&center)))
        });
        Self { points, centroid: center }
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn centroid(&self) -> Point {
        self.centroid
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        BoundingBox::from_points(&self.points)
    }

    pub fn max_y(&self) -> f64 {
        self.points.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max)
    }

    /// Point at a ring index, wrapping in both directions
    #[inline]
    pub fn wrapped(&self, index: isize) -> Point {
        let n = self.points.len() as isize;
        self.points[index.rem_euclid(n) as usize]
    }

    /// Index of the contour point closest to `p`
    pub fn nearest_index(&self, p: &Point) -> Option<usize> {
        self.points
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| a.distance(p).total_cmp(&b.distance(p)))
            .map(|(i, _)| i)
    }

    /// Symmetric moving average around the ring; count and order are unchanged
    pub fn smoothed(&self, half_window: usize) -> Contour {
        let n = self.points.len();
        if n < 3 || half_window == 0 {
            return self.clone();
        }
        let h = half_window.min((n - 1) / 2) as isize;
        let window = (2 * h + 1) as f64;
        let points = (0..n as isize)
            .map(|i| {
                let (sx, sy) = (-h..=h).fold((0.0, 0.0), |(sx, sy), k| {
                    let p = self.wrapped(i + k);
                    (sx + p.x, sy + p.y)
                });
                Point::new(sx / window, sy / window)
            })
            .collect::<Vec<_>>();
        let center = centroid(&points).unwrap_or(self.centroid);
        Contour { points, centroid: center }
    }

    /// Mean distance of each point from the midpoint of its two neighbours
    pub fn roughness(&self) -> f64 {
        let n = self.points.len();
        if n < 3 {
            return 0.0;
        }
        let total: f64 = (0..n as isize)
            .map(|i| {
                let (prev, next) = (self.wrapped(i - 1), self.wrapped(i + 1));
                let mid = Point::new(0.5 * (prev.x + next.x), 0.5 * (prev.y + next.y));
                self.wrapped(i).distance(&mid)
            })
            .sum();
        total / n as f64
    }

    /// Same contour in a frame scaled by `scale`
    pub fn scaled(&self, scale: Scale) -> Contour {
        Contour {
            points: self.points.iter().map(|p| p.scaled(scale)).collect(),
            centroid: self.centroid.scaled(scale),
        }
    }
}

/// Foreground pixels with at least one 4-neighbour in the background
pub fn boundary_pixels(mask: &BinaryMask) -> Vec<Point> {
    let mut boundary = Vec::new();
    for y in 0..mask.height {
        for x in 0..mask.width {
            if !mask.is_set(x, y) {
                continue;
            }
            let is_border = VON_NEUMANN_NEIGHBORHOOD
                .iter()
                .any(|&(dx, dy)| !mask.is_set_i(x as i64 + dx, y as i64 + dy));
            if is_border {
                boundary.push(Point::new(x as f64, y as f64));
            }
        }
    }
    boundary
}

/// Reject contours too short for the downstream stages
pub fn ensure_min_length(contour: &Contour, required: usize) -> Result<()> {
    if contour.len() < required {
        return Err(ContactAngleError::InsufficientContour {
            found: contour.len(),
            required,
        });
    }
    Ok(())
}

/// Trace, order and smooth the outline of the droplet mask
pub fn extract_contour(mask: &BinaryMask, config: &Config) -> Result<Contour> {
    let boundary = boundary_pixels(mask);
    let raw = Contour::from_unordered(boundary);
    ensure_min_length(&raw, config.min_contour_points)?;
    let smoothed = raw.smoothed(config.contour_smoothing_half_window);
    debug!(
        "contour: {} boundary points, centroid ({:.1}, {:.1})",
        smoothed.len(),
        smoothed.centroid().x,
        smoothed.centroid().y
    );
    Ok(smoothed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn square_mask() -> BinaryMask {
        let mut mask = BinaryMask::new(20, 20);
        for y in 5..15 {
            for x in 5..15 {
                mask.set(x, y, true);
            }
        }
        mask
    }

    #[test]
    fn boundary_of_square_is_its_ring() {
        let boundary = boundary_pixels(&square_mask());
        assert_eq!(boundary.len(), 36);
        assert!(!boundary.contains(&Point::new(10.0, 10.0)));
    }

    #[test]
    fn points_are_ordered_by_polar_angle() {
        let contour = Contour::from_unordered(boundary_pixels(&square_mask()));
        let c = contour.centroid();
        let angles: Vec<f64> = contour
            .points()
            .iter()
            .map(|p| (p.y - c.y).atan2(p.x - c.x))
            .collect();
        assert!(angles.windows(2).all(|w| w[0] <= w[1]));
    }

    /// Ring of radius 20 whose points alternate one pixel in and out
    fn jagged_ring() -> Contour {
        let points = (0..72)
            .map(|i| {
                let t = (i as f64 * 5.0).to_radians();
                let r = if i % 2 == 0 { 21.0 } else { 19.0 };
                Point::new(50.0 + r * t.cos(), 50.0 + r * t.sin())
            })
            .collect();
        Contour::from_unordered(points)
    }

    #[test]
    fn smoothing_keeps_count_and_order_and_shrinks_roughness() {
        let contour = jagged_ring();
        let smoothed = contour.smoothed(4);
        assert_eq!(smoothed.len(), contour.len());
        for (raw, smooth) in contour.points().iter().zip(smoothed.points()) {
            assert!(raw.distance(smooth) < 3.0);
        }
        assert!(smoothed.roughness() < 0.5 * contour.roughness());
        assert_approx_eq!(smoothed.centroid().x, 50.0, 1e-6);
        assert_approx_eq!(smoothed.centroid().y, 50.0, 1e-6);
    }

    #[test]
    fn short_contour_is_rejected() {
        let points = (0..5).map(|i| Point::new(i as f64, (i * i) as f64)).collect();
        let contour = Contour::from_unordered(points);
        let err = ensure_min_length(&contour, 20).unwrap_err();
        assert!(matches!(err, ContactAngleError::InsufficientContour { found: 5, required: 20 }));
    }

    #[test]
    fn tiny_mask_fails_extraction() {
        let mut mask = BinaryMask::new(10, 10);
        mask.set(4, 4, true);
        mask.set(5, 4, true);
        assert!(matches!(
            extract_contour(&mask, &Config::default()),
            Err(ContactAngleError::InsufficientContour { found: 2, .. })
        ));
    }
}
