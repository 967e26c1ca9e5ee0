// src/geometry.rs - Plain geometric models shared by the pipeline stages

use serde::{Deserialize, Serialize};

/// A 2D point in image coordinates (x right, y down)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn scaled(&self, scale: Scale) -> Point {
        Point::new(self.x * scale.x, self.y * scale.y)
    }
}

/// Per-axis factors mapping one pixel frame onto another
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scale {
    pub x: f64,
    pub y: f64,
}

impl Scale {
    pub const IDENTITY: Scale = Scale { x: 1.0, y: 1.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Baseline model `y = slope * x + intercept`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineModel {
    pub slope: f64,
    pub intercept: f64,
    /// Points that voted for this line (the inliers of the final fit)
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub support_points: Vec<Point>,
    /// RMS perpendicular residual of the support points
    #[serde(default)]
    pub rms_residual: f64,
}

impl LineModel {
    pub fn new(slope: f64, intercept: f64) -> Self {
        Self {
            slope,
            intercept,
            support_points: Vec::new(),
            rms_residual: 0.0,
        }
    }

    /// Horizontal line through `y`
    pub fn horizontal(y: f64) -> Self {
        Self::new(0.0, y)
    }

    #[inline]
    pub fn y_at(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }

    /// Signed perpendicular distance; positive below the line in image coordinates
    #[inline]
    pub fn signed_distance(&self, p: &Point) -> f64 {
        (p.y - self.y_at(p.x)) / (1.0 + self.slope * self.slope).sqrt()
    }

    #[inline]
    pub fn distance(&self, p: &Point) -> f64 {
        self.signed_distance(p).abs()
    }

    /// Unit direction of the line pointing towards +x
    pub fn direction(&self) -> (f64, f64) {
        let norm = (1.0 + self.slope * self.slope).sqrt();
        (1.0 / norm, self.slope / norm)
    }

    /// Orthogonal projection of `p` onto the line
    pub fn project(&self, p: &Point) -> Point {
        let (dx, dy) = self.direction();
        let origin = Point::new(0.0, self.intercept);
        let t = (p.x - origin.x) * dx + (p.y - origin.y) * dy;
        Point::new(origin.x + t * dx, origin.y + t * dy)
    }

    pub fn support_count(&self) -> usize {
        self.support_points.len()
    }

    /// Same line expressed in a frame scaled by `scale`
    pub fn scaled(&self, scale: Scale) -> LineModel {
        LineModel {
            slope: self.slope * scale.y / scale.x,
            intercept: self.intercept * scale.y,
            support_points: self.support_points.iter().map(|p| p.scaled(scale)).collect(),
            // Residuals are near-vertical for a near-horizontal line
            rms_residual: self.rms_residual * scale.y,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CircleModel {
    pub center_x: f64,
    pub center_y: f64,
    pub radius: f64,
}

impl CircleModel {
    pub fn center(&self) -> Point {
        Point::new(self.center_x, self.center_y)
    }

    /// Geometric residual of a point (distance to the circle)
    pub fn residual(&self, p: &Point) -> f64 {
        (p.distance(&self.center()) - self.radius).abs()
    }

    /// Tangent slope `-(x-cx)/(y-cy)`, infinite where the tangent is vertical
    pub fn tangent_slope_at(&self, p: &Point) -> f64 {
        let dy = p.y - self.center_y;
        if dy.abs() < 1e-12 {
            f64::INFINITY
        } else {
            -(p.x - self.center_x) / dy
        }
    }

    /// Points where `line` meets the circle (none, one or two)
    pub fn intersect_line(&self, line: &LineModel) -> Vec<Point> {
        let (m, c) = (line.slope, line.intercept);
        let dc = c - self.center_y;
        let a = 1.0 + m * m;
        let b = 2.0 * (m * dc - self.center_x);
        let k = self.center_x * self.center_x + dc * dc - self.radius * self.radius;
        let disc = b * b - 4.0 * a * k;
        if disc < 0.0 {
            return Vec::new();
        }
        let root = disc.sqrt();
        let mut xs = vec![(-b - root) / (2.0 * a)];
        if root > 0.0 {
            xs.push((-b + root) / (2.0 * a));
        }
        xs.into_iter().map(|x| Point::new(x, line.y_at(x))).collect()
    }
}

/// Rotated ellipse, `angle_deg` measured from the x axis towards +y
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EllipseModel {
    pub cx: f64,
    pub cy: f64,
    pub a: f64,
    pub b: f64,
    pub angle_deg: f64,
}

impl EllipseModel {
    /// Point on the ellipse at parameter `t` (radians)
    pub fn point_at(&self, t: f64) -> Point {
        let (s, c) = self.angle_deg.to_radians().sin_cos();
        let (ex, ey) = (self.a * t.cos(), self.b * t.sin());
        Point::new(self.cx + ex * c - ey * s, self.cy + ex * s + ey * c)
    }
}

/// Axis-aligned bounds of a point set or mask
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn from_points(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let mut bbox = BoundingBox {
            min_x: first.x,
            min_y: first.y,
            max_x: first.x,
            max_y: first.y,
        };
        for p in points {
            bbox.min_x = bbox.min_x.min(p.x);
            bbox.min_y = bbox.min_y.min(p.y);
            bbox.max_x = bbox.max_x.max(p.x);
            bbox.max_y = bbox.max_y.max(p.y);
        }
        Some(bbox)
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn center_x(&self) -> f64 {
        0.5 * (self.min_x + self.max_x)
    }
}

/// Centroid of a point set; `None` when empty
pub fn centroid(points: &[Point]) -> Option<Point> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    Some(Point::new(sx / n, sy / n))
}

/// Median of a slice; sorts a copy, `None` when empty
pub fn median(values: &[f64]) -> Option<f64> {
    percentile(values, 50.0)
}

/// Linear-interpolated percentile (0..=100) of a slice
pub fn percentile(values: &[f64], pct: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = (pct.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] * (1.0 - frac) + sorted[hi] * frac)
}
