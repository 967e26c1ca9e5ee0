// src/baseline.rs - Independent baseline detectors and the fusion step that picks one

use log::{debug, info, warn};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::contact::refine_subpixel;
use crate::contour::Contour;
use crate::errors::{ContactAngleError, Result};
use crate::fitting::{fit_line_ransac, LineFitParams};
use crate::geometry::{median, percentile, BoundingBox, LineModel, Point};
use crate::image_utils::{BinaryMask, GrayscaleImage, SobelResponse};

/// Fraction of the contour height treated as the droplet foot
const FOOT_FRACTION: f64 = 0.2;
/// Columns trimmed from each end of the mask floor
const FLOOR_TRIM_FRACTION: f64 = 0.15;
/// Thickness of the band under the lowest contour point
const BOTTOM_BAND_PX: f64 = 3.0;
/// Minimum bright-above / dark-below step for gradient band evidence
const BAND_CONTRAST_MARGIN: f64 = 10.0;
const ROW_SCAN_BINS: usize = 8;
const ROW_SCAN_MIN_BINS: usize = 4;
/// Distance of the flat fallback line below the lowest contour point
const FLAT_FALLBACK_OFFSET: f64 = 2.0;
/// Largest grey-edge offset trusted when snapping the chosen line
const EDGE_SNAP_MAX_OFFSET: f64 = 3.0;
const EDGE_SNAP_MIN_POINTS: usize = 5;

/// The baseline heuristics, in the order they are tried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DetectorKind {
    ContactPoints,
    MaskFloor,
    ContourBottom,
    GradientBand,
    GlobalStable,
}

impl DetectorKind {
    /// Support points a candidate needs to survive fusion
    pub fn min_support(self) -> usize {
        match self {
            DetectorKind::ContactPoints => 8,
            DetectorKind::MaskFloor => 10,
            DetectorKind::ContourBottom => 6,
            DetectorKind::GradientBand => 12,
            DetectorKind::GlobalStable => 12,
        }
    }

    /// Multiplier on the configured slope prior
    fn prior_multiplier(self) -> f64 {
        match self {
            DetectorKind::ContactPoints | DetectorKind::GradientBand | DetectorKind::GlobalStable => 2.5,
            DetectorKind::MaskFloor | DetectorKind::ContourBottom => 1.0,
        }
    }
}

/// Contact point positions suggested by a detector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContactHints {
    pub left: Point,
    pub right: Point,
}

/// Everything a detector may look at
pub struct BaselineContext<'a> {
    pub contour: &'a Contour,
    pub mask: &'a BinaryMask,
    pub image: &'a GrayscaleImage,
    pub sobel: &'a SobelResponse,
    pub config: &'a Config,
    /// Bounds of the contour
    pub bbox: BoundingBox,
}

impl<'a> BaselineContext<'a> {
    pub fn new(
        contour: &'a Contour,
        mask: &'a BinaryMask,
        image: &'a GrayscaleImage,
        sobel: &'a SobelResponse,
        config: &'a Config,
    ) -> Result<Self> {
        let bbox = contour.bounding_box().ok_or(ContactAngleError::InsufficientContour {
            found: 0,
            required: config.min_contour_points,
        })?;
        Ok(Self {
            contour,
            mask,
            image,
            sobel,
            config,
            bbox,
        })
    }

    fn fit_params(&self, kind: DetectorKind) -> LineFitParams {
        LineFitParams {
            iterations: self.config.ransac_iterations,
            inlier_threshold: self.config.inlier_threshold,
            prior_weight: self.config.baseline_slope_prior_weight * kind.prior_multiplier(),
        }
    }

    /// Fit a line for `kind`, discarding it when under-supported
    fn fit_candidate(
        &self,
        kind: DetectorKind,
        points: &[Point],
        rng: &mut StdRng,
    ) -> Option<BaselineCandidate> {
        if points.len() < kind.min_support() {
            debug!("baseline {:?}: {} evidence points, too few", kind, points.len());
            return None;
        }
        let line = fit_line_ransac(points, &self.fit_params(kind), rng)?;
        if line.support_count() < kind.min_support() {
            debug!("baseline {:?}: {} inliers, too few", kind, line.support_count());
            return None;
        }
        Some(BaselineCandidate {
            detector: kind,
            line,
            hints: None,
            score: 0.0,
        })
    }

    /// Inclusive column range of the image covering the droplet plus `pad`
    fn column_range(&self, pad: f64) -> (usize, usize) {
        let max_col = self.image.width.saturating_sub(1) as f64;
        let lo = (self.bbox.min_x - pad).floor().clamp(0.0, max_col) as usize;
        let hi = (self.bbox.max_x + pad).ceil().clamp(0.0, max_col) as usize;
        (lo, hi)
    }
}

/// A fitted baseline proposed by one detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineCandidate {
    pub detector: DetectorKind,
    pub line: LineModel,
    pub hints: Option<ContactHints>,
    /// Fusion score, filled in by `estimate_baseline`
    pub score: f64,
}

/// A baseline heuristic
pub trait BaselineDetector: Send + Sync {
    fn kind(&self) -> DetectorKind;

    /// Propose a line, or `None` when the heuristic finds too little evidence
    fn detect(&self, ctx: &BaselineContext, rng: &mut StdRng) -> Option<BaselineCandidate>;
}

/// Bottom band of the contour split into left and right thirds
pub struct ContactPointsDetector;

impl BaselineDetector for ContactPointsDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::ContactPoints
    }

    fn detect(&self, ctx: &BaselineContext, rng: &mut StdRng) -> Option<BaselineCandidate> {
        let bbox = &ctx.bbox;
        let y_cut = bbox.max_y - FOOT_FRACTION * bbox.height();
        let third = bbox.width() / 3.0;
        let (left_edge, right_edge) = (bbox.min_x + third, bbox.max_x - third);

        let foot: Vec<Point> = ctx
            .contour
            .points()
            .iter()
            .copied()
            .filter(|p| p.y >= y_cut && (p.x <= left_edge || p.x >= right_edge))
            .collect();
        let has_both_sides = foot.iter().any(|p| p.x <= left_edge) && foot.iter().any(|p| p.x >= right_edge);
        if !has_both_sides {
            return None;
        }

        let mut candidate = ctx.fit_candidate(self.kind(), &foot, rng)?;
        let support = &candidate.line.support_points;
        let left = support.iter().copied().min_by(|a, b| a.x.total_cmp(&b.x))?;
        let right = support.iter().copied().max_by(|a, b| a.x.total_cmp(&b.x))?;
        if right.x - left.x > 1.0 {
            candidate.hints = Some(ContactHints { left, right });
        }
        Some(candidate)
    }
}

/// Lowest foreground pixel of every mask column
pub struct MaskFloorDetector;

impl BaselineDetector for MaskFloorDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::MaskFloor
    }

    fn detect(&self, ctx: &BaselineContext, rng: &mut StdRng) -> Option<BaselineCandidate> {
        let mask = ctx.mask;
        let floor: Vec<Point> = (0..mask.width)
            .filter_map(|x| {
                (0..mask.height)
                    .rev()
                    .find(|&y| mask.is_set(x, y))
                    .map(|y| Point::new(x as f64, y as f64))
            })
            .collect();
        let trim = (floor.len() as f64 * FLOOR_TRIM_FRACTION).floor() as usize;
        if floor.len() <= 2 * trim {
            return None;
        }
        ctx.fit_candidate(self.kind(), &floor[trim..floor.len() - trim], rng)
    }
}

/// Contour points in a thin band at the lowest contour row
pub struct ContourBottomDetector;

impl BaselineDetector for ContourBottomDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::ContourBottom
    }

    fn detect(&self, ctx: &BaselineContext, rng: &mut StdRng) -> Option<BaselineCandidate> {
        let max_y = ctx.bbox.max_y;
        let band: Vec<Point> = ctx
            .contour
            .points()
            .iter()
            .copied()
            .filter(|p| p.y >= max_y - BOTTOM_BAND_PX)
            .collect();
        ctx.fit_candidate(self.kind(), &band, rng)
    }
}

/// Strong bright-above / dark-below edges just under the droplet
pub struct GradientBandDetector;

impl BaselineDetector for GradientBandDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::GradientBand
    }

    fn detect(&self, ctx: &BaselineContext, rng: &mut StdRng) -> Option<BaselineCandidate> {
        let (image, sobel) = (ctx.image, ctx.sobel);
        if image.height < 5 {
            return None;
        }
        let bbox = &ctx.bbox;
        let depth = 6.0f64.max(0.1 * bbox.height());
        let y_start = ((bbox.max_y.floor() - 2.0).max(2.0)) as usize;
        let y_end = ((bbox.max_y + depth).ceil() as usize).min(image.height - 3);
        let (x_lo, x_hi) = ctx.column_range(0.1 * bbox.width());

        let mut evidence = Vec::new();
        for y in y_start..=y_end {
            let row: Vec<f64> = (x_lo..=x_hi).map(|x| sobel.gy_at(x, y).abs() as f64).collect();
            let Some(p90) = percentile(&row, 90.0) else {
                continue;
            };
            for (x, &g) in (x_lo..=x_hi).zip(row.iter()) {
                if g < p90 || g <= ctx.config.gradient_threshold_floor || ctx.mask.is_set(x, y) {
                    continue;
                }
                let step = image.get(x, y - 2) as f64 - image.get(x, y + 2) as f64;
                if step > BAND_CONTRAST_MARGIN {
                    evidence.push(Point::new(x as f64, y as f64));
                }
            }
        }
        ctx.fit_candidate(self.kind(), &evidence, rng)
    }
}

/// Row scan for the most populated, well spread line of gradient peaks
pub struct GlobalStableDetector;

impl BaselineDetector for GlobalStableDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::GlobalStable
    }

    fn detect(&self, ctx: &BaselineContext, rng: &mut StdRng) -> Option<BaselineCandidate> {
        let sobel = ctx.sobel;
        if sobel.height < 3 {
            return None;
        }
        let bbox = &ctx.bbox;
        let depth = 10.0f64.max(0.25 * bbox.height());
        let y_start = ((bbox.max_y.floor() - 4.0).max(1.0)) as usize;
        let y_end = ((bbox.max_y + depth).ceil() as usize).min(sobel.height - 2);
        if y_end <= y_start {
            return None;
        }
        let (x_lo, x_hi) = ctx.column_range(0.0);
        let g = |x: usize, y: usize| sobel.gy_at(x, y).abs() as f64;

        let band: Vec<f64> = (y_start..=y_end)
            .flat_map(|y| (x_lo..=x_hi).map(move |x| (x, y)))
            .map(|(x, y)| g(x, y))
            .collect();
        let threshold = percentile(&band, 90.0)?.max(ctx.config.gradient_threshold_floor);

        let span = (x_hi - x_lo + 1) as f64;
        let mut best: Option<(f64, Vec<Point>)> = None;
        for y in y_start..=y_end {
            let peaks: Vec<Point> = (x_lo..=x_hi)
                .filter(|&x| {
                    let v = g(x, y);
                    v >= threshold && v >= g(x, y - 1) && v >= g(x, y + 1)
                })
                .map(|x| Point::new(x as f64, y as f64))
                .collect();

            let mut bins = [false; ROW_SCAN_BINS];
            for p in &peaks {
                let bin = (((p.x - x_lo as f64) / span) * ROW_SCAN_BINS as f64) as usize;
                bins[bin.min(ROW_SCAN_BINS - 1)] = true;
            }
            if bins.iter().filter(|&&b| b).count() < ROW_SCAN_MIN_BINS {
                continue;
            }

            let depth_bias = 1.0 + 0.5 * (y - y_start) as f64 / (y_end - y_start) as f64;
            let score = peaks.len() as f64 * depth_bias;
            if best.as_ref().map_or(true, |(s, _)| score > *s) {
                best = Some((score, peaks));
            }
        }

        let (_, points) = best?;
        ctx.fit_candidate(self.kind(), &points, rng)
    }
}

/// The five detectors in their fallback order
pub fn default_detectors() -> Vec<Box<dyn BaselineDetector>> {
    vec![
        Box::new(ContactPointsDetector),
        Box::new(MaskFloorDetector),
        Box::new(ContourBottomDetector),
        Box::new(GradientBandDetector),
        Box::new(GlobalStableDetector),
    ]
}

/// `2·horizontalness + 2.5·proximity + ln(1+support) + 0.8·hints`
pub fn fusion_score(candidate: &BaselineCandidate, bbox: &BoundingBox) -> f64 {
    let line = &candidate.line;
    let horizontalness = 1.0 / (1.0 + 10.0 * line.slope.abs());
    let scale = 4.0f64.max(0.05 * bbox.height());
    let proximity = (-(line.y_at(bbox.center_x()) - bbox.max_y).abs() / scale).exp();
    let support = (1.0 + line.support_count() as f64).ln();
    let hints = if candidate.hints.is_some() { 1.0 } else { 0.0 };
    2.0 * horizontalness + 2.5 * proximity + support + 0.8 * hints
}

/// Horizontal line just below the lowest contour point
pub fn flat_fallback(contour: &Contour) -> LineModel {
    LineModel::horizontal(contour.max_y() + FLAT_FALLBACK_OFFSET)
}

/// Slide `line` along its normal onto the grey-level edge under its support
/// points. The median offset is applied once enough of them see an edge.
pub fn snap_line_to_edge(line: &LineModel, image: &GrayscaleImage, config: &Config) -> LineModel {
    let scale = (1.0 + line.slope * line.slope).sqrt();
    let normal = (-line.slope / scale, 1.0 / scale);
    let offsets: Vec<f64> = line
        .support_points
        .iter()
        .filter_map(|p| {
            let r = refine_subpixel(
                image,
                &line.project(p),
                normal,
                config.refine_samples,
                config.refine_spacing,
                config.refine_min_gradient,
            );
            (r.refined && r.offset.abs() <= EDGE_SNAP_MAX_OFFSET).then_some(r.offset)
        })
        .collect();
    if offsets.len() < EDGE_SNAP_MIN_POINTS {
        return line.clone();
    }
    let Some(shift) = median(&offsets) else {
        return line.clone();
    };
    debug!("baseline: snapped {:.2} px onto the grey edge ({} points)", shift, offsets.len());
    LineModel {
        intercept: line.intercept + shift * scale,
        ..line.clone()
    }
}

/// The chosen baseline plus what the detectors proposed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineEstimate {
    pub line: LineModel,
    /// `None` when the flat fallback was used
    pub detector: Option<DetectorKind>,
    pub hints: Option<ContactHints>,
    pub candidates: Vec<BaselineCandidate>,
}

/// Run every detector, score the survivors and keep the best.
/// Never fails: without usable candidates the flat fallback is returned.
pub fn estimate_baseline(
    ctx: &BaselineContext,
    detectors: &[Box<dyn BaselineDetector>],
    rng: &mut StdRng,
) -> BaselineEstimate {
    let mut candidates: Vec<BaselineCandidate> = Vec::new();
    for detector in detectors {
        match detector.detect(ctx, rng) {
            Some(mut candidate) => {
                candidate.score = fusion_score(&candidate, &ctx.bbox);
                debug!(
                    "baseline {:?}: y = {:.4}x + {:.2}, {} inliers, score {:.3}",
                    candidate.detector,
                    candidate.line.slope,
                    candidate.line.intercept,
                    candidate.line.support_count(),
                    candidate.score
                );
                candidates.push(candidate);
            }
            None => debug!("baseline {:?}: no candidate", detector.kind()),
        }
    }

    // Earlier detectors win ties
    let best = candidates
        .iter()
        .enumerate()
        .max_by(|(ia, a), (ib, b)| a.score.total_cmp(&b.score).then(ib.cmp(ia)))
        .map(|(_, c)| c.clone());

    match best {
        Some(chosen) => {
            info!(
                "baseline: {:?} chosen, y = {:.4}x + {:.2}",
                chosen.detector, chosen.line.slope, chosen.line.intercept
            );
            BaselineEstimate {
                line: snap_line_to_edge(&chosen.line, ctx.image, ctx.config),
                detector: Some(chosen.detector),
                hints: chosen.hints,
                candidates,
            }
        }
        None => {
            let line = flat_fallback(ctx.contour);
            warn!(
                "baseline: {}; using flat line y = {:.2}",
                ContactAngleError::InsufficientBaselineSupport,
                line.intercept
            );
            BaselineEstimate {
                line,
                detector: None,
                hints: None,
                candidates,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contour::boundary_pixels;
    use assert_approx_eq::assert_approx_eq;
    use rand::SeedableRng;

    /// Circular cap resting on y = 140 with a flat foot between the contacts
    fn cap_contour() -> Contour {
        let mut points: Vec<Point> = (0..720)
            .map(|i| {
                let t = i as f64 * std::f64::consts::TAU / 720.0;
                Point::new(100.0 + 50.0 * t.cos(), 120.0 + 50.0 * t.sin())
            })
            .filter(|p| p.y <= 140.0)
            .collect();
        points.extend((55..=145).map(|x| Point::new(x as f64, 140.0)));
        Contour::from_unordered(points)
    }

    fn rect_mask(width: usize, height: usize, x0: usize, x1: usize, y0: usize, y1: usize) -> BinaryMask {
        let mut mask = BinaryMask::new(width, height);
        for y in y0..y1 {
            for x in x0..x1 {
                mask.set(x, y, true);
            }
        }
        mask
    }

    #[test]
    fn contact_points_detector_finds_foot_and_hints() {
        let contour = cap_contour();
        let mask = BinaryMask::new(200, 200);
        let image = GrayscaleImage::new(200, 200);
        let sobel = SobelResponse::compute(&image);
        let config = Config::default();
        let ctx = BaselineContext::new(&contour, &mask, &image, &sobel, &config).unwrap();
        let mut rng = StdRng::seed_from_u64(config.seed);

        let candidate = ContactPointsDetector.detect(&ctx, &mut rng).unwrap();
        assert_approx_eq!(candidate.line.slope, 0.0, 0.01);
        assert_approx_eq!(candidate.line.y_at(100.0), 140.0, 0.5);
        let hints = candidate.hints.unwrap();
        assert!(hints.left.x < 56.0);
        assert!(hints.right.x > 144.0);
    }

    #[test]
    fn mask_floor_follows_the_bottom_row() {
        let mask = rect_mask(100, 80, 20, 80, 10, 51);
        let contour = Contour::from_unordered(boundary_pixels(&mask));
        let image = GrayscaleImage::new(100, 80);
        let sobel = SobelResponse::compute(&image);
        let config = Config::default();
        let ctx = BaselineContext::new(&contour, &mask, &image, &sobel, &config).unwrap();
        let mut rng = StdRng::seed_from_u64(1);

        let candidate = MaskFloorDetector.detect(&ctx, &mut rng).unwrap();
        assert_approx_eq!(candidate.line.slope, 0.0, 1e-9);
        assert_approx_eq!(candidate.line.intercept, 50.0, 1e-9);
        assert_eq!(candidate.line.support_count(), 60 - 2 * 9);
    }

    #[test]
    fn gradient_band_sees_dark_substrate() {
        let mask = rect_mask(100, 80, 30, 71, 20, 41);
        let contour = Contour::from_unordered(boundary_pixels(&mask));
        let image = GrayscaleImage::from_fn(100, 80, |_, y| if y < 45 { 200 } else { 40 });
        let sobel = SobelResponse::compute(&image);
        let config = Config::default();
        let ctx = BaselineContext::new(&contour, &mask, &image, &sobel, &config).unwrap();
        let mut rng = StdRng::seed_from_u64(2);

        let candidate = GradientBandDetector.detect(&ctx, &mut rng).unwrap();
        assert_approx_eq!(candidate.line.slope, 0.0, 1e-3);
        assert_approx_eq!(candidate.line.intercept, 44.5, 0.6);
    }

    #[test]
    fn fusion_prefers_flat_lines_near_the_bottom() {
        let bbox = BoundingBox { min_x: 50.0, min_y: 60.0, max_x: 150.0, max_y: 140.0 };
        let mut near = LineModel::horizontal(140.0);
        near.support_points = vec![Point::default(); 30];
        let mut tilted = LineModel::new(0.3, 110.0);
        tilted.support_points = vec![Point::default(); 30];
        let near = BaselineCandidate { detector: DetectorKind::MaskFloor, line: near, hints: None, score: 0.0 };
        let tilted = BaselineCandidate { detector: DetectorKind::ContourBottom, line: tilted, hints: None, score: 0.0 };
        assert!(fusion_score(&near, &bbox) > fusion_score(&tilted, &bbox));
        assert_approx_eq!(fusion_score(&near, &bbox), 2.0 + 2.5 + 31f64.ln(), 1e-9);
    }

    #[test]
    fn no_detectors_means_flat_fallback() {
        let contour = cap_contour();
        let mask = BinaryMask::new(200, 200);
        let image = GrayscaleImage::new(200, 200);
        let sobel = SobelResponse::compute(&image);
        let config = Config::default();
        let ctx = BaselineContext::new(&contour, &mask, &image, &sobel, &config).unwrap();
        let estimate = estimate_baseline(&ctx, &[], &mut StdRng::seed_from_u64(0));
        assert!(estimate.detector.is_none());
        assert_approx_eq!(estimate.line.intercept, 142.0, 1e-9);
        assert_eq!(estimate.line.slope, 0.0);
    }

    #[test]
    fn chosen_line_snaps_to_the_substrate_edge() {
        let edge = 142.3;
        let image = GrayscaleImage::from_fn(200, 200, |_, y| {
            (120.0 - 90.0 * ((y as f64 - edge) / 1.2).tanh()).round() as u8
        });
        let mut line = LineModel::horizontal(140.0);
        line.support_points = (50..150).map(|x| Point::new(x as f64, 140.0)).collect();
        let snapped = snap_line_to_edge(&line, &image, &Config::default());
        assert_approx_eq!(snapped.intercept, edge, 0.15);
        assert_eq!(snapped.slope, 0.0);
        assert_eq!(snapped.support_points.len(), 100);

        let flat = GrayscaleImage::from_fn(200, 200, |_, _| 90);
        assert_eq!(snap_line_to_edge(&line, &flat, &Config::default()), line);
    }

    #[test]
    fn fusion_picks_a_supported_candidate() {
        let contour = cap_contour();
        let mask = BinaryMask::new(200, 200);
        let image = GrayscaleImage::new(200, 200);
        let sobel = SobelResponse::compute(&image);
        let config = Config::default();
        let ctx = BaselineContext::new(&contour, &mask, &image, &sobel, &config).unwrap();
        let estimate = estimate_baseline(&ctx, &default_detectors(), &mut StdRng::seed_from_u64(config.seed));
        assert_eq!(estimate.detector, Some(DetectorKind::ContactPoints));
        assert!(estimate.hints.is_some());
        assert_approx_eq!(estimate.line.y_at(100.0), 140.0, 0.5);
    }
}
