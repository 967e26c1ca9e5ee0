// src/pipeline.rs - End-to-end measurement: pixels in, contact angles out

use std::borrow::Cow;

use image::RgbaImage;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::angle::{summarize, AngleSummary};
use crate::baseline::{
    default_detectors, estimate_baseline, BaselineCandidate, BaselineContext, ContactHints, DetectorKind,
};
use crate::cache::{fingerprint, MeasurementCache};
use crate::config::Config;
use crate::contact::{localize_contacts, ContactPair, Side};
use crate::contour::{extract_contour, Contour};
use crate::errors::{ContactAngleError, Result};
use crate::fitting::fit_ellipse;
use crate::geometry::{EllipseModel, LineModel, Point, Scale};
use crate::image_utils::{limit_dimensions, GrayscaleImage, PixelBuffer};
use crate::preprocess::preprocess;
use crate::quality::{score_quality, ConfidenceLabel, QualityInputs, QualityMetrics};
use crate::segmentation::segment;
use crate::tangent::{estimate_tangent, TangentEstimate, TangentMethod};

/// Baseline in slope/intercept form, `y = m·x + c`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaselineParams {
    pub m: f64,
    pub c: f64,
}

/// Intermediate values kept when `collect_debug` is set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugInfo {
    /// Per-axis factors from the processed frame back to the input
    pub scale: Scale,
    pub gradient_threshold: f64,
    pub foreground_pixels: usize,
    pub contour_points: usize,
    pub baseline_candidates: Vec<BaselineCandidate>,
    /// `None` when the flat fallback line was used
    pub baseline_detector: Option<DetectorKind>,
    pub left_tangent_method: TangentMethod,
    pub right_tangent_method: TangentMethod,
    pub contacts: ContactPair,
}

/// Complete outcome of one measurement, in original image coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AngleResult {
    pub left_angle_deg: f64,
    pub right_angle_deg: f64,
    pub mean_angle_deg: f64,
    pub best_angle_deg: f64,
    pub best_side: Side,
    pub baseline: BaselineParams,
    /// Baseline clipped to the image width, for drawing
    pub baseline_endpoints: [Point; 2],
    pub left_contact: Point,
    pub right_contact: Point,
    pub left_tangent: TangentEstimate,
    pub right_tangent: TangentEstimate,
    /// Overall quality in [0, 1]
    pub confidence: f64,
    pub confidence_label: ConfidenceLabel,
    pub quality: QualityMetrics,
    pub ellipse: EllipseModel,
    pub contour: Vec<Point>,
    pub image_width: u32,
    pub image_height: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<DebugInfo>,
}

/// Everything computed from a contour and its baseline; the cached unit
#[derive(Debug, Clone, PartialEq)]
pub struct ContactAnalysis {
    pub contacts: ContactPair,
    pub left_tangent: TangentEstimate,
    pub right_tangent: TangentEstimate,
    pub angles: AngleSummary,
    pub quality: QualityMetrics,
}

/// Measure from raw row-major RGBA bytes
pub fn measure(pixels: &[u8], width: u32, height: u32, config: &Config) -> Result<AngleResult> {
    let buffer = PixelBuffer::new(pixels.to_vec(), width, height)?;
    measure_buffer(&buffer, config)
}

pub fn measure_image(image: &RgbaImage, config: &Config) -> Result<AngleResult> {
    measure_buffer(&PixelBuffer::from_rgba_image(image), config)
}

pub fn measure_buffer(buffer: &PixelBuffer, config: &Config) -> Result<AngleResult> {
    run(buffer, config, None)
}

/// Like `measure_buffer`, reusing contact analyses already in `cache`
pub fn measure_with_cache(
    buffer: &PixelBuffer,
    config: &Config,
    cache: &MeasurementCache<ContactAnalysis>,
) -> Result<AngleResult> {
    run(buffer, config, Some(cache))
}

/// Contacts, tangents, angles and quality for a fixed contour and baseline
pub fn analyze_contacts(
    contour: &Contour,
    baseline: &LineModel,
    hints: Option<&ContactHints>,
    image: Option<&GrayscaleImage>,
    config: &Config,
) -> Result<ContactAnalysis> {
    let contacts = localize_contacts(contour, baseline, hints, image, config)?;
    let left_tangent = estimate_tangent(contour, &contacts.left.position, baseline, image, config)?;
    let right_tangent = estimate_tangent(contour, &contacts.right.position, baseline, image, config)?;
    let angles = summarize(&contacts, &left_tangent, &right_tangent, baseline)?;
    let quality = score_quality(
        &QualityInputs {
            contour_roughness: contour.roughness(),
            baseline,
            left_tangent: &left_tangent,
            right_tangent: &right_tangent,
            left_angle: angles.left_deg,
            right_angle: angles.right_deg,
        },
        config,
    );
    Ok(ContactAnalysis {
        contacts,
        left_tangent,
        right_tangent,
        angles,
        quality,
    })
}

fn downscaled<'a>(buffer: &'a PixelBuffer, max_dimension: u32) -> (Cow<'a, PixelBuffer>, Scale) {
    if buffer.width().max(buffer.height()) <= max_dimension {
        return (Cow::Borrowed(buffer), Scale::IDENTITY);
    }
    let (resized, scale) = limit_dimensions(&buffer.to_rgba_image(), max_dimension);
    debug!(
        "pipeline: downscaled {}x{} to {}x{}",
        buffer.width(),
        buffer.height(),
        resized.width(),
        resized.height()
    );
    (Cow::Owned(PixelBuffer::from_rgba_image(&resized)), scale)
}

fn run(
    buffer: &PixelBuffer,
    config: &Config,
    cache: Option<&MeasurementCache<ContactAnalysis>>,
) -> Result<AngleResult> {
    let (working, scale) = downscaled(buffer, config.max_dimension);
    let mut rng = StdRng::seed_from_u64(config.seed);

    let gray = preprocess(&working, config);
    let segmentation = segment(&gray, config)?;
    let contour = extract_contour(&segmentation.mask, config)?;

    let ctx = BaselineContext::new(&contour, &segmentation.mask, &gray, &segmentation.sobel, config)?;
    let detectors = default_detectors();
    let baseline = estimate_baseline(&ctx, &detectors, &mut rng);

    let compute = || analyze_contacts(&contour, &baseline.line, baseline.hints.as_ref(), Some(&gray), config);
    let analysis = match cache {
        Some(cache) => {
            let key = fingerprint(&contour, &baseline.line, config, Some(&gray));
            cache.get_or_try_insert_with(key, compute)?
        }
        None => compute()?,
    };

    let outline = contour.scaled(scale);
    let ellipse = fit_ellipse(outline.points())
        .ok_or_else(|| ContactAngleError::DegenerateGeometry("empty outline".to_string()))?;
    let line = baseline.line.scaled(scale);
    let right_x = buffer.width().saturating_sub(1) as f64;

    let debug = config.collect_debug.then(|| DebugInfo {
        scale,
        gradient_threshold: segmentation.threshold,
        foreground_pixels: segmentation.foreground_pixels,
        contour_points: contour.len(),
        baseline_candidates: baseline.candidates.clone(),
        baseline_detector: baseline.detector,
        left_tangent_method: analysis.left_tangent.method,
        right_tangent_method: analysis.right_tangent.method,
        contacts: ContactPair {
            left: analysis.contacts.left.scaled(scale),
            right: analysis.contacts.right.scaled(scale),
        },
    });

    let angles = analysis.angles;
    info!(
        "measured: left {:.2}°, right {:.2}°, mean {:.2}°, confidence {:.2} ({:?})",
        angles.left_deg,
        angles.right_deg,
        angles.mean_deg,
        analysis.quality.overall_quality,
        analysis.quality.confidence_label
    );

    Ok(AngleResult {
        left_angle_deg: angles.left_deg,
        right_angle_deg: angles.right_deg,
        mean_angle_deg: angles.mean_deg,
        best_angle_deg: angles.best_deg,
        best_side: angles.best_side,
        baseline: BaselineParams {
            m: line.slope,
            c: line.intercept,
        },
        baseline_endpoints: [Point::new(0.0, line.y_at(0.0)), Point::new(right_x, line.y_at(right_x))],
        left_contact: analysis.contacts.left.position.scaled(scale),
        right_contact: analysis.contacts.right.position.scaled(scale),
        left_tangent: analysis.left_tangent,
        right_tangent: analysis.right_tangent,
        confidence: analysis.quality.overall_quality,
        confidence_label: analysis.quality.confidence_label,
        quality: analysis.quality,
        ellipse,
        contour: outline.points().to_vec(),
        image_width: buffer.width(),
        image_height: buffer.height(),
        debug,
    })
}
