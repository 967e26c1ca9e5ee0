// src/segmentation.rs - Gradient-threshold segmentation of the droplet silhouette

use log::debug;

use crate::config::Config;
use crate::errors::{ContactAngleError, Result};
use crate::geometry::median;
use crate::image_utils::{BinaryMask, GrayscaleImage, SobelResponse};
use crate::morphology::{apply_closing, apply_opening, fill_holes, largest_component};

/// Output of the segmentation stage
#[derive(Debug, Clone)]
pub struct Segmentation {
    /// Largest connected droplet region
    pub mask: BinaryMask,
    /// Threshold applied to the Sobel magnitude
    pub threshold: f64,
    pub foreground_pixels: usize,
    /// Gradients of the preprocessed image, reused by the baseline detectors
    pub sobel: SobelResponse,
}

/// Data-driven threshold `max(floor, factor * median(magnitude))`
pub fn gradient_threshold(magnitude: &[f32], floor: f64, median_factor: f64) -> f64 {
    let values: Vec<f64> = magnitude.iter().map(|&m| m as f64).collect();
    let med = median(&values).unwrap_or(0.0);
    floor.max(median_factor * med)
}

/// Binarise a magnitude image against a threshold
pub fn binarize(magnitude: &[f32], width: usize, height: usize, threshold: f64) -> BinaryMask {
    let mut mask = BinaryMask::new(width, height);
    for (dst, &m) in mask.data.iter_mut().zip(magnitude.iter()) {
        *dst = (m as f64 > threshold) as u8;
    }
    mask
}

/// Clean up a raw edge mask and keep the single largest component.
///
/// Fails with `EmptyMask` when nothing survives.
pub fn extract_droplet_mask(raw: &BinaryMask, config: &Config) -> Result<(BinaryMask, usize)> {
    if raw.is_empty() {
        return Err(ContactAngleError::EmptyMask);
    }
    let closed = apply_closing(raw, config.close_radius);
    // A closed edge band becomes the solid silhouette before opening, so thin
    // outlines are not erased by the speckle filter.
    let closed = if config.fill_holes { fill_holes(&closed) } else { closed };
    let opened = apply_opening(&closed, config.open_radius);
    let (largest, size) = largest_component(&opened);
    if size == 0 {
        return Err(ContactAngleError::EmptyMask);
    }
    Ok((largest, size))
}

/// Segment the droplet from a preprocessed grayscale image
pub fn segment(image: &GrayscaleImage, config: &Config) -> Result<Segmentation> {
    let sobel = SobelResponse::compute(image);
    let magnitude = sobel.magnitude();
    let threshold = gradient_threshold(
        &magnitude,
        config.gradient_threshold_floor,
        config.gradient_threshold_median_factor,
    );
    let raw = binarize(&magnitude, image.width, image.height, threshold);
    debug!(
        "segment: threshold {:.2}, {} raw edge pixels",
        threshold,
        raw.count()
    );

    let (mask, foreground_pixels) = extract_droplet_mask(&raw, config)?;
    debug!("segment: droplet mask has {} pixels", foreground_pixels);

    Ok(Segmentation {
        mask,
        threshold,
        foreground_pixels,
        sobel,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_has_a_floor() {
        let flat = vec![0.0f32; 100];
        assert_eq!(gradient_threshold(&flat, 12.0, 0.9), 12.0);
        let busy = vec![100.0f32; 100];
        assert!((gradient_threshold(&busy, 12.0, 0.9) - 90.0).abs() < 1e-9);
    }

    #[test]
    fn blank_image_is_an_empty_mask() {
        let img = GrayscaleImage::from_fn(40, 40, |_, _| 128);
        let err = segment(&img, &Config::default()).unwrap_err();
        assert!(matches!(err, ContactAngleError::EmptyMask));
    }

    #[test]
    fn empty_raw_mask_is_rejected() {
        let raw = BinaryMask::new(10, 10);
        assert!(matches!(
            extract_droplet_mask(&raw, &Config::default()),
            Err(ContactAngleError::EmptyMask)
        ));
    }

    #[test]
    fn dark_disk_becomes_solid_mask() {
        let img = GrayscaleImage::from_fn(80, 80, |x, y| {
            let (dx, dy) = (x as f64 - 40.0, y as f64 - 40.0);
            if dx * dx + dy * dy <= 20.0 * 20.0 { 30 } else { 220 }
        });
        let seg = segment(&img, &Config::default()).unwrap();
        assert!(seg.mask.is_set(40, 40));
        assert!(!seg.mask.is_set(2, 2));
        // Roughly the disk area plus an edge band
        assert!(seg.foreground_pixels > 1200 && seg.foreground_pixels < 2000);
    }
}
