// src/preprocess.rs - Grayscale conversion, local contrast normalisation and denoising

use log::debug;

use crate::config::Config;
use crate::image_utils::{GrayscaleImage, PixelBuffer};

/// Luminance `0.299 R + 0.587 G + 0.114 B`, alpha ignored
pub fn to_grayscale(buffer: &PixelBuffer) -> GrayscaleImage {
    let (width, height) = (buffer.width() as usize, buffer.height() as usize);
    let mut gray = GrayscaleImage::new(width, height);
    for (dst, px) in gray.data.iter_mut().zip(buffer.as_bytes().chunks_exact(4)) {
        let lum = 0.299 * px[0] as f64 + 0.587 * px[1] as f64 + 0.114 * px[2] as f64;
        *dst = lum.round().clamp(0.0, 255.0) as u8;
    }
    gray
}

/// Per-tile linear stretch between two intensity percentiles
#[derive(Debug, Clone, Copy)]
struct TileMapping {
    low: f64,
    high: f64,
    identity: bool,
}

impl TileMapping {
    #[inline]
    fn apply(&self, value: f64) -> f64 {
        if self.identity {
            value
        } else {
            ((value - self.low) * 255.0 / (self.high - self.low)).clamp(0.0, 255.0)
        }
    }
}

/// Nearest-rank percentile from a 256-bin histogram
fn histogram_percentile(histogram: &[u32; 256], total: u32, pct: f64) -> u8 {
    if total == 0 {
        return 0;
    }
    let rank = ((pct / 100.0) * (total - 1) as f64).round() as u32;
    let mut seen = 0u32;
    for (value, &count) in histogram.iter().enumerate() {
        seen += count;
        if seen > rank {
            return value as u8;
        }
    }
    255
}

/// Tiled local contrast stretch approximating CLAHE.
///
/// Each tile is rescaled so its low/high percentiles map to 0/255. Tile
/// mappings are blended bilinearly between tile centres; tiles whose
/// percentile range is below `min_range` keep their intensities.
pub fn local_contrast_stretch(
    image: &GrayscaleImage,
    tile_size: usize,
    low_pct: f64,
    high_pct: f64,
    min_range: u8,
) -> GrayscaleImage {
    let (w, h) = (image.width, image.height);
    if w == 0 || h == 0 || tile_size == 0 {
        return image.clone();
    }
    let tiles_x = (w + tile_size - 1) / tile_size;
    let tiles_y = (h + tile_size - 1) / tile_size;

    let mut mappings = Vec::with_capacity(tiles_x * tiles_y);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let mut histogram = [0u32; 256];
            let mut total = 0u32;
            for y in (ty * tile_size)..((ty + 1) * tile_size).min(h) {
                for x in (tx * tile_size)..((tx + 1) * tile_size).min(w) {
                    histogram[image.get(x, y) as usize] += 1;
                    total += 1;
                }
            }
            let low = histogram_percentile(&histogram, total, low_pct);
            let high = histogram_percentile(&histogram, total, high_pct);
            mappings.push(TileMapping {
                low: low as f64,
                high: high as f64,
                identity: high.saturating_sub(low) < min_range,
            });
        }
    }

    let tile_f = tile_size as f64;
    let locate = |coord: usize, count: usize| -> (usize, usize, f64) {
        let f = (coord as f64 + 0.5) / tile_f - 0.5;
        let base = f.floor();
        let weight = f - base;
        let i0 = (base.max(0.0) as usize).min(count - 1);
        let i1 = ((base + 1.0).max(0.0) as usize).min(count - 1);
        (i0, i1, weight)
    };

    let mut out = GrayscaleImage::new(w, h);
    for y in 0..h {
        let (ty0, ty1, wy) = locate(y, tiles_y);
        for x in 0..w {
            let (tx0, tx1, wx) = locate(x, tiles_x);
            let v = image.get(x, y) as f64;
            let m00 = mappings[ty0 * tiles_x + tx0].apply(v);
            let m10 = mappings[ty0 * tiles_x + tx1].apply(v);
            let m01 = mappings[ty1 * tiles_x + tx0].apply(v);
            let m11 = mappings[ty1 * tiles_x + tx1].apply(v);
            let top = m00 * (1.0 - wx) + m10 * wx;
            let bottom = m01 * (1.0 - wx) + m11 * wx;
            out.set(x, y, (top * (1.0 - wy) + bottom * wy).round().clamp(0.0, 255.0) as u8);
        }
    }
    out
}

/// Square median filter with clamped borders
pub fn median_filter(image: &GrayscaleImage, radius: usize) -> GrayscaleImage {
    if radius == 0 {
        return image.clone();
    }
    let r = radius as i64;
    let mut window = Vec::with_capacity(((2 * r + 1) * (2 * r + 1)) as usize);
    let mut out = GrayscaleImage::new(image.width, image.height);
    for y in 0..image.height {
        for x in 0..image.width {
            window.clear();
            for dy in -r..=r {
                for dx in -r..=r {
                    window.push(image.get_clamped(x as i64 + dx, y as i64 + dy));
                }
            }
            window.sort_unstable();
            out.set(x, y, window[window.len() / 2]);
        }
    }
    out
}

/// 3x3 Gaussian blur with weights 1-2-1 / 2-4-2 / 1-2-1 over 16
pub fn gaussian_blur_3x3(image: &GrayscaleImage) -> GrayscaleImage {
    const KERNEL: [[u32; 3]; 3] = [[1, 2, 1], [2, 4, 2], [1, 2, 1]];
    let mut out = GrayscaleImage::new(image.width, image.height);
    for y in 0..image.height {
        for x in 0..image.width {
            let mut acc = 0u32;
            for (ky, row) in KERNEL.iter().enumerate() {
                for (kx, &weight) in row.iter().enumerate() {
                    let px = image.get_clamped(x as i64 + kx as i64 - 1, y as i64 + ky as i64 - 1);
                    acc += weight * px as u32;
                }
            }
            out.set(x, y, ((acc + 8) / 16) as u8);
        }
    }
    out
}

/// Full preprocessing chain: luminance, local contrast, median, Gaussian
pub fn preprocess(buffer: &PixelBuffer, config: &Config) -> GrayscaleImage {
    let gray = to_grayscale(buffer);
    let stretched = local_contrast_stretch(
        &gray,
        config.clahe_tile_size as usize,
        config.clahe_low_percentile,
        config.clahe_high_percentile,
        config.clahe_min_range,
    );
    let denoised = median_filter(&stretched, config.median_radius as usize);
    let smoothed = gaussian_blur_3x3(&denoised);
    debug!(
        "preprocess: {}x{} image, tile {} px, median radius {}",
        smoothed.width, smoothed.height, config.clahe_tile_size, config.median_radius
    );
    smoothed
}
