use image::RgbaImage;

use crate::errors::{ContactAngleError, Result};
use crate::geometry::Scale;

/// Immutable row-major RGBA pixel grid, the sole external input of a measurement
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Wrap raw RGBA bytes, checking that the length matches the dimensions
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || data.len() != expected {
            return Err(ContactAngleError::ImageLoad {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { width, height, data })
    }

    pub fn from_rgba_image(image: &RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            data: image.as_raw().clone(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn to_rgba_image(&self) -> RgbaImage {
        // Length was validated on construction
        RgbaImage::from_raw(self.width, self.height, self.data.clone())
            .unwrap_or_else(|| RgbaImage::new(self.width, self.height))
    }
}

/// Single-channel intensity grid
#[derive(Debug, Clone, PartialEq)]
pub struct GrayscaleImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl GrayscaleImage {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height],
        }
    }

    pub fn from_fn<F: Fn(usize, usize) -> u8>(width: usize, height: usize, f: F) -> Self {
        let mut img = Self::new(width, height);
        for y in 0..height {
            for x in 0..width {
                img.data[y * width + x] = f(x, y);
            }
        }
        img
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: u8) {
        self.data[y * self.width + x] = value;
    }

    /// Pixel access with coordinates clamped into the image
    #[inline]
    pub fn get_clamped(&self, x: i64, y: i64) -> u8 {
        let cx = x.clamp(0, self.width as i64 - 1) as usize;
        let cy = y.clamp(0, self.height as i64 - 1) as usize;
        self.get(cx, cy)
    }

    /// Bilinear interpolation at a subpixel position, clamped at the borders
    pub fn sample_bilinear(&self, x: f64, y: f64) -> f64 {
        if self.width == 0 || self.height == 0 {
            return 0.0;
        }
        let x = x.clamp(0.0, (self.width - 1) as f64);
        let y = y.clamp(0.0, (self.height - 1) as f64);

        let x0 = x.floor() as i64;
        let y0 = y.floor() as i64;
        let dx = x - x0 as f64;
        let dy = y - y0 as f64;

        let p00 = self.get_clamped(x0, y0) as f64;
        let p10 = self.get_clamped(x0 + 1, y0) as f64;
        let p01 = self.get_clamped(x0, y0 + 1) as f64;
        let p11 = self.get_clamped(x0 + 1, y0 + 1) as f64;

        let top = p00 * (1.0 - dx) + p10 * dx;
        let bottom = p01 * (1.0 - dx) + p11 * dx;
        top * (1.0 - dy) + bottom * dy
    }
}

/// Binary foreground mask (1 = foreground)
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryMask {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl BinaryMask {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height],
        }
    }

    #[inline]
    pub fn is_set(&self, x: usize, y: usize) -> bool {
        self.data[y * self.width + x] != 0
    }

    /// Out-of-bounds coordinates count as background
    #[inline]
    pub fn is_set_i(&self, x: i64, y: i64) -> bool {
        in_bounds(x, y, self.width, self.height) && self.is_set(x as usize, y as usize)
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: bool) {
        self.data[y * self.width + x] = value as u8;
    }

    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&v| v != 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.data.iter().all(|&v| v == 0)
    }

}

/// Check if a point is inside the image bounds
#[inline]
pub fn in_bounds(x: i64, y: i64, width: usize, height: usize) -> bool {
    x >= 0 && y >= 0 && (x as usize) < width && (y as usize) < height
}

/// Downscale so the longest side is at most `max_dimension`.
/// Returns the (possibly unchanged) image and the per-axis factors mapping
/// processed coordinates back to the original frame; rounding the short
/// side to whole pixels makes the two differ slightly.
pub fn limit_dimensions(image: &RgbaImage, max_dimension: u32) -> (RgbaImage, Scale) {
    let (width, height) = image.dimensions();
    let longest = width.max(height);
    if longest <= max_dimension || max_dimension == 0 {
        return (image.clone(), Scale::IDENTITY);
    }
    let scale = max_dimension as f64 / longest as f64;
    let new_width = ((width as f64 * scale).round() as u32).max(1);
    let new_height = ((height as f64 * scale).round() as u32).max(1);
    let resized = image::imageops::resize(
        image,
        new_width,
        new_height,
        image::imageops::FilterType::Triangle,
    );
    let scale = Scale::new(width as f64 / new_width as f64, height as f64 / new_height as f64);
    (resized, scale)
}

/// Sobel derivatives of a grayscale image, clamped at the borders
#[derive(Debug, Clone)]
pub struct SobelResponse {
    pub width: usize,
    pub height: usize,
    pub gx: Vec<f32>,
    pub gy: Vec<f32>,
}

impl SobelResponse {
    pub fn compute(image: &GrayscaleImage) -> Self {
        let (w, h) = (image.width, image.height);
        let mut gx = vec![0.0f32; w * h];
        let mut gy = vec![0.0f32; w * h];
        for y in 0..h {
            for x in 0..w {
                let (xi, yi) = (x as i64, y as i64);
                let p = |dx: i64, dy: i64| image.get_clamped(xi + dx, yi + dy) as f32;
                let sx = (p(1, -1) + 2.0 * p(1, 0) + p(1, 1)) - (p(-1, -1) + 2.0 * p(-1, 0) + p(-1, 1));
                let sy = (p(-1, 1) + 2.0 * p(0, 1) + p(1, 1)) - (p(-1, -1) + 2.0 * p(0, -1) + p(1, -1));
                gx[y * w + x] = sx;
                gy[y * w + x] = sy;
            }
        }
        Self { width: w, height: h, gx, gy }
    }

    #[inline]
    pub fn magnitude_at(&self, x: usize, y: usize) -> f32 {
        let i = y * self.width + x;
        self.gx[i].hypot(self.gy[i])
    }

    /// Vertical derivative; positive when intensity increases downwards
    #[inline]
    pub fn gy_at(&self, x: usize, y: usize) -> f32 {
        self.gy[y * self.width + x]
    }

    pub fn magnitude(&self) -> Vec<f32> {
        self.gx
            .iter()
            .zip(self.gy.iter())
            .map(|(gx, gy)| gx.hypot(*gy))
            .collect()
    }
}
