// tests/common/synthetic.rs - Synthetic droplet photographs and outlines

use contact_angle_rust_lib::{Contour, PixelBuffer, Point};

/// Row-major RGBA bytes of a gray image given by `f(x, y)`
pub fn gray_rgba<F: Fn(u32, u32) -> u8>(width: u32, height: u32, f: F) -> Vec<u8> {
    let mut bytes = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            let v = f(x, y);
            bytes.extend_from_slice(&[v, v, v, 255]);
        }
    }
    bytes
}

pub fn buffer<F: Fn(u32, u32) -> u8>(width: u32, height: u32, f: F) -> PixelBuffer {
    PixelBuffer::new(gray_rgba(width, height, f), width, height).unwrap()
}

/// 200×200 dark half-disk of radius 80 centred at (100, 140), resting on y = 140
pub fn half_disk() -> PixelBuffer {
    buffer(200, 200, |x, y| {
        let (dx, dy) = (x as f64 - 100.0, y as f64 - 140.0);
        if y < 140 && dx.hypot(dy) <= 80.0 {
            30
        } else {
            210
        }
    })
}

/// Circle of radius `r` centred at (cx, cy), cut by the substrate at `baseline_y`
pub fn circular_cap(width: u32, height: u32, cx: f64, cy: f64, r: f64, baseline_y: u32) -> PixelBuffer {
    buffer(width, height, |x, y| {
        let (dx, dy) = (x as f64 - cx, y as f64 - cy);
        if y < baseline_y && dx.hypot(dy) <= r {
            25
        } else {
            215
        }
    })
}

/// Like `circular_cap`, but each pixel takes the dark/bright mix of its 4×4
/// subsample coverage, so the edge sits exactly on the circle and on
/// `y = baseline_y`
pub fn covered_cap(width: u32, height: u32, cx: f64, cy: f64, r: f64, baseline_y: f64) -> PixelBuffer {
    const SUB: usize = 4;
    let (dark, bright) = (25.0, 215.0);
    buffer(width, height, |x, y| {
        let mut covered = 0;
        for sy in 0..SUB {
            for sx in 0..SUB {
                let px = x as f64 + (sx as f64 + 0.5) / SUB as f64 - 0.5;
                let py = y as f64 + (sy as f64 + 0.5) / SUB as f64 - 0.5;
                if py < baseline_y && (px - cx).hypot(py - cy) <= r {
                    covered += 1;
                }
            }
        }
        let coverage = covered as f64 / (SUB * SUB) as f64;
        (bright + (dark - bright) * coverage).round() as u8
    })
}

/// Contact angle of a circular cap: 90° + asin((baseline_y - cy) / r)
pub fn cap_angle(cy: f64, r: f64, baseline_y: f64) -> f64 {
    90.0 + ((baseline_y - cy) / r).asin().to_degrees()
}

/// Ellipse centred at (100, 120), semi-axes 60 and 40, rotated 20°, cut at
/// y = 140. The left half of the drop is much darker than the right half.
pub fn tilted_ellipse() -> PixelBuffer {
    let (cx, cy, a, b) = (100.0, 120.0, 60.0, 40.0);
    let (s, c) = 20f64.to_radians().sin_cos();
    buffer(200, 200, |x, y| {
        let (dx, dy) = (x as f64 - cx, y as f64 - cy);
        let (u, v) = (dx * c + dy * s, -dx * s + dy * c);
        let inside = (u / a).powi(2) + (v / b).powi(2) <= 1.0;
        if y < 140 && inside {
            if (x as f64) < cx {
                20
            } else {
                110
            }
        } else {
            220
        }
    })
}

/// Outline of a circle cut by `y = baseline_y`, keeping points up to
/// `overshoot` pixels below the line
pub fn circle_cap_contour(cx: f64, cy: f64, r: f64, baseline_y: f64, overshoot: f64) -> Contour {
    let points = (0..720)
        .map(|i| {
            let t = i as f64 * std::f64::consts::TAU / 720.0;
            Point::new(cx + r * t.cos(), cy + r * t.sin())
        })
        .filter(|p| p.y <= baseline_y + overshoot)
        .collect();
    Contour::from_unordered(points)
}
