// src/overlay.rs - Annotated copy of the input showing the measured geometry

use std::io::Cursor;

use image::{DynamicImage, ImageOutputFormat, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};

use crate::errors::Result;
use crate::geometry::Point;
use crate::pipeline::AngleResult;

const CONTOUR_COLOR: Rgba<u8> = Rgba([0, 255, 120, 255]);
const ELLIPSE_COLOR: Rgba<u8> = Rgba([255, 200, 0, 255]);
const BASELINE_COLOR: Rgba<u8> = Rgba([0, 200, 255, 255]);
const CONTACT_COLOR: Rgba<u8> = Rgba([255, 60, 60, 255]);
const TANGENT_COLOR: Rgba<u8> = Rgba([255, 140, 0, 255]);

const ELLIPSE_SEGMENTS: usize = 90;
const CONTACT_RADIUS: i32 = 4;

fn segment(canvas: &mut RgbaImage, a: &Point, b: &Point, color: Rgba<u8>) {
    draw_line_segment_mut(canvas, (a.x as f32, a.y as f32), (b.x as f32, b.y as f32), color);
}

fn closed_polyline(canvas: &mut RgbaImage, points: &[Point], color: Rgba<u8>) {
    if points.len() < 2 {
        return;
    }
    for (i, a) in points.iter().enumerate() {
        segment(canvas, a, &points[(i + 1) % points.len()], color);
    }
}

/// Draw contour, fitted ellipse, baseline, contacts and tangents onto a copy
/// of `image`
pub fn render_overlay(image: &RgbaImage, result: &AngleResult) -> RgbaImage {
    let mut canvas = image.clone();

    closed_polyline(&mut canvas, &result.contour, CONTOUR_COLOR);

    let ellipse: Vec<Point> = (0..ELLIPSE_SEGMENTS)
        .map(|i| result.ellipse.point_at(i as f64 * std::f64::consts::TAU / ELLIPSE_SEGMENTS as f64))
        .collect();
    closed_polyline(&mut canvas, &ellipse, ELLIPSE_COLOR);

    let [start, end] = result.baseline_endpoints;
    segment(&mut canvas, &start, &end, BASELINE_COLOR);

    let reach = 0.25 * image.width().max(image.height()) as f64;
    for (contact, tangent) in [
        (result.left_contact, &result.left_tangent),
        (result.right_contact, &result.right_tangent),
    ] {
        let tip = Point::new(
            contact.x + reach * tangent.direction.0,
            contact.y + reach * tangent.direction.1,
        );
        segment(&mut canvas, &contact, &tip, TANGENT_COLOR);
        draw_filled_circle_mut(
            &mut canvas,
            (contact.x.round() as i32, contact.y.round() as i32),
            CONTACT_RADIUS,
            CONTACT_COLOR,
        );
    }

    canvas
}

/// PNG bytes of an RGBA image
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(image.clone()).write_to(&mut cursor, ImageOutputFormat::Png)?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::pipeline::measure_image;

    fn droplet_image() -> RgbaImage {
        RgbaImage::from_fn(200, 200, |x, y| {
            let (dx, dy) = (x as f64 - 100.0, y as f64 - 140.0);
            if y < 140 && dx.hypot(dy) <= 80.0 {
                Rgba([30, 30, 30, 255])
            } else {
                Rgba([210, 210, 210, 255])
            }
        })
    }

    #[test]
    fn overlay_marks_the_contacts() {
        let image = droplet_image();
        let result = measure_image(&image, &Config::default()).unwrap();
        let overlay = render_overlay(&image, &result);
        assert_eq!(overlay.dimensions(), image.dimensions());
        let c = result.left_contact;
        assert_eq!(*overlay.get_pixel(c.x.round() as u32, c.y.round() as u32), CONTACT_COLOR);
    }

    #[test]
    fn png_bytes_decode_back() {
        let image = RgbaImage::from_pixel(8, 6, Rgba([1, 2, 3, 255]));
        let bytes = encode_png(&image).unwrap();
        assert_eq!(&bytes[1..4], b"PNG");
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded, image);
    }
}
