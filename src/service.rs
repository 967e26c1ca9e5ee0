// src/service.rs - JSON body for the image analysis endpoint

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use log::info;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::errors::Result;
use crate::geometry::{EllipseModel, Point};
use crate::overlay::{encode_png, render_overlay};
use crate::pipeline::{measure_image, AngleResult};

/// Response of `POST /analyze`. Field names are part of the wire contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub left_angle_deg: f64,
    pub right_angle_deg: f64,
    pub mean_angle_deg: f64,
    pub left_contact: Point,
    pub right_contact: Point,
    pub ellipse: EllipseModel,
    pub confidence: f64,
    /// Base64 PNG of the annotated input
    pub overlay_png_b64: String,
}

impl AnalyzeResponse {
    pub fn from_result(result: &AngleResult, overlay_png: &[u8]) -> Self {
        Self {
            left_angle_deg: result.left_angle_deg,
            right_angle_deg: result.right_angle_deg,
            mean_angle_deg: result.mean_angle_deg,
            left_contact: result.left_contact,
            right_contact: result.right_contact,
            ellipse: result.ellipse,
            confidence: result.confidence,
            overlay_png_b64: STANDARD.encode(overlay_png),
        }
    }
}

/// Decode an uploaded image (any format `image` reads), measure it and
/// render the overlay
pub fn analyze_image_bytes(bytes: &[u8], config: &Config) -> Result<AnalyzeResponse> {
    let image = image::load_from_memory(bytes)?.to_rgba8();
    info!("analyze: {} byte upload, {}x{}", bytes.len(), image.width(), image.height());
    let result = measure_image(&image, config)?;
    let overlay = encode_png(&render_overlay(&image, &result))?;
    Ok(AnalyzeResponse::from_result(&result, &overlay))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ContactAngleError;
    use image::{Rgba, RgbaImage};

    #[test]
    fn response_uses_wire_field_names() {
        let image = RgbaImage::from_fn(200, 200, |x, y| {
            let (dx, dy) = (x as f64 - 100.0, y as f64 - 140.0);
            if y < 140 && dx.hypot(dy) <= 80.0 {
                Rgba([30, 30, 30, 255])
            } else {
                Rgba([210, 210, 210, 255])
            }
        });
        let upload = encode_png(&image).unwrap();
        let response = analyze_image_bytes(&upload, &Config::default()).unwrap();
        let json = serde_json::to_value(&response).unwrap();
        for key in [
            "left_angle_deg",
            "right_angle_deg",
            "mean_angle_deg",
            "left_contact",
            "right_contact",
            "ellipse",
            "confidence",
            "overlay_png_b64",
        ] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
        assert!(json["ellipse"].get("angle_deg").is_some());
        assert!(json["left_contact"].get("x").is_some());
        let png = STANDARD.decode(&response.overlay_png_b64).unwrap();
        assert!(image::load_from_memory(&png).is_ok());
    }

    #[test]
    fn undecodable_upload_is_an_image_error() {
        let err = analyze_image_bytes(b"not an image", &Config::default()).unwrap_err();
        assert!(matches!(err, ContactAngleError::Image(_)));
    }
}
