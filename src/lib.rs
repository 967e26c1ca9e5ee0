// src/lib.rs - Library interface for automatic contact angle measurement

pub mod angle;
pub mod baseline;
pub mod cache;
pub mod config;
pub mod contact;
pub mod contour;
pub mod errors;
pub mod fitting;
pub mod geometry;
pub mod image_io;
pub mod image_utils;
pub mod morphology;
pub mod output;
pub mod overlay;
pub mod pipeline;
pub mod preprocess;
pub mod quality;
pub mod segmentation;
pub mod service;
pub mod tangent;
pub mod worker;

// Re-export commonly used types and functions
pub use config::Config;
pub use errors::{ContactAngleError, ErrorKind, ErrorReport, Result};
pub use image_io::{load_image, save_image, InputImage};
pub use image_utils::PixelBuffer;
pub use pipeline::{
    analyze_contacts, measure, measure_buffer, measure_image, measure_with_cache, AngleResult,
    BaselineParams, ContactAnalysis, DebugInfo,
};

// Stage types
pub use angle::{contact_angle, AngleSummary};
pub use baseline::{
    default_detectors, estimate_baseline, BaselineCandidate, BaselineContext, BaselineDetector,
    BaselineEstimate, DetectorKind,
};
pub use cache::{fingerprint, MeasurementCache};
pub use contact::{localize_contacts, ContactPair, ContactPoint, Side};
pub use contour::{extract_contour, Contour};
pub use geometry::{CircleModel, EllipseModel, LineModel, Point, Scale};
pub use quality::{ConfidenceLabel, QualityMetrics};
pub use tangent::{estimate_tangent, TangentEstimate, TangentMethod};

// Outer surfaces
pub use output::{write_result_json, write_summary_csv, MeasurementRecord};
pub use overlay::{encode_png, render_overlay};
pub use service::{analyze_image_bytes, AnalyzeResponse};
pub use worker::{MeasurementTask, MeasurementWorker};
