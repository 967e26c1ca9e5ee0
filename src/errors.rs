use serde::Serialize;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Custom error types for contact angle measurement
#[derive(Error, Debug)]
pub enum ContactAngleError {
    #[error("Pixel buffer is {actual} bytes but {width}x{height} RGBA needs {expected}")]
    ImageLoad {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("Segmentation produced no foreground pixels")]
    EmptyMask,

    #[error("Droplet contour has {found} points, at least {required} are required")]
    InsufficientContour { found: usize, required: usize },

    #[error("No baseline detector found enough support points")]
    InsufficientBaselineSupport,

    #[error("Degenerate geometry: {0}")]
    DegenerateGeometry(String),

    #[error("Numerical instability: {0}")]
    NumericalInstability(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to load configuration from {path}: {source}")]
    ConfigLoad {
        source: toml::de::Error,
        path: PathBuf,
    },

    #[error("CSV output error: {0}")]
    CsvOutput(#[from] csv::Error),

    #[error("JSON output error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid input path: {0}")]
    InvalidPath(PathBuf),

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("Unexpected error: {0}")]
    Other(String),
}

/// Coarse classification of a failure, stable across message wording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    ImageLoad,
    EmptyMask,
    InsufficientContour,
    InsufficientBaselineSupport,
    DegenerateGeometry,
    NumericalInstability,
    Io,
    Config,
    Output,
    Worker,
    Other,
}

/// The single structured error shown to a user for a failed measurement
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
}

impl ContactAngleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ContactAngleError::ImageLoad { .. } | ContactAngleError::Image(_) => ErrorKind::ImageLoad,
            ContactAngleError::EmptyMask => ErrorKind::EmptyMask,
            ContactAngleError::InsufficientContour { .. } => ErrorKind::InsufficientContour,
            ContactAngleError::InsufficientBaselineSupport => ErrorKind::InsufficientBaselineSupport,
            ContactAngleError::DegenerateGeometry(_) => ErrorKind::DegenerateGeometry,
            ContactAngleError::NumericalInstability(_) => ErrorKind::NumericalInstability,
            ContactAngleError::Io(_) | ContactAngleError::InvalidPath(_) => ErrorKind::Io,
            ContactAngleError::Config(_) | ContactAngleError::ConfigLoad { .. } => ErrorKind::Config,
            ContactAngleError::CsvOutput(_) | ContactAngleError::Json(_) => ErrorKind::Output,
            ContactAngleError::Worker(_) => ErrorKind::Worker,
            ContactAngleError::Other(_) => ErrorKind::Other,
        }
    }

    /// Hard failures are the ones a caller is expected to see from `measure`
    pub fn is_hard_failure(&self) -> bool {
        matches!(
            self,
            ContactAngleError::ImageLoad { .. }
                | ContactAngleError::EmptyMask
                | ContactAngleError::InsufficientContour { .. }
        )
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

/// Type alias for Result with our custom error type
pub type Result<T> = std::result::Result<T, ContactAngleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_carries_kind_and_diagnostic() {
        let err = ContactAngleError::InsufficientContour { found: 5, required: 20 };
        let report = err.report();
        assert_eq!(report.kind, ErrorKind::InsufficientContour);
        assert!(report.message.contains('5'));
        assert!(err.is_hard_failure());
    }

    #[test]
    fn recovered_kinds_are_not_hard_failures() {
        assert!(!ContactAngleError::InsufficientBaselineSupport.is_hard_failure());
        assert!(!ContactAngleError::NumericalInstability("singular".into()).is_hard_failure());
    }
}
