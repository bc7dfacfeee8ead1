//! Error handling for the banknote detector
//!
//! Each layer keeps its own error enum (`InferenceError`, `ConfigError`); this
//! module gathers them into `BilleteError` for the binaries and the server.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the banknote detector
#[derive(Error, Debug)]
pub enum BilleteError {
    // Camera errors
    #[error("Camera {index} could not be opened")]
    CameraNotFound { index: u32 },

    #[error("Could not read a frame from the camera: {0}")]
    FrameReadFailed(String),

    #[error("GStreamer pipeline error: {0}")]
    PipelineError(String),

    // Model and inference errors
    #[error("Model loading failed: {0}")]
    ModelLoadError(PathBuf),

    #[error("Model not loaded")]
    ModelNotLoaded,

    #[error("Inference execution failed: {0}")]
    InferenceError(String),

    // Image errors
    #[error("Image could not be decoded: {0}")]
    ImageDecodeError(String),

    #[error("Image could not be encoded: {0}")]
    ImageEncodeError(String),

    #[error("Invalid base64 payload: {0}")]
    InvalidPayload(String),

    // Configuration errors
    #[error("Configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("Configuration parsing failed: {0}")]
    ConfigParseError(String),

    // Server errors
    #[error("Server error: {0}")]
    ServerError(String),

    #[error("File permission denied: {0}")]
    PermissionDenied(PathBuf),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

/// Result type alias for convenience
pub type BilleteResult<T> = std::result::Result<T, BilleteError>;

impl From<crate::inference::InferenceError> for BilleteError {
    fn from(err: crate::inference::InferenceError) -> Self {
        match err {
            crate::inference::InferenceError::ModelLoadError(msg) => {
                BilleteError::ModelLoadError(PathBuf::from(msg))
            }
            crate::inference::InferenceError::ModelNotLoaded => BilleteError::ModelNotLoaded,
            crate::inference::InferenceError::InferenceFailed(msg) => {
                BilleteError::InferenceError(msg)
            }
            crate::inference::InferenceError::OrtError(msg) => {
                BilleteError::InferenceError(format!("ONNX Runtime error: {}", msg))
            }
            other => BilleteError::InferenceError(other.to_string()),
        }
    }
}

impl From<crate::config::ConfigError> for BilleteError {
    fn from(err: crate::config::ConfigError) -> Self {
        match err {
            crate::config::ConfigError::FileReadError(path, e)
                if e.kind() == std::io::ErrorKind::NotFound =>
            {
                BilleteError::ConfigNotFound(path)
            }
            other => BilleteError::ConfigParseError(other.to_string()),
        }
    }
}

impl From<image::ImageError> for BilleteError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::Encoding(e) => BilleteError::ImageEncodeError(e.to_string()),
            other => BilleteError::ImageDecodeError(other.to_string()),
        }
    }
}

impl From<base64::DecodeError> for BilleteError {
    fn from(err: base64::DecodeError) -> Self {
        BilleteError::InvalidPayload(err.to_string())
    }
}

impl From<toml::de::Error> for BilleteError {
    fn from(err: toml::de::Error) -> Self {
        BilleteError::ConfigParseError(err.to_string())
    }
}

impl From<std::io::Error> for BilleteError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => {
                BilleteError::Unexpected(format!("File not found: {}", err))
            }
            std::io::ErrorKind::PermissionDenied => {
                BilleteError::PermissionDenied(PathBuf::from("unknown"))
            }
            _ => BilleteError::Unexpected(format!("I/O error: {}", err)),
        }
    }
}

/// Error context builder for adding additional information
pub struct ErrorContext {
    base_error: BilleteError,
    context: Vec<String>,
}

impl ErrorContext {
    pub fn new(error: BilleteError) -> Self {
        Self {
            base_error: error,
            context: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: &str) -> Self {
        self.context.push(context.to_string());
        self
    }

    pub fn build(self) -> BilleteError {
        if self.context.is_empty() {
            self.base_error
        } else {
            BilleteError::Unexpected(format!(
                "{}: {}",
                self.context.join(" -> "),
                self.base_error
            ))
        }
    }
}

/// Attach a context string to any error convertible into `BilleteError`
#[macro_export]
macro_rules! billetes_context {
    ($result:expr, $context:expr) => {
        $result.map_err(|e| {
            $crate::error::ErrorContext::new(e.into())
                .with_context($context)
                .build()
        })
    };
}
