//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Inference configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Path to the YOLO model exported to ONNX
    pub model_path: PathBuf,
    /// Confidence threshold for detections
    pub confidence_threshold: f32,
    /// IoU threshold used by non-maximum suppression
    pub iou_threshold: f32,
    /// Upper bound on detections kept per frame
    pub max_detections: usize,
    /// Device: "auto", "cpu", "cuda", "coreml"
    pub device: String,
    /// Intra-op threads for the ONNX session
    pub intra_threads: usize,
    /// Class names indexed by class id; empty means "read from the model"
    pub class_names: Vec<String>,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("ml/best.onnx"),
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
            max_detections: 300,
            device: "auto".to_string(),
            intra_threads: 4,
            class_names: Vec::new(),
        }
    }
}

/// Preprocessing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessingConfig {
    /// Model input size [width, height]
    pub target_size: [u32; 2],
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            target_size: [640, 640],
        }
    }
}

/// HTTP / WebSocket server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Largest accepted upload in bytes
    pub max_upload_bytes: usize,
    /// JPEG quality of the returned annotated image (1-100)
    pub jpeg_quality: u8,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            max_upload_bytes: 10 * 1024 * 1024,
            jpeg_quality: 90,
        }
    }
}

/// Desktop camera window configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// Camera index; `None` asks on stdin
    pub camera: Option<u32>,
    pub frame_width: u32,
    pub frame_height: u32,
    /// Confidence threshold used in the camera loop
    pub confidence_threshold: f32,
    pub window_title: String,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            camera: None,
            frame_width: 640,
            frame_height: 480,
            confidence_threshold: 0.6,
            window_title: "Detector de Billetes".to_string(),
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub inference: InferenceConfig,
    pub preprocessing: PreprocessingConfig,
    pub server: ServerConfig,
    pub live: LiveConfig,
}

impl AppConfig {
    /// Load configuration from TOML file
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileReadError(path.to_path_buf(), e))?;

        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)
            .map_err(|e| ConfigError::ParseError(format!("TOML parse error: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_toml_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(format!("TOML serialize error: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| ConfigError::FileWriteError(path.to_path_buf(), e))?;

        Ok(())
    }

    /// Load the file if given, otherwise start from defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_toml_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Apply command line overrides on top of file values
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(model) = overrides.model_path {
            self.inference.model_path = model;
        }
        if let Some(confidence) = overrides.confidence_threshold {
            self.inference.confidence_threshold = confidence;
            self.live.confidence_threshold = confidence;
        }
        if let Some(device) = overrides.device {
            self.inference.device = device;
        }
        if let Some(host) = overrides.host {
            self.server.host = host;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(camera) = overrides.camera {
            self.live.camera = Some(camera);
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            (
                "inference.confidence_threshold",
                self.inference.confidence_threshold,
            ),
            ("inference.iou_threshold", self.inference.iou_threshold),
            ("live.confidence_threshold", self.live.confidence_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidValue(format!(
                    "{} must be between 0.0 and 1.0, got {}",
                    field, value
                )));
            }
        }

        if self.inference.max_detections == 0 {
            return Err(ConfigError::InvalidValue(
                "inference.max_detections must be greater than 0".to_string(),
            ));
        }

        if self.inference.intra_threads == 0 {
            return Err(ConfigError::InvalidValue(
                "inference.intra_threads must be greater than 0".to_string(),
            ));
        }

        if !["auto", "cpu", "cuda", "coreml"].contains(&self.inference.device.as_str()) {
            return Err(ConfigError::InvalidValue(format!(
                "unsupported device: {}",
                self.inference.device
            )));
        }

        if self.preprocessing.target_size[0] == 0 || self.preprocessing.target_size[1] == 0 {
            return Err(ConfigError::InvalidValue(
                "target_size dimensions must be greater than 0".to_string(),
            ));
        }

        if self.live.frame_width == 0 || self.live.frame_height == 0 {
            return Err(ConfigError::InvalidValue(
                "live frame dimensions must be greater than 0".to_string(),
            ));
        }

        if !(1..=100).contains(&self.server.jpeg_quality) {
            return Err(ConfigError::InvalidValue(format!(
                "server.jpeg_quality must be between 1 and 100, got {}",
                self.server.jpeg_quality
            )));
        }

        Ok(())
    }

    /// Get model file path
    pub fn model_path(&self) -> &Path {
        &self.inference.model_path
    }

    /// Check if model file exists
    pub fn model_exists(&self) -> bool {
        self.inference.model_path.exists()
    }

    /// Socket address string for the server
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// Values given on the command line; `None` keeps the file/default value
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub model_path: Option<PathBuf>,
    pub confidence_threshold: Option<f32>,
    pub device: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub camera: Option<u32>,
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    FileReadError(PathBuf, std::io::Error),

    #[error("Failed to write config file {0}: {1}")]
    FileWriteError(PathBuf, std::io::Error),

    #[error("Config parse error: {0}")]
    ParseError(String),

    #[error("Config serialize error: {0}")]
    SerializeError(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}
