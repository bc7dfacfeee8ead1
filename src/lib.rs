//! Colombian banknote detection
//!
//! Application layer around a pretrained YOLO detector exported to ONNX:
//! maps detections to peso denominations, sums the amount in frame and
//! draws annotated frames for a desktop camera window, a REST endpoint and
//! a WebSocket endpoint.

pub mod codec;
pub mod config;
pub mod denomination;
pub mod error;
pub mod inference;
pub mod live;
pub mod metrics;
pub mod overlay;
pub mod predictor;
pub mod preprocessing;
pub mod server;
pub mod utils;

// Re-export commonly used types
pub use config::{AppConfig, ConfigOverrides, InferenceConfig, LiveConfig, ServerConfig};
pub use denomination::Denomination;
pub use error::{BilleteError, BilleteResult};
pub use inference::{InferenceBackend, InferenceError, OrtBackend};
pub use metrics::{FpsCalculator, FrameTimer, Metrics};
pub use predictor::{BanknoteDetection, BanknotePredictor, PanelStyle, Prediction};
pub use preprocessing::Preprocessor;
pub use utils::Detection;

/// Current version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
