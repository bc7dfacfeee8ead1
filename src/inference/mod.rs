//! ML inference abstractions and implementations

use crate::utils::Detection;
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

pub mod ort_backend;

pub use ort_backend::{OrtBackend, OrtBackendBuilder};

/// Execution provider a session ended up running on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionProvider {
    Cpu,
    Cuda,
    CoreML,
}

impl ExecutionProvider {
    /// Whether inference runs on an accelerator
    pub fn is_accelerated(&self) -> bool {
        !matches!(self, ExecutionProvider::Cpu)
    }
}

impl fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionProvider::Cpu => write!(f, "CPU"),
            ExecutionProvider::Cuda => write!(f, "CUDA"),
            ExecutionProvider::CoreML => write!(f, "CoreML"),
        }
    }
}

/// Inference backend trait for different ML frameworks
pub trait InferenceBackend: Send + Sync {
    /// Load a model from the given path
    fn load_model(&mut self, path: &Path) -> Result<(), InferenceError>;

    /// Run inference on a CHW input tensor; boxes are in model input pixels
    fn infer(&self, input: &[f32]) -> Result<Vec<Detection>, InferenceError>;

    /// Get the expected input shape [batch, channels, height, width]
    fn get_input_shape(&self) -> &[usize];

    /// Get the model's confidence threshold
    fn get_confidence_threshold(&self) -> f32;

    /// Set the confidence threshold for filtering detections
    fn set_confidence_threshold(&mut self, threshold: f32);

    /// Class names embedded in the model, indexed by class id (may be empty)
    fn class_names(&self) -> Vec<String> {
        Vec::new()
    }

    /// Execution provider in use
    fn execution_provider(&self) -> ExecutionProvider {
        ExecutionProvider::Cpu
    }

    /// Whether a model has been loaded
    fn is_loaded(&self) -> bool;
}

/// Model post-processor trait for converting raw outputs to detections
pub trait ModelPostProcessor {
    /// Process a raw output tensor of the given shape into detections
    fn process_raw_output(
        &self,
        output: &[f32],
        output_shape: &[usize],
    ) -> Result<Vec<Detection>, InferenceError>;

    /// Apply Non-Maximum Suppression to detections
    fn apply_nms(&self, detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection>;

    /// Filter detections by confidence threshold
    fn filter_by_confidence(&self, detections: Vec<Detection>, threshold: f32) -> Vec<Detection>;

    /// IoU threshold this processor was configured with
    fn iou_threshold(&self) -> f32;

    /// Keep at most this many detections per frame
    fn max_detections(&self) -> usize;
}

/// Inference-related errors
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("Model loading failed: {0}")]
    ModelLoadError(String),

    #[error("Inference failed: {0}")]
    InferenceFailed(String),

    #[error("Invalid input shape: expected {expected:?}, got {actual:?}")]
    InvalidInputShape {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Invalid output format: {0}")]
    InvalidOutputFormat(String),

    #[error("Model not loaded")]
    ModelNotLoaded,

    #[error("Invalid confidence threshold: {0} (must be between 0.0 and 1.0)")]
    InvalidConfidenceThreshold(f32),

    #[error("ORT runtime error: {0}")]
    OrtError(String),
}

/// Post-processor for Ultralytics YOLOv8/YOLO11 detection heads
///
/// The exported head is `[1, 4 + nc, anchors]`: rows 0..4 hold centre x,
/// centre y, width and height in input pixels, the remaining rows hold one
/// class score per anchor. Transposed `[1, anchors, 4 + nc]` exports are
/// accepted as well.
pub struct YoloPostProcessor {
    iou_threshold: f32,
    num_classes: usize,
    max_detections: usize,
}

impl YoloPostProcessor {
    /// Create a new YOLO post-processor
    pub fn new(num_classes: usize, iou_threshold: f32) -> Self {
        Self {
            iou_threshold,
            num_classes,
            max_detections: 300,
        }
    }

    /// Post-processor for the seven-denomination banknote model
    pub fn banknote_default() -> Self {
        Self::new(7, 0.45)
    }

    pub fn with_max_detections(mut self, max_detections: usize) -> Self {
        self.max_detections = max_detections;
        self
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}

impl ModelPostProcessor for YoloPostProcessor {
    fn process_raw_output(
        &self,
        output: &[f32],
        output_shape: &[usize],
    ) -> Result<Vec<Detection>, InferenceError> {
        let attributes = 4 + self.num_classes;

        // Drop the batch dimension
        let dims: Vec<usize> = match output_shape {
            [1, a, b] => vec![*a, *b],
            [a, b] => vec![*a, *b],
            other => {
                return Err(InferenceError::InvalidOutputFormat(format!(
                    "expected a [1, {}, N] tensor, got {:?}",
                    attributes, other
                )))
            }
        };

        if output.len() != dims[0] * dims[1] {
            return Err(InferenceError::InvalidOutputFormat(format!(
                "tensor holds {} values but shape is {:?}",
                output.len(),
                output_shape
            )));
        }

        // Channel-major unless only the second axis matches the attribute count.
        // A model trained on a different class count still decodes: its
        // attribute axis is the shorter one, anchors number in the thousands.
        let (channel_major, attributes) = if dims[0] == attributes {
            (true, attributes)
        } else if dims[1] == attributes {
            (false, attributes)
        } else if dims[0].min(dims[1]) > 4 && dims[0] != dims[1] {
            let inferred = dims[0].min(dims[1]);
            debug!(
                "Output {:?} does not match {} classes, decoding {} classes",
                output_shape,
                self.num_classes,
                inferred - 4
            );
            (dims[0] < dims[1], inferred)
        } else {
            return Err(InferenceError::InvalidOutputFormat(format!(
                "no axis of {:?} matches 4 box values + {} classes",
                output_shape, self.num_classes
            )));
        };
        let num_classes = attributes - 4;
        let num_boxes = if channel_major { dims[1] } else { dims[0] };

        let at = |anchor: usize, attr: usize| -> f32 {
            if channel_major {
                output[attr * num_boxes + anchor]
            } else {
                output[anchor * attributes + attr]
            }
        };

        let mut detections = Vec::new();

        for i in 0..num_boxes {
            let mut best_score = 0.0f32;
            let mut best_class = 0usize;

            for class_idx in 0..num_classes {
                let score = at(i, 4 + class_idx);
                if score > best_score {
                    best_score = score;
                    best_class = class_idx;
                }
            }

            if best_score > 0.0 {
                detections.push(Detection::from_center(
                    at(i, 0),
                    at(i, 1),
                    at(i, 2),
                    at(i, 3),
                    best_score,
                    best_class,
                ));
            }
        }

        Ok(detections)
    }

    fn apply_nms(&self, detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
        let mut kept = crate::utils::apply_nms(detections, iou_threshold);
        kept.truncate(self.max_detections);
        kept
    }

    fn filter_by_confidence(&self, detections: Vec<Detection>, threshold: f32) -> Vec<Detection> {
        crate::utils::filter_by_confidence(detections, threshold)
    }

    fn iou_threshold(&self) -> f32 {
        self.iou_threshold
    }

    fn max_detections(&self) -> usize {
        self.max_detections
    }
}

/// Class ids at or above this are treated as corrupt metadata and skipped
const MAX_CLASS_ID: usize = 65_536;

/// Parse the `names` metadata Ultralytics writes into exported ONNX models
///
/// The value is a Python dict literal such as `{0: '1000', 1: '10000'}`.
/// Entries are placed by their key; gaps are filled with the numeric id.
pub fn parse_ultralytics_names(raw: &str) -> Vec<String> {
    let body = raw.trim().trim_start_matches('{').trim_end_matches('}');

    let mut entries: Vec<(usize, String)> = split_outside_quotes(body)
        .into_iter()
        .filter_map(|entry| {
            let (key, value) = entry.split_once(':')?;
            let id = key.trim().parse::<usize>().ok()?;
            if id >= MAX_CLASS_ID {
                warn!("Ignoring class id {} in model metadata", id);
                return None;
            }
            let name = value.trim().trim_matches(|c| c == '\'' || c == '"');
            Some((id, name.to_string()))
        })
        .collect();

    entries.sort_by_key(|(id, _)| *id);

    let len = entries.last().map(|(id, _)| id + 1).unwrap_or(0);
    let mut names: Vec<String> = (0..len).map(|id| id.to_string()).collect();
    for (id, name) in entries {
        names[id] = name;
    }
    names
}

/// Split a dict body on commas that are not inside a quoted string
fn split_outside_quotes(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, ch) in body.char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (None, '\'') | (None, '"') => quote = Some(ch),
            (None, ',') => {
                parts.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&body[start..]);
    parts
}
