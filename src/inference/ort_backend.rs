//! ONNX Runtime backend implementation

use super::{
    parse_ultralytics_names, ExecutionProvider, InferenceBackend, InferenceError,
    ModelPostProcessor, YoloPostProcessor,
};
use crate::utils::Detection;
use ort::{
    session::{builder::GraphOptimizationLevel, builder::SessionBuilder, Session},
    value::Tensor,
};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Metadata key Ultralytics uses for the class table
const NAMES_METADATA_KEY: &str = "names";

/// ONNX Runtime inference backend
pub struct OrtBackend {
    session: Option<Arc<Mutex<Session>>>,
    input_name: String,
    input_shape: Vec<usize>,
    confidence_threshold: f32,
    post_processor: Box<dyn ModelPostProcessor + Send + Sync>,
    device: String,
    intra_threads: usize,
    provider: ExecutionProvider,
    class_names: Vec<String>,
}

impl OrtBackend {
    /// Create a new ORT backend with default settings
    pub fn new() -> Self {
        OrtBackendBuilder::new().build()
    }

    /// Create a new ORT backend that never tries an accelerator
    pub fn with_cpu_only() -> Self {
        OrtBackendBuilder::new().with_device("cpu").build()
    }

    fn base_builder(intra_threads: usize) -> Result<SessionBuilder, InferenceError> {
        Session::builder()
            .map_err(|e| {
                InferenceError::OrtError(format!("Failed to create session builder: {}", e))
            })?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                InferenceError::OrtError(format!("Failed to set optimization level: {}", e))
            })?
            .with_intra_threads(intra_threads)
            .map_err(|e| InferenceError::OrtError(format!("Failed to set intra threads: {}", e)))
    }

    /// Create a session, trying the requested accelerator first and falling back to CPU
    fn create_session(
        model_path: &Path,
        device: &str,
        intra_threads: usize,
    ) -> Result<(Session, ExecutionProvider), InferenceError> {
        let want_cuda = matches!(device, "auto" | "cuda");
        let want_coreml = matches!(device, "auto" | "coreml");

        #[cfg(feature = "cuda")]
        if want_cuda {
            use ort::execution_providers::{
                CUDAExecutionProvider, ExecutionProvider as OrtExecutionProvider,
            };

            let cuda = CUDAExecutionProvider::default();
            if cuda.is_available().unwrap_or(false) {
                info!("CUDA available, creating session with CUDA execution provider");
                let session = Self::base_builder(intra_threads)?
                    .with_execution_providers([cuda.build().error_on_failure()])
                    .map_err(|e| e.to_string())
                    .and_then(|b| b.commit_from_file(model_path).map_err(|e| e.to_string()));

                match session {
                    Ok(session) => return Ok((session, ExecutionProvider::Cuda)),
                    Err(e) => warn!("Failed to load model with CUDA: {}. Falling back", e),
                }
            } else {
                warn!("CUDA execution provider unavailable on this system");
            }
        }

        #[cfg(not(feature = "cuda"))]
        if device == "cuda" {
            warn!("Built without the `cuda` feature, using CPU execution provider");
        }
        let _ = want_cuda;

        #[cfg(target_vendor = "apple")]
        if want_coreml {
            use ort::execution_providers::{
                CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
            };

            let coreml = CoreMLExecutionProvider::default();
            if coreml.is_available().unwrap_or(false) {
                info!("CoreML available, creating session with CoreML execution provider");
                let session = Self::base_builder(intra_threads)?
                    .with_execution_providers([coreml.build().error_on_failure()])
                    .map_err(|e| e.to_string())
                    .and_then(|b| b.commit_from_file(model_path).map_err(|e| e.to_string()));

                match session {
                    Ok(session) => return Ok((session, ExecutionProvider::CoreML)),
                    Err(e) => warn!("Failed to load model with CoreML: {}. Falling back", e),
                }
            } else {
                warn!("CoreML execution provider unavailable on this system");
            }
        }
        let _ = want_coreml;

        info!("Creating session with CPU execution provider");
        let session = Self::base_builder(intra_threads)?
            .commit_from_file(model_path)
            .map_err(|e| {
                InferenceError::ModelLoadError(format!(
                    "Failed to load model with CPU provider: {}",
                    e
                ))
            })?;

        Ok((session, ExecutionProvider::Cpu))
    }

    /// Class table from the model metadata, empty when absent
    fn read_class_names(session: &Session) -> Vec<String> {
        let raw = session
            .metadata()
            .ok()
            .and_then(|metadata| metadata.custom(NAMES_METADATA_KEY).ok().flatten());

        match raw {
            Some(raw) => {
                let names = parse_ultralytics_names(&raw);
                debug!("Model class names: {:?}", names);
                names
            }
            None => {
                debug!("Model carries no `{}` metadata", NAMES_METADATA_KEY);
                Vec::new()
            }
        }
    }

    /// Validate input tensor shape and data
    fn validate_input(&self, input: &[f32]) -> Result<(), InferenceError> {
        let expected_size: usize = self.input_shape.iter().product();
        if input.len() != expected_size {
            return Err(InferenceError::InvalidInputShape {
                expected: self.input_shape.clone(),
                actual: vec![input.len()],
            });
        }
        Ok(())
    }

    /// Convert input data to an ONNX tensor
    fn create_input_tensor(&self, input: &[f32]) -> Result<Tensor<f32>, InferenceError> {
        let array = ndarray::Array::from_shape_vec(self.input_shape.clone(), input.to_vec())
            .map_err(|e| InferenceError::OrtError(format!("Failed to create ndarray: {}", e)))?;

        Tensor::from_array(array)
            .map_err(|e| InferenceError::OrtError(format!("Failed to create input tensor: {}", e)))
    }
}

impl Default for OrtBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceBackend for OrtBackend {
    fn load_model(&mut self, path: &Path) -> Result<(), InferenceError> {
        if !path.exists() {
            return Err(InferenceError::ModelLoadError(format!(
                "Model file does not exist: {}",
                path.display()
            )));
        }

        let (session, provider) = Self::create_session(path, &self.device, self.intra_threads)?;

        if let Some(input) = session.inputs.first() {
            self.input_name = input.name.clone();
        }
        self.class_names = Self::read_class_names(&session);
        self.provider = provider;
        self.session = Some(Arc::new(Mutex::new(session)));

        info!(
            "Model {} loaded on {} ({} classes in metadata)",
            path.display(),
            self.provider,
            self.class_names.len()
        );

        Ok(())
    }

    fn infer(&self, input: &[f32]) -> Result<Vec<Detection>, InferenceError> {
        let inference_start = Instant::now();

        let session = self
            .session
            .as_ref()
            .ok_or(InferenceError::ModelNotLoaded)?;

        self.validate_input(input)?;

        let tensor_start = Instant::now();
        let input_tensor = self.create_input_tensor(input)?;
        let tensor_time = tensor_start.elapsed();

        let session_start = Instant::now();
        let mut session_guard = session.lock().map_err(|e| {
            InferenceError::InferenceFailed(format!("Failed to acquire session lock: {}", e))
        })?;
        let outputs = session_guard
            .run(ort::inputs![self.input_name.as_str() => input_tensor])
            .map_err(|e| InferenceError::InferenceFailed(format!("Session run failed: {}", e)))?;
        let session_time = session_start.elapsed();

        let first_output = outputs.values().next().ok_or_else(|| {
            InferenceError::InvalidOutputFormat("No outputs received from model".to_string())
        })?;

        let output_array = first_output.try_extract_array::<f32>().map_err(|e| {
            InferenceError::OrtError(format!("Failed to extract output tensor: {}", e))
        })?;

        let output_shape = output_array.shape().to_vec();
        let output_data: Vec<f32> = output_array.iter().copied().collect();

        let mut detections = self
            .post_processor
            .process_raw_output(&output_data, &output_shape)?;

        detections = self
            .post_processor
            .filter_by_confidence(detections, self.confidence_threshold);

        let iou_threshold = self.post_processor.iou_threshold();
        detections = self.post_processor.apply_nms(detections, iou_threshold);

        let total_time = inference_start.elapsed();

        debug!(
            "Inference timing - Total: {:.2}ms, Tensor: {:.2}ms, Session: {:.2}ms, Post-processing: {:.2}ms",
            total_time.as_secs_f64() * 1000.0,
            tensor_time.as_secs_f64() * 1000.0,
            session_time.as_secs_f64() * 1000.0,
            (total_time.saturating_sub(tensor_time + session_time)).as_secs_f64() * 1000.0
        );

        debug!(
            "inference_time_ms={:.2} detections={} execution_provider={}",
            total_time.as_secs_f64() * 1000.0,
            detections.len(),
            self.provider
        );

        Ok(detections)
    }

    fn get_input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    fn get_confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    fn set_confidence_threshold(&mut self, threshold: f32) {
        if !(0.0..=1.0).contains(&threshold) {
            warn!(
                "Invalid confidence threshold {}, keeping current value {}",
                threshold, self.confidence_threshold
            );
            return;
        }
        self.confidence_threshold = threshold;
    }

    fn class_names(&self) -> Vec<String> {
        self.class_names.clone()
    }

    fn execution_provider(&self) -> ExecutionProvider {
        self.provider
    }

    fn is_loaded(&self) -> bool {
        self.session.is_some()
    }
}

/// Builder for ORT backend configuration
pub struct OrtBackendBuilder {
    input_shape: Vec<usize>,
    confidence_threshold: f32,
    post_processor: Option<Box<dyn ModelPostProcessor + Send + Sync>>,
    device: String,
    intra_threads: usize,
}

impl OrtBackendBuilder {
    pub fn new() -> Self {
        Self {
            input_shape: vec![1, 3, 640, 640],
            confidence_threshold: 0.25,
            post_processor: None,
            device: "auto".to_string(),
            intra_threads: 4,
        }
    }

    /// Set the input shape
    pub fn with_input_shape(mut self, shape: Vec<usize>) -> Self {
        self.input_shape = shape;
        self
    }

    /// Set the confidence threshold
    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Set a custom post-processor
    pub fn with_post_processor(
        mut self,
        processor: Box<dyn ModelPostProcessor + Send + Sync>,
    ) -> Self {
        self.post_processor = Some(processor);
        self
    }

    /// "auto", "cpu", "cuda" or "coreml"
    pub fn with_device(mut self, device: &str) -> Self {
        self.device = device.to_string();
        self
    }

    pub fn with_intra_threads(mut self, threads: usize) -> Self {
        self.intra_threads = threads.max(1);
        self
    }

    /// Build the ORT backend
    pub fn build(self) -> OrtBackend {
        let post_processor = self
            .post_processor
            .unwrap_or_else(|| Box::new(YoloPostProcessor::banknote_default()));

        OrtBackend {
            session: None,
            input_name: "images".to_string(),
            input_shape: self.input_shape,
            confidence_threshold: self.confidence_threshold,
            post_processor,
            device: self.device,
            intra_threads: self.intra_threads,
            provider: ExecutionProvider::Cpu,
            class_names: Vec::new(),
        }
    }
}

impl Default for OrtBackendBuilder {
    fn default() -> Self {
        Self::new()
    }
}
