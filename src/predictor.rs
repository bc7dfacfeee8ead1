//! Banknote predictor: detector output to denominations, totals and annotated frames

use crate::billetes_context;
use crate::config::AppConfig;
use crate::denomination::{self, Denomination};
use crate::error::{BilleteError, BilleteResult};
use crate::inference::{InferenceBackend, OrtBackendBuilder, YoloPostProcessor};
use crate::overlay;
use crate::preprocessing::Preprocessor;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

/// One detected banknote as reported to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BanknoteDetection {
    /// Class label, e.g. `"20000"`
    pub class: String,
    /// Confidence in percent, two decimals
    pub confidence: f64,
    pub is_colombian: bool,
    pub message: String,
    /// `[x1, y1, x2, y2]` in original frame pixels
    pub bbox: [f32; 4],
}

impl BanknoteDetection {
    /// Overlay colour for this detection
    pub fn color(&self) -> [u8; 3] {
        denomination::color_for(&self.class)
    }
}

/// Result of predicting a single frame
#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    pub detections: Vec<BanknoteDetection>,
    pub total_detected: usize,
    /// Sum of the face values of every Colombian banknote in the frame
    pub total_value: u64,
    /// Milliseconds spent in preprocessing, the detector and annotation, two decimals
    pub inference_time: f64,
    pub fps: f64,
    #[serde(skip)]
    pub annotated_image: RgbImage,
}

/// Wording of the message panel drawn on the frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelStyle {
    /// Full sentence, as returned by the API
    Api,
    /// Short form for the camera window
    Live,
}

/// Runs the detector and turns its boxes into banknote predictions
pub struct BanknotePredictor {
    backend: Box<dyn InferenceBackend>,
    preprocessor: Preprocessor,
    class_names: Vec<String>,
}

impl BanknotePredictor {
    /// Wrap a loaded backend
    ///
    /// Class names come from `configured_names` when given, otherwise from the
    /// model metadata, otherwise the seven denominations in ascending order.
    pub fn new(backend: Box<dyn InferenceBackend>, configured_names: Vec<String>) -> Self {
        let preprocessor = match backend.get_input_shape() {
            [_, _, h, w] => Preprocessor::new(*w as u32, *h as u32),
            _ => Preprocessor::default(),
        };

        let class_names = if !configured_names.is_empty() {
            configured_names
        } else {
            let from_model = backend.class_names();
            if from_model.is_empty() {
                Denomination::default_class_names()
            } else {
                from_model
            }
        };
        debug!("Class table: {:?}", class_names);

        Self {
            backend,
            preprocessor,
            class_names,
        }
    }

    /// Build an ONNX Runtime backend from configuration and load the model
    pub fn from_config(config: &AppConfig, confidence_threshold: f32) -> BilleteResult<Self> {
        let [width, height] = config.preprocessing.target_size;
        let num_classes = if config.inference.class_names.is_empty() {
            Denomination::ALL.len()
        } else {
            config.inference.class_names.len()
        };

        let post_processor = YoloPostProcessor::new(num_classes, config.inference.iou_threshold)
            .with_max_detections(config.inference.max_detections);

        let mut backend = OrtBackendBuilder::new()
            .with_input_shape(vec![1, 3, height as usize, width as usize])
            .with_confidence_threshold(confidence_threshold)
            .with_post_processor(Box::new(post_processor))
            .with_device(&config.inference.device)
            .with_intra_threads(config.inference.intra_threads)
            .build();

        if !config.model_exists() {
            return Err(BilleteError::ModelLoadError(config.model_path().to_path_buf()));
        }

        billetes_context!(
            backend.load_model(config.model_path()),
            "loading detection model"
        )?;

        info!(
            "Predictor ready: model={} confidence={} provider={}",
            config.model_path().display(),
            confidence_threshold,
            backend.execution_provider()
        );

        Ok(Self::new(
            Box::new(backend),
            config.inference.class_names.clone(),
        ))
    }

    /// Label for a class id; ids outside the table render as the number itself
    pub fn label_for(&self, class_id: usize) -> String {
        self.class_names
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| class_id.to_string())
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn gpu_available(&self) -> bool {
        self.backend.execution_provider().is_accelerated()
    }

    pub fn model_loaded(&self) -> bool {
        self.backend.is_loaded()
    }

    /// Detect banknotes without drawing anything; returns detections and elapsed milliseconds
    pub fn detect(&self, image: &RgbImage) -> BilleteResult<(Vec<BanknoteDetection>, f64)> {
        let start = Instant::now();

        let (tensor, letterbox) = self
            .preprocessor
            .process(image)
            .map_err(|e| BilleteError::ImageDecodeError(e.to_string()))?;

        let raw = self.backend.infer(&tensor)?;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        let detections = raw
            .iter()
            .map(|det| {
                let det = det.scale_to_original(&letterbox);
                let class = self.label_for(det.class_id);
                let is_colombian = Denomination::from_label(&class).is_some();
                BanknoteDetection {
                    message: denomination::message_for(&class, is_colombian),
                    confidence: round2(det.score as f64 * 100.0),
                    is_colombian,
                    class,
                    bbox: [det.x1, det.y1, det.x2, det.y2],
                }
            })
            .collect();

        Ok((detections, elapsed_ms))
    }

    /// Full prediction with the API-style annotation
    pub fn predict(&self, image: &RgbImage) -> BilleteResult<Prediction> {
        self.predict_with_style(image, PanelStyle::Api)
    }

    pub fn predict_with_style(
        &self,
        image: &RgbImage,
        style: PanelStyle,
    ) -> BilleteResult<Prediction> {
        let start = Instant::now();
        let (detections, _) = self.detect(image)?;

        let total_value = denomination::total_value(
            detections
                .iter()
                .filter(|d| d.is_colombian)
                .map(|d| d.class.as_str()),
        );

        let mut annotated_image = image.clone();
        annotate(&mut annotated_image, &detections, total_value, style);

        let inference_time = round2(start.elapsed().as_secs_f64() * 1000.0);
        let fps = if inference_time > 0.0 {
            round2(1000.0 / inference_time)
        } else {
            0.0
        };

        debug!(
            "Predicted {} banknotes worth {} in {:.2}ms",
            detections.len(),
            total_value,
            inference_time
        );

        Ok(Prediction {
            total_detected: detections.len(),
            detections,
            total_value,
            inference_time,
            fps,
            annotated_image,
        })
    }
}

/// Draw boxes, the message panel and the total onto `image`
pub fn annotate(
    image: &mut RgbImage,
    detections: &[BanknoteDetection],
    total_value: u64,
    style: PanelStyle,
) {
    overlay::draw_detection_boxes(image, detections);

    let lines: Vec<(String, [u8; 3])> = detections
        .iter()
        .map(|det| {
            let message = match style {
                PanelStyle::Api => det.message.clone(),
                PanelStyle::Live => denomination::live_message_for(&det.class, det.is_colombian),
            };
            (
                format!("{} ({}%)", message, format_percent(det.confidence)),
                det.color(),
            )
        })
        .collect();

    let next_y = overlay::draw_message_panel(image, &lines);
    overlay::draw_total(image, total_value, next_y);
}

/// Percent as printed in the panel: `91.0`, `87.6`, `87.66`
fn format_percent(value: f64) -> String {
    let text = round2(value).to_string();
    if text.contains('.') {
        text
    } else {
        format!("{}.0", text)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{ExecutionProvider, InferenceError};
    use crate::utils::Detection;
    use std::path::Path;

    struct FixedBackend {
        detections: Vec<Detection>,
        names: Vec<String>,
    }

    impl InferenceBackend for FixedBackend {
        fn load_model(&mut self, _path: &Path) -> Result<(), InferenceError> {
            Ok(())
        }

        fn infer(&self, input: &[f32]) -> Result<Vec<Detection>, InferenceError> {
            assert_eq!(input.len(), 3 * 640 * 640);
            Ok(self.detections.clone())
        }

        fn get_input_shape(&self) -> &[usize] {
            &[1, 3, 640, 640]
        }

        fn get_confidence_threshold(&self) -> f32 {
            0.25
        }

        fn set_confidence_threshold(&mut self, _threshold: f32) {}

        fn class_names(&self) -> Vec<String> {
            self.names.clone()
        }

        fn execution_provider(&self) -> ExecutionProvider {
            ExecutionProvider::Cuda
        }

        fn is_loaded(&self) -> bool {
            true
        }
    }

    fn predictor(detections: Vec<Detection>, configured: Vec<String>) -> BanknotePredictor {
        BanknotePredictor::new(
            Box::new(FixedBackend {
                detections,
                names: Vec::new(),
            }),
            configured,
        )
    }

    #[test]
    fn test_default_class_table() {
        let predictor = predictor(Vec::new(), Vec::new());
        assert_eq!(predictor.label_for(0), "1000");
        assert_eq!(predictor.label_for(6), "100000");
        assert_eq!(predictor.label_for(42), "42");
        assert!(predictor.gpu_available());
        assert!(predictor.model_loaded());
    }

    #[test]
    fn test_class_table_priority() {
        let backend = FixedBackend {
            detections: Vec::new(),
            names: vec!["euro".to_string()],
        };
        let predictor = BanknotePredictor::new(Box::new(backend), Vec::new());
        assert_eq!(predictor.class_names(), &["euro".to_string()]);

        let backend = FixedBackend {
            detections: Vec::new(),
            names: vec!["euro".to_string()],
        };
        let predictor = BanknotePredictor::new(Box::new(backend), vec!["dolar".to_string()]);
        assert_eq!(predictor.label_for(0), "dolar");
    }

    #[test]
    fn test_predict_sums_colombian_banknotes() {
        // 640x640 input, no letterboxing, so boxes stay put
        let detections = vec![
            Detection::new(10.0, 10.0, 200.0, 100.0, 0.91, 5), // 50000
            Detection::new(300.0, 300.0, 500.0, 400.0, 0.876, 4), // 20000
            Detection::new(10.0, 400.0, 100.0, 500.0, 0.5, 9), // unknown id
        ];
        let predictor = predictor(detections, Vec::new());
        let image = RgbImage::new(640, 640);

        let prediction = predictor.predict(&image).unwrap();
        assert_eq!(prediction.total_detected, 3);
        assert_eq!(prediction.total_value, 70_000);

        let first = &prediction.detections[0];
        assert_eq!(first.class, "50000");
        assert_eq!(first.confidence, 91.0);
        assert!(first.is_colombian);
        assert_eq!(first.message, "Billete colombiano de $50000 COP");
        assert_eq!(first.bbox, [10.0, 10.0, 200.0, 100.0]);

        assert_eq!(prediction.detections[1].confidence, 87.6);

        let unknown = &prediction.detections[2];
        assert_eq!(unknown.class, "9");
        assert!(!unknown.is_colombian);
        assert_eq!(unknown.message, "Billete no colombiano o desconocido: 9");

        // Annotation happened on a copy with the same size
        assert_eq!(prediction.annotated_image.dimensions(), (640, 640));
        assert_ne!(prediction.annotated_image, image);
    }

    #[test]
    fn test_boxes_are_mapped_to_original_frame() {
        // 1280x960 frame: scale 0.5, 80px of padding top and bottom
        let detections = vec![Detection::new(100.0, 180.0, 300.0, 280.0, 0.8, 0)];
        let predictor = predictor(detections, Vec::new());

        let prediction = predictor.predict(&RgbImage::new(1280, 960)).unwrap();
        assert_eq!(prediction.detections[0].bbox, [200.0, 200.0, 600.0, 400.0]);
    }

    #[test]
    fn test_empty_frame_has_no_total() {
        let predictor = predictor(Vec::new(), Vec::new());
        let image = RgbImage::new(320, 240);

        let prediction = predictor.predict(&image).unwrap();
        assert_eq!(prediction.total_detected, 0);
        assert_eq!(prediction.total_value, 0);
        assert_eq!(prediction.annotated_image, image);
        assert!(prediction.fps >= 0.0);
    }

    #[test]
    fn test_serialization_skips_image() {
        let predictor = predictor(vec![Detection::new(0.0, 0.0, 50.0, 50.0, 0.7, 2)], Vec::new());
        let prediction = predictor.predict(&RgbImage::new(64, 64)).unwrap();

        let json = serde_json::to_value(&prediction).unwrap();
        assert!(json.get("annotated_image").is_none());
        assert_eq!(json["total_value"], 5000);
        assert_eq!(json["detections"][0]["class"], "5000");
    }

    #[test]
    fn test_panel_keeps_two_decimals() {
        let detection = |confidence: f64| BanknoteDetection {
            class: "20000".to_string(),
            confidence,
            is_colombian: true,
            message: "Billete colombiano de $20000 COP".to_string(),
            bbox: [20.0, 100.0, 200.0, 200.0],
        };

        let mut first = RgbImage::new(640, 480);
        annotate(&mut first, &[detection(87.66)], 20_000, PanelStyle::Api);
        let mut second = RgbImage::new(640, 480);
        annotate(&mut second, &[detection(87.70)], 20_000, PanelStyle::Api);

        assert_ne!(first, second);
    }

    #[test]
    fn test_timing_covers_whole_frame() {
        let detections = vec![Detection::new(10.0, 10.0, 600.0, 600.0, 0.9, 6)];
        let predictor = predictor(detections, Vec::new());

        let prediction = predictor.predict(&RgbImage::new(1920, 1080)).unwrap();
        // Copying and annotating a full HD frame is never free
        assert!(prediction.inference_time > 0.0);
        assert_eq!(prediction.fps, round2(1000.0 / prediction.inference_time));
    }

    #[test]
    fn test_format_percent() {
        assert_eq!(format_percent(87.66), "87.66");
        assert_eq!(format_percent(87.7), "87.7");
        assert_eq!(format_percent(91.0), "91.0");
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(12.345_6), 12.35);
        assert_eq!(round2(0.0), 0.0);
    }
}
