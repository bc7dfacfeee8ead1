//! Shared helpers for integration tests

#![allow(dead_code)]

use billetes::inference::{ExecutionProvider, InferenceBackend, InferenceError};
use billetes::predictor::BanknotePredictor;
use billetes::utils::Detection;
use image::{ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::path::Path;

/// Backend returning a fixed set of detections in model input pixels
pub struct MockBackend {
    pub detections: Vec<Detection>,
    pub fail: bool,
    pub input_shape: Vec<usize>,
}

impl MockBackend {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self {
            detections,
            fail: false,
            input_shape: vec![1, 3, 640, 640],
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Vec::new())
        }
    }
}

impl InferenceBackend for MockBackend {
    fn load_model(&mut self, _path: &Path) -> Result<(), InferenceError> {
        Ok(())
    }

    fn infer(&self, input: &[f32]) -> Result<Vec<Detection>, InferenceError> {
        if self.fail {
            return Err(InferenceError::InferenceFailed("mock failure".to_string()));
        }
        let expected: usize = self.input_shape.iter().product();
        if input.len() != expected {
            return Err(InferenceError::InvalidInputShape {
                expected: self.input_shape.clone(),
                actual: vec![input.len()],
            });
        }
        Ok(self.detections.clone())
    }

    fn get_input_shape(&self) -> &[usize] {
        &self.input_shape
    }

    fn get_confidence_threshold(&self) -> f32 {
        0.25
    }

    fn set_confidence_threshold(&mut self, _threshold: f32) {}

    fn execution_provider(&self) -> ExecutionProvider {
        ExecutionProvider::Cpu
    }

    fn is_loaded(&self) -> bool {
        true
    }
}

/// Predictor over the mock backend with the default class table
pub fn mock_predictor(detections: Vec<Detection>) -> BanknotePredictor {
    BanknotePredictor::new(Box::new(MockBackend::new(detections)), Vec::new())
}

/// A 50000 and a 20000 banknote, plus a box of an unknown class
pub fn sample_detections() -> Vec<Detection> {
    vec![
        Detection::new(40.0, 40.0, 300.0, 200.0, 0.93, 5),
        Detection::new(320.0, 300.0, 600.0, 460.0, 0.81, 4),
        Detection::new(100.0, 500.0, 200.0, 600.0, 0.40, 11),
    ]
}

pub fn test_image(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    })
}

pub fn encode(image: &RgbImage, format: ImageFormat) -> Vec<u8> {
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, format).unwrap();
    bytes.into_inner()
}
