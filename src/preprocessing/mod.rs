//! Image preprocessing utilities

use anyhow::Result;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use rayon::prelude::*;

/// Padding colour used by Ultralytics letterboxing
const PAD_VALUE: u8 = 114;

/// How an original frame was placed onto the model input canvas
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxInfo {
    /// Resize factor applied to the original frame
    pub scale: f32,
    /// Horizontal padding on the left, in model pixels
    pub pad_x: f32,
    /// Vertical padding on the top, in model pixels
    pub pad_y: f32,
    pub original_width: u32,
    pub original_height: u32,
}

/// Image preprocessor for ML inference
#[derive(Clone, Debug)]
pub struct Preprocessor {
    target_width: u32,
    target_height: u32,
}

impl Preprocessor {
    /// Create a new preprocessor with target dimensions
    pub fn new(target_width: u32, target_height: u32) -> Self {
        Self {
            target_width,
            target_height,
        }
    }

    /// Letterbox an image to target size preserving aspect ratio
    pub fn letterbox(&self, src: &RgbImage) -> Result<(RgbImage, LetterboxInfo)> {
        let (orig_w, orig_h) = src.dimensions();
        if orig_w == 0 || orig_h == 0 {
            return Err(anyhow::anyhow!("Cannot letterbox an empty image"));
        }

        let scale = (self.target_width as f32 / orig_w as f32)
            .min(self.target_height as f32 / orig_h as f32);

        let new_w = ((orig_w as f32 * scale).round() as u32).clamp(1, self.target_width);
        let new_h = ((orig_h as f32 * scale).round() as u32).clamp(1, self.target_height);

        let mut dst = RgbImage::from_pixel(
            self.target_width,
            self.target_height,
            Rgb([PAD_VALUE, PAD_VALUE, PAD_VALUE]),
        );

        let resized = if (new_w, new_h) == (orig_w, orig_h) {
            src.clone()
        } else {
            imageops::resize(src, new_w, new_h, FilterType::Triangle)
        };

        // Centre the resized frame
        let x_offset = (self.target_width - new_w) / 2;
        let y_offset = (self.target_height - new_h) / 2;
        imageops::replace(&mut dst, &resized, x_offset as i64, y_offset as i64);

        let info = LetterboxInfo {
            scale,
            pad_x: x_offset as f32,
            pad_y: y_offset as f32,
            original_width: orig_w,
            original_height: orig_h,
        };

        Ok((dst, info))
    }

    /// Convert RGB image to normalized float values in HWC order
    pub fn rgb_to_tensor(&self, image: &RgbImage) -> Result<Vec<f32>> {
        let data = image.as_raw();
        let total_values = (self.target_width * self.target_height * 3) as usize;

        if data.len() < total_values {
            return Err(anyhow::anyhow!(
                "Image data too small: {} < {}",
                data.len(),
                total_values
            ));
        }

        let normalized: Vec<f32> = data[..total_values]
            .par_iter()
            .map(|&pixel| pixel as f32 / 255.0)
            .collect();

        Ok(normalized)
    }

    /// Convert HWC (Height-Width-Channel) to CHW (Channel-Height-Width) format
    pub fn hwc_to_chw(&self, hwc_data: &[f32]) -> Result<Vec<f32>> {
        let height = self.target_height as usize;
        let width = self.target_width as usize;
        let channels = 3;
        let total_size = height * width * channels;

        if hwc_data.len() != total_size {
            return Err(anyhow::anyhow!(
                "Data size mismatch: {} != {}",
                hwc_data.len(),
                total_size
            ));
        }

        let mut chw_data = vec![0.0f32; total_size];

        for c in 0..channels {
            for h in 0..height {
                for w in 0..width {
                    let src_idx = h * width * channels + w * channels + c;
                    let dst_idx = c * height * width + h * width + w;
                    chw_data[dst_idx] = hwc_data[src_idx];
                }
            }
        }

        Ok(chw_data)
    }

    /// Complete preprocessing pipeline: letterbox + normalize + format conversion
    pub fn process(&self, src: &RgbImage) -> Result<(Vec<f32>, LetterboxInfo)> {
        let (letterboxed, info) = self.letterbox(src)?;
        let normalized = self.rgb_to_tensor(&letterboxed)?;
        let chw_data = self.hwc_to_chw(&normalized)?;
        Ok((chw_data, info))
    }

    /// Get the target dimensions
    pub fn target_size(&self) -> (u32, u32) {
        (self.target_width, self.target_height)
    }

    /// Input shape in NCHW order
    pub fn input_shape(&self) -> Vec<usize> {
        vec![
            1,
            3,
            self.target_height as usize,
            self.target_width as usize,
        ]
    }
}

/// Default preprocessor for 640x640 YOLO models
impl Default for Preprocessor {
    fn default() -> Self {
        Self::new(640, 640)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_image(width: u32, height: u32) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([200, 100, 50]))
    }

    #[test]
    fn test_default_preprocessor() {
        let preprocessor = Preprocessor::default();
        assert_eq!(preprocessor.target_size(), (640, 640));
        assert_eq!(preprocessor.input_shape(), vec![1, 3, 640, 640]);
    }

    #[test]
    fn test_letterbox_square_image() {
        let preprocessor = Preprocessor::default();
        let (result, info) = preprocessor.letterbox(&create_test_image(640, 640)).unwrap();

        assert_eq!(result.dimensions(), (640, 640));
        assert_eq!(info.scale, 1.0);
        assert_eq!((info.pad_x, info.pad_y), (0.0, 0.0));
    }

    #[test]
    fn test_letterbox_camera_frame() {
        let preprocessor = Preprocessor::default();
        let (result, info) = preprocessor.letterbox(&create_test_image(640, 480)).unwrap();

        assert_eq!(result.dimensions(), (640, 640));
        assert_eq!(info.pad_y, 80.0);
        assert_eq!(info.pad_x, 0.0);

        // Bars are grey, content keeps its colour
        assert_eq!(result.get_pixel(320, 10), &Rgb([114, 114, 114]));
        assert_eq!(result.get_pixel(320, 320), &Rgb([200, 100, 50]));
    }

    #[test]
    fn test_letterbox_tall_image() {
        let preprocessor = Preprocessor::default();
        let (result, info) = preprocessor.letterbox(&create_test_image(480, 800)).unwrap();

        assert_eq!(result.dimensions(), (640, 640));
        // 480 * 0.8 = 384 wide, centred horizontally
        assert_eq!(info.pad_x, 128.0);
        assert_eq!(result.get_pixel(0, 320), &Rgb([114, 114, 114]));
    }

    #[test]
    fn test_letterbox_rejects_empty_image() {
        let preprocessor = Preprocessor::default();
        assert!(preprocessor.letterbox(&RgbImage::new(0, 0)).is_err());
    }

    #[test]
    fn test_hwc_to_chw_conversion() {
        let preprocessor = Preprocessor::new(2, 2);
        let hwc_data = vec![
            1.0, 2.0, 3.0, // Pixel (0,0)
            4.0, 5.0, 6.0, // Pixel (0,1)
            7.0, 8.0, 9.0, // Pixel (1,0)
            10.0, 11.0, 12.0, // Pixel (1,1)
        ];

        let chw_data = preprocessor.hwc_to_chw(&hwc_data).unwrap();

        let expected = vec![
            1.0, 4.0, 7.0, 10.0, // R channel
            2.0, 5.0, 8.0, 11.0, // G channel
            3.0, 6.0, 9.0, 12.0, // B channel
        ];

        assert_eq!(chw_data, expected);
        assert!(preprocessor.hwc_to_chw(&[0.0; 5]).is_err());
    }

    #[test]
    fn test_complete_preprocessing_pipeline() {
        let preprocessor = Preprocessor::new(4, 4);
        let (tensor, info) = preprocessor.process(&create_test_image(8, 4)).unwrap();

        assert_eq!(tensor.len(), 4 * 4 * 3);
        assert_eq!(info.scale, 0.5);
        assert!(tensor.iter().all(|&x| (0.0..=1.0).contains(&x)));
    }
}
