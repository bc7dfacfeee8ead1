//! Image payload decoding and encoding for the HTTP and WebSocket surfaces

use crate::error::{BilleteError, BilleteResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;

pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Decode an encoded image (format sniffed from the bytes) into RGB
pub fn decode_image(bytes: &[u8]) -> BilleteResult<RgbImage> {
    if bytes.is_empty() {
        return Err(BilleteError::ImageDecodeError("empty payload".to_string()));
    }

    let image = image::load_from_memory(bytes)
        .map_err(|e| BilleteError::ImageDecodeError(e.to_string()))?;
    Ok(image.to_rgb8())
}

/// Decode a base64 payload, with or without a `data:<mime>;base64,` prefix
///
/// Everything after the first comma is decoded when a comma is present.
pub fn decode_data_url(text: &str) -> BilleteResult<Vec<u8>> {
    let payload = match text.split_once(',') {
        Some((_, data)) => data,
        None => text,
    };

    Ok(STANDARD.decode(payload.trim())?)
}

/// Encode as JPEG bytes at the given quality (clamped to 1..=100)
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> BilleteResult<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
    encoder.encode_image(image)?;
    Ok(buffer)
}

/// `data:image/jpeg;base64,<...>` for embedding in JSON responses
pub fn encode_jpeg_data_url(image: &RgbImage, quality: u8) -> BilleteResult<String> {
    let jpeg = encode_jpeg(image, quality)?;
    Ok(format!("data:image/jpeg;base64,{}", STANDARD.encode(jpeg)))
}
