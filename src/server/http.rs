//! HTTP handlers

use super::websocket::FramePayload;
use super::{AppState, FrameError};
use crate::predictor::BanknoteDetection;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, warn};

/// Multipart field carrying the image
const FILE_FIELD: &str = "file";

/// Error body: `{ "error": "<message>" }`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub success: bool,
    pub detections: Vec<BanknoteDetection>,
    pub total_detected: usize,
    pub total_value: u64,
    pub inference_time: f64,
    pub annotated_image: String,
}

pub async fn root_handler() -> impl IntoResponse {
    Json(json!({
        "message": "API de detección de billetes colombianos",
        "status": "online",
        "endpoints": {
            "predict_image": "/predict",
            "health": "/health",
            "websocket": "/ws/predict"
        }
    }))
}

pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "model_loaded": state.predictor.model_loaded(),
        "gpu_available": state.predictor.gpu_available(),
        "frames_processed": state.metrics.frames_processed()
    }))
}

/// `POST /predict` with the image in the multipart field `file`
pub async fn predict_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<PredictResponse>, ApiError> {
    let mut upload = None;

    loop {
        let field = multipart.next_field().await.map_err(|e| {
            warn!("Malformed multipart request: {}", e);
            ApiError::new(e.status(), format!("Solicitud multipart inválida: {}", e))
        })?;

        let Some(field) = field else { break };
        if field.name() == Some(FILE_FIELD) {
            let bytes = field.bytes().await.map_err(|e| {
                warn!("Failed to read uploaded file: {}", e);
                ApiError::new(e.status(), format!("No se pudo leer el archivo: {}", e))
            })?;
            upload = Some(bytes);
            break;
        }
    }

    let bytes = upload
        .ok_or_else(|| ApiError::bad_request(format!("Falta el campo '{}'", FILE_FIELD)))?;

    let size = bytes.len();
    let encoded = state
        .predict_encoded(FramePayload::Binary(bytes.to_vec()))
        .await
        .map_err(|e| match e {
            FrameError::Decode(e) => {
                warn!("Rejected upload of {} bytes: {}", size, e);
                ApiError::bad_request("No se pudo leer la imagen")
            }
            FrameError::Predict(e) => {
                error!("Prediction failed: {}", e);
                ApiError::internal(format!("Error en predicción: {}", e))
            }
        })?;
    let prediction = encoded.prediction;

    info!(
        "Predicted {} banknotes, total ${} COP in {:.2}ms",
        prediction.total_detected, prediction.total_value, prediction.inference_time
    );

    Ok(Json(PredictResponse {
        success: true,
        total_detected: prediction.total_detected,
        total_value: prediction.total_value,
        inference_time: prediction.inference_time,
        detections: prediction.detections,
        annotated_image: encoded.annotated_image,
    }))
}
