//! REST and WebSocket surface over the banknote predictor

pub mod http;
pub mod websocket;

use self::websocket::FramePayload;
use crate::codec;
use crate::config::AppConfig;
use crate::error::BilleteError;
use crate::metrics::{FrameTimer, Metrics};
use crate::predictor::{BanknotePredictor, Prediction};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared server state
#[derive(Clone)]
pub struct AppState {
    pub predictor: Arc<BanknotePredictor>,
    pub metrics: Arc<Metrics>,
    /// JPEG quality of annotated images sent back to clients
    pub jpeg_quality: u8,
}

impl AppState {
    pub fn new(predictor: BanknotePredictor, jpeg_quality: u8) -> Self {
        Self {
            predictor: Arc::new(predictor),
            metrics: Arc::new(Metrics::new()),
            jpeg_quality,
        }
    }

    /// Decode, predict and JPEG-encode one payload on the blocking pool
    ///
    /// All three steps are CPU bound, so none of them runs on the async workers.
    pub async fn predict_encoded(
        &self,
        payload: FramePayload,
    ) -> Result<EncodedPrediction, FrameError> {
        let predictor = self.predictor.clone();
        let metrics = self.metrics.clone();
        let jpeg_quality = self.jpeg_quality;

        tokio::task::spawn_blocking(move || {
            let image = payload
                .into_bytes()
                .and_then(|bytes| codec::decode_image(&bytes))
                .map_err(|e| {
                    metrics.record_failure();
                    FrameError::Decode(e)
                })?;

            let timer = FrameTimer::start(metrics.clone());
            let result = predictor.predict(&image).and_then(|prediction| {
                let annotated_image =
                    codec::encode_jpeg_data_url(&prediction.annotated_image, jpeg_quality)?;
                Ok(EncodedPrediction {
                    prediction,
                    annotated_image,
                })
            });

            match result {
                Ok(encoded) => {
                    timer.complete();
                    metrics.update_fps(encoded.prediction.fps);
                    Ok(encoded)
                }
                Err(e) => {
                    timer.fail();
                    Err(FrameError::Predict(e))
                }
            }
        })
        .await
        .map_err(|e| {
            FrameError::Predict(BilleteError::Unexpected(format!(
                "prediction task failed: {}",
                e
            )))
        })?
    }
}

/// Prediction plus the annotated frame as a JPEG data URL
#[derive(Debug)]
pub struct EncodedPrediction {
    pub prediction: Prediction,
    pub annotated_image: String,
}

/// Why a payload produced no prediction
#[derive(Debug)]
pub enum FrameError {
    /// The payload is not a decodable image
    Decode(BilleteError),
    /// The detector or the JPEG encoder failed
    Predict(BilleteError),
}

/// Build the router: `/`, `/health`, `/predict` and `/ws/predict`
pub fn create_router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(http::root_handler))
        .route("/health", get(http::health_handler))
        .route("/predict", post(http::predict_handler))
        .route("/ws/predict", get(websocket::ws_predict_handler))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Load the model once and serve until Ctrl+C
pub async fn serve(config: &AppConfig) -> anyhow::Result<()> {
    let model_config = config.clone();
    let predictor = tokio::task::spawn_blocking(move || {
        BanknotePredictor::from_config(&model_config, model_config.inference.confidence_threshold)
    })
    .await??;

    info!(
        "Model loaded (gpu available: {})",
        predictor.gpu_available()
    );

    let state = AppState::new(predictor, config.server.jpeg_quality);
    let metrics = state.metrics.clone();
    let app = create_router(state, config.server.max_upload_bytes);

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .map_err(|e| BilleteError::ServerError(format!("failed to bind {}: {}", address, e)))?;

    info!("Listening on http://{}", address);
    info!("WebSocket endpoint: ws://{}/ws/predict", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| BilleteError::ServerError(e.to_string()))?;

    info!("Server stopped. {}", metrics.format_summary());
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
