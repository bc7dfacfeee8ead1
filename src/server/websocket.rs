//! WebSocket handler: one prediction per incoming frame

use super::{AppState, FrameError};
use crate::codec;
use crate::error::BilleteResult;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

/// Reply for frames that are not a decodable image
pub const INVALID_FRAME: &str = "Frame inválido";

/// Incoming frame payload
#[derive(Debug, Clone)]
pub enum FramePayload {
    /// Base64 image, optionally as a data URL
    Text(String),
    /// Raw encoded image bytes
    Binary(Vec<u8>),
}

impl FramePayload {
    /// Encoded image bytes carried by the payload
    pub fn into_bytes(self) -> BilleteResult<Vec<u8>> {
        match self {
            FramePayload::Text(text) => codec::decode_data_url(&text),
            FramePayload::Binary(bytes) => Ok(bytes),
        }
    }
}

/// WebSocket upgrade handler
pub async fn ws_predict_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle WebSocket connection
async fn handle_socket(mut socket: WebSocket, state: AppState) {
    info!("WebSocket client connected");

    while let Some(message) = socket.recv().await {
        let payload = match message {
            Ok(Message::Text(text)) => FramePayload::Text(text),
            Ok(Message::Binary(bytes)) => FramePayload::Binary(bytes),
            Ok(Message::Close(_)) => {
                info!("WebSocket client closed the connection");
                return;
            }
            Ok(_) => continue,
            Err(e) => {
                error!("WebSocket error: {}", e);
                break;
            }
        };

        let reply = handle_frame(&state, payload).await;
        if let Err(e) = socket.send(Message::Text(reply.to_string())).await {
            warn!("WebSocket client disconnected: {}", e);
            return;
        }
    }

    debug!("WebSocket loop finished");
    if let Err(e) = socket.close().await {
        debug!("Closing WebSocket failed: {}", e);
    }
}

/// Predict one frame and build the JSON reply
pub async fn handle_frame(state: &AppState, payload: FramePayload) -> Value {
    let encoded = match state.predict_encoded(payload).await {
        Ok(encoded) => encoded,
        Err(FrameError::Decode(e)) => {
            debug!("Invalid frame: {}", e);
            return json!({ "error": INVALID_FRAME });
        }
        Err(FrameError::Predict(e)) => {
            error!("Prediction failed: {}", e);
            return json!({ "error": format!("Error en predicción: {}", e) });
        }
    };

    let prediction = encoded.prediction;
    json!({
        "success": true,
        "detections": prediction.detections,
        "total_detected": prediction.total_detected,
        "total_value": prediction.total_value,
        "fps": prediction.fps,
        "annotated_image": encoded.annotated_image
    })
}
