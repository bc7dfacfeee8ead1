//! HTTP and WebSocket handler tests against a mock detector

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use billetes::predictor::BanknotePredictor;
use billetes::server::websocket::{handle_frame, FramePayload, INVALID_FRAME};
use billetes::server::{create_router, AppState, FrameError};
use common::{encode, mock_predictor, sample_detections, test_image, MockBackend};
use image::ImageFormat;
use serde_json::Value;
use tower::ServiceExt;

const BOUNDARY: &str = "billetes-test-boundary";
const UPLOAD_LIMIT: usize = 10 * 1024 * 1024;

fn state() -> AppState {
    AppState::new(mock_predictor(sample_detections()), 90)
}

fn app(state: AppState) -> Router {
    create_router(state, UPLOAD_LIMIT)
}

fn multipart_body(field: &str, payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"billete.png\"\r\n",
            field
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(payload);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn upload_request(field: &str, payload: &[u8]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/predict")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(field, payload)))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_root_lists_endpoints() {
    let response = app(state())
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "online");
    assert_eq!(body["endpoints"]["predict_image"], "/predict");
    assert_eq!(body["endpoints"]["health"], "/health");
    assert_eq!(body["endpoints"]["websocket"], "/ws/predict");
}

#[tokio::test]
async fn test_health_reports_model_state() {
    let response = app(state())
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["model_loaded"], true);
    assert_eq!(body["gpu_available"], false);
    assert_eq!(body["frames_processed"], 0);
}

#[tokio::test]
async fn test_predict_upload() {
    let state = state();
    let image = encode(&test_image(640, 640), ImageFormat::Png);

    let response = app(state.clone())
        .oneshot(upload_request("file", &image))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;

    assert_eq!(body["success"], true);
    assert_eq!(body["total_detected"], 3);
    assert_eq!(body["total_value"], 70_000);
    assert!(body["inference_time"].as_f64().unwrap() >= 0.0);
    assert_eq!(body["detections"][0]["class"], "50000");
    assert_eq!(
        body["detections"][0]["message"],
        "Billete colombiano de $50000 COP"
    );
    assert_eq!(body["detections"][2]["is_colombian"], false);

    let annotated = body["annotated_image"].as_str().unwrap();
    assert!(annotated.starts_with("data:image/jpeg;base64,"));

    assert_eq!(state.metrics.frames_processed(), 1);
}

#[tokio::test]
async fn test_predict_rejects_unreadable_image() {
    let response = app(state())
        .oneshot(upload_request("file", b"this is not an image"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "No se pudo leer la imagen");
}

#[tokio::test]
async fn test_predict_requires_file_field() {
    let image = encode(&test_image(32, 32), ImageFormat::Png);
    let response = app(state())
        .oneshot(upload_request("imagen", &image))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().contains("file"));
}

#[tokio::test]
async fn test_predict_reports_detector_failure() {
    let state = AppState::new(
        BanknotePredictor::new(Box::new(MockBackend::failing()), Vec::new()),
        90,
    );
    let image = encode(&test_image(32, 32), ImageFormat::Png);

    let response = app(state).oneshot(upload_request("file", &image)).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Error en predicción: "));
}

#[tokio::test]
async fn test_upload_limit() {
    let state = state();
    // Noise so PNG cannot compress it under the limit
    let noisy = image::RgbImage::from_fn(256, 256, |x, y| {
        let v = (x.wrapping_mul(2_654_435_761) ^ y.wrapping_mul(40_503)).wrapping_mul(2_246_822_519);
        image::Rgb([(v >> 24) as u8, (v >> 16) as u8, (v >> 8) as u8])
    });
    let image = encode(&noisy, ImageFormat::Png);
    assert!(image.len() > 1024);

    let response = create_router(state.clone(), 1024)
        .oneshot(upload_request("file", &image))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body = json_body(response).await;
    assert!(body["error"].is_string());
    assert_eq!(state.metrics.frames_processed(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_predict_encoded_runs_whole_frame() {
    let state = state();
    let png = encode(&test_image(320, 240), ImageFormat::Png);

    let encoded = state
        .predict_encoded(FramePayload::Binary(png))
        .await
        .unwrap();
    assert_eq!(encoded.prediction.total_detected, 3);
    assert_eq!(encoded.prediction.annotated_image.dimensions(), (320, 240));
    assert!(encoded.annotated_image.starts_with("data:image/jpeg;base64,"));

    let error = state
        .predict_encoded(FramePayload::Text("@@@".to_string()))
        .await
        .unwrap_err();
    assert!(matches!(error, FrameError::Decode(_)));

    assert_eq!(state.metrics.frames_processed(), 1);
    assert_eq!(state.metrics.frames_failed(), 1);
}

#[tokio::test]
async fn test_predict_encoded_reports_detector_failure() {
    let state = AppState::new(
        BanknotePredictor::new(Box::new(MockBackend::failing()), Vec::new()),
        90,
    );
    let png = encode(&test_image(32, 32), ImageFormat::Png);

    let error = state
        .predict_encoded(FramePayload::Binary(png))
        .await
        .unwrap_err();
    assert!(matches!(error, FrameError::Predict(_)));
    assert_eq!(state.metrics.frames_failed(), 1);
}

#[tokio::test]
async fn test_cors_allows_any_origin() {
    let response = app(state())
        .oneshot(
            Request::builder()
                .uri("/health")
                .header(header::ORIGIN, "http://localhost:3000")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "*"
    );
}

#[tokio::test]
async fn test_websocket_frame_as_data_url() {
    let state = state();
    let jpeg = encode(&test_image(320, 240), ImageFormat::Jpeg);
    let payload = format!("data:image/jpeg;base64,{}", STANDARD.encode(&jpeg));

    let reply = handle_frame(&state, FramePayload::Text(payload)).await;

    assert_eq!(reply["success"], true);
    assert_eq!(reply["total_detected"], 3);
    assert!(reply["fps"].as_f64().unwrap() >= 0.0);
    assert!(reply["annotated_image"]
        .as_str()
        .unwrap()
        .starts_with("data:image/jpeg;base64,"));
}

#[tokio::test]
async fn test_websocket_plain_base64_and_binary() {
    let state = state();
    let png = encode(&test_image(64, 64), ImageFormat::Png);

    let reply = handle_frame(&state, FramePayload::Text(STANDARD.encode(&png))).await;
    assert_eq!(reply["success"], true);

    let reply = handle_frame(&state, FramePayload::Binary(png)).await;
    assert_eq!(reply["success"], true);

    assert_eq!(state.metrics.frames_processed(), 2);
}

#[tokio::test]
async fn test_websocket_invalid_frame_keeps_going() {
    let state = state();

    let reply = handle_frame(&state, FramePayload::Text("no es base64 !!".to_string())).await;
    assert_eq!(reply["error"], INVALID_FRAME);

    let reply = handle_frame(
        &state,
        FramePayload::Text(format!("data:image/png;base64,{}", STANDARD.encode(b"hola"))),
    )
    .await;
    assert_eq!(reply["error"], INVALID_FRAME);

    // The same state still serves valid frames afterwards
    let png = encode(&test_image(64, 64), ImageFormat::Png);
    let reply = handle_frame(&state, FramePayload::Binary(png)).await;
    assert_eq!(reply["success"], true);
    assert_eq!(state.metrics.frames_failed(), 2);
}
