//! Camera loop: capture, predict, annotate, display

use super::{camera_source, capture_description, display_description};
use crate::config::LiveConfig;
use crate::error::{BilleteError, BilleteResult};
use crate::metrics::{FpsCalculator, FrameTimer, Metrics};
use crate::overlay;
use crate::predictor::{BanknotePredictor, PanelStyle};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use image::RgbImage;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const PULL_TIMEOUT_MS: u64 = 100;

pub struct LiveProcessor {
    predictor: BanknotePredictor,
    camera: u32,
    width: u32,
    height: u32,
    window_title: String,
    metrics: Arc<Metrics>,
}

impl LiveProcessor {
    pub fn new(predictor: BanknotePredictor, config: &LiveConfig, camera: u32) -> Self {
        Self {
            predictor,
            camera,
            width: config.frame_width,
            height: config.frame_height,
            window_title: config.window_title.clone(),
            metrics: Arc::new(Metrics::new()),
        }
    }

    fn build_capture(&self) -> BilleteResult<(gst::Pipeline, gst_app::AppSink)> {
        let description = capture_description(&camera_source(self.camera), self.width, self.height);
        debug!("Capture pipeline: {}", description);

        let pipeline = gst::parse::launch(&description)
            .map_err(|e| BilleteError::PipelineError(e.to_string()))?
            .downcast::<gst::Pipeline>()
            .map_err(|_| BilleteError::PipelineError("capture is not a pipeline".to_string()))?;

        let appsink = pipeline
            .by_name("sink")
            .and_then(|element| element.dynamic_cast::<gst_app::AppSink>().ok())
            .ok_or_else(|| BilleteError::PipelineError("appsink not found".to_string()))?;

        Ok((pipeline, appsink))
    }

    fn build_display(&self) -> BilleteResult<(gst::Pipeline, gst_app::AppSrc)> {
        let pipeline = gst::parse::launch(display_description())
            .map_err(|e| BilleteError::PipelineError(e.to_string()))?
            .downcast::<gst::Pipeline>()
            .map_err(|_| BilleteError::PipelineError("display is not a pipeline".to_string()))?;

        let appsrc = pipeline
            .by_name("src")
            .and_then(|element| element.dynamic_cast::<gst_app::AppSrc>().ok())
            .ok_or_else(|| BilleteError::PipelineError("appsrc not found".to_string()))?;

        let caps = gst::Caps::builder("video/x-raw")
            .field("format", "RGB")
            .field("width", self.width as i32)
            .field("height", self.height as i32)
            .field("framerate", gst::Fraction::new(0, 1))
            .build();
        appsrc.set_caps(Some(&caps));
        appsrc.set_format(gst::Format::Time);
        appsrc.set_is_live(true);
        appsrc.set_property("do-timestamp", true);

        Ok((pipeline, appsrc))
    }

    /// Window sinks that honour the title tag use it as the window caption
    fn send_window_title(&self, appsrc: &gst_app::AppSrc) {
        let mut tags = gst::TagList::new();
        if let Some(tags) = tags.get_mut() {
            tags.add::<gst::tags::Title>(&self.window_title.as_str(), gst::TagMergeMode::Replace);
        }
        if !appsrc.send_event(gst::event::Tag::new(tags)) {
            debug!("Video sink ignored the window title");
        }
    }

    /// Copy a sample into a tightly packed RGB image, dropping row padding
    fn sample_to_image(sample: &gst::Sample) -> BilleteResult<RgbImage> {
        let buffer = sample
            .buffer()
            .ok_or_else(|| BilleteError::FrameReadFailed("sample without buffer".to_string()))?;
        let caps = sample
            .caps()
            .ok_or_else(|| BilleteError::FrameReadFailed("sample without caps".to_string()))?;
        let info = gst_video::VideoInfo::from_caps(caps)
            .map_err(|e| BilleteError::FrameReadFailed(e.to_string()))?;

        let map = buffer
            .map_readable()
            .map_err(|e| BilleteError::FrameReadFailed(format!("Failed to map buffer: {}", e)))?;
        let data = map.as_slice();

        let width = info.width() as usize;
        let height = info.height() as usize;
        let stride = info.stride()[0] as usize;
        let row_bytes = width * 3;

        if width == 0 || height == 0 {
            return Err(BilleteError::FrameReadFailed("empty frame".to_string()));
        }
        if stride < row_bytes || data.len() < stride * (height - 1) + row_bytes {
            return Err(BilleteError::FrameReadFailed(format!(
                "Buffer too small: got {}, expected {}x{} RGB",
                data.len(),
                width,
                height
            )));
        }

        let mut pixels = Vec::with_capacity(row_bytes * height);
        for row in data.chunks(stride).take(height) {
            pixels.extend_from_slice(&row[..row_bytes]);
        }

        RgbImage::from_raw(info.width(), info.height(), pixels)
            .ok_or_else(|| BilleteError::FrameReadFailed("frame size mismatch".to_string()))
    }

    /// First EOS or error on the bus, if any
    fn poll_bus(pipeline: &gst::Pipeline, name: &str) -> Option<String> {
        let bus = pipeline.bus()?;
        let message = bus.pop_filtered(&[gst::MessageType::Eos, gst::MessageType::Error])?;

        match message.view() {
            gst::MessageView::Eos(..) => Some(format!("{}: end of stream", name)),
            gst::MessageView::Error(err) => {
                if let Some(debug) = err.debug() {
                    debug!("{} debug info: {}", name, debug);
                }
                Some(format!("{}: {}", name, err.error()))
            }
            _ => None,
        }
    }

    /// Run until the camera stops, the window closes or Ctrl+C is pressed
    pub fn run(&self) -> BilleteResult<()> {
        gst::init().map_err(|e| BilleteError::PipelineError(e.to_string()))?;

        let (capture, appsink) = self.build_capture()?;
        let (display, appsrc) = self.build_display()?;

        if let Err(e) = capture.set_state(gst::State::Playing) {
            error!("Could not open camera {}: {}", self.camera, e);
            let _ = capture.set_state(gst::State::Null);
            return Err(BilleteError::CameraNotFound { index: self.camera });
        }
        display
            .set_state(gst::State::Playing)
            .map_err(|e| BilleteError::PipelineError(e.to_string()))?;
        self.send_window_title(&appsrc);

        let interrupt = capture.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            info!("Ctrl+C received, stopping camera");
            if !interrupt.send_event(gst::event::Eos::new()) {
                warn!("Capture pipeline did not accept EOS");
            }
        }) {
            warn!("Could not install Ctrl+C handler: {}", e);
        }

        info!(
            "Camera {} open at {}x{}. Close the window or press Ctrl+C to stop",
            self.camera, self.width, self.height
        );

        let mut fps_calculator = FpsCalculator::new();
        let mut frame_index: u64 = 0;
        let result = loop {
            if let Some(reason) = Self::poll_bus(&display, "display") {
                info!("Window closed ({})", reason);
                break Ok(());
            }
            if let Some(reason) = Self::poll_bus(&capture, "camera") {
                if frame_index == 0 && !reason.ends_with("end of stream") {
                    error!("Could not open camera {}: {}", self.camera, reason);
                    break Err(BilleteError::CameraNotFound { index: self.camera });
                }
                info!("Camera stopped ({})", reason);
                break Ok(());
            }

            let sample =
                match appsink.try_pull_sample(gst::ClockTime::from_mseconds(PULL_TIMEOUT_MS)) {
                    Some(sample) => sample,
                    None if appsink.is_eos() => {
                        info!("No more frames from camera {}", self.camera);
                        break Ok(());
                    }
                    None => continue,
                };

            let frame = match Self::sample_to_image(&sample) {
                Ok(frame) => frame,
                Err(e) => {
                    error!("Frame read failed: {}", e);
                    self.metrics.record_failure();
                    break Ok(());
                }
            };
            frame_index += 1;

            let timer = FrameTimer::start(self.metrics.clone());
            let mut annotated = match self.predictor.predict_with_style(&frame, PanelStyle::Live) {
                Ok(prediction) => {
                    timer.complete();
                    if prediction.total_detected > 0 {
                        debug!(
                            "Frame {}: {} banknotes, total {}",
                            frame_index, prediction.total_detected, prediction.total_value
                        );
                    }
                    prediction.annotated_image
                }
                Err(e) => {
                    timer.fail();
                    warn!("Prediction failed on frame {}: {}", frame_index, e);
                    frame
                }
            };

            let fps = fps_calculator.tick();
            self.metrics.update_fps(fps);
            overlay::draw_fps(&mut annotated, fps);

            let buffer = gst::Buffer::from_mut_slice(annotated.into_raw());
            if let Err(e) = appsrc.push_buffer(buffer) {
                info!("Display stopped accepting frames: {:?}", e);
                break Ok(());
            }
        };

        let _ = appsrc.end_of_stream();
        let _ = capture.set_state(gst::State::Null);
        let _ = display.set_state(gst::State::Null);

        info!("Camera loop finished. {}", self.metrics.format_summary());
        result
    }
}
