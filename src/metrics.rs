//! Frame counters, latency and FPS tracking shared by the server and the camera loop

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Core performance metrics
#[derive(Debug)]
pub struct Metrics {
    /// Frames predicted successfully
    pub frames_processed: AtomicUsize,
    /// Frames that could not be decoded or predicted
    pub frames_failed: AtomicUsize,
    /// Latency of the last prediction in milliseconds
    pub inference_latency_ms: Mutex<f64>,
    /// Last measured frames per second
    pub fps: Mutex<f64>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            frames_processed: AtomicUsize::new(0),
            frames_failed: AtomicUsize::new(0),
            inference_latency_ms: Mutex::new(0.0),
            fps: Mutex::new(0.0),
        }
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful prediction and its latency
    pub fn record_frame(&self, latency_ms: f64) {
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut latency_guard) = self.inference_latency_ms.lock() {
            *latency_guard = latency_ms;
        }
    }

    pub fn record_failure(&self) {
        self.frames_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn update_fps(&self, fps: f64) {
        if let Ok(mut fps_guard) = self.fps.lock() {
            *fps_guard = fps;
        }
    }

    pub fn frames_processed(&self) -> usize {
        self.frames_processed.load(Ordering::Relaxed)
    }

    pub fn frames_failed(&self) -> usize {
        self.frames_failed.load(Ordering::Relaxed)
    }

    pub fn inference_latency_ms(&self) -> f64 {
        self.inference_latency_ms
            .lock()
            .map(|guard| *guard)
            .unwrap_or(0.0)
    }

    pub fn fps(&self) -> f64 {
        self.fps.lock().map(|guard| *guard).unwrap_or(0.0)
    }

    /// Get formatted metrics summary
    pub fn format_summary(&self) -> String {
        format!(
            "FPS: {:.1} | Latency: {:.1}ms | Frames: {} | Failed: {}",
            self.fps(),
            self.inference_latency_ms(),
            self.frames_processed(),
            self.frames_failed()
        )
    }
}

/// FPS over a rolling one-second window
#[derive(Debug)]
pub struct FpsCalculator {
    frame_times: VecDeque<Instant>,
    window: Duration,
}

impl FpsCalculator {
    pub fn new() -> Self {
        Self::with_window(Duration::from_secs(1))
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            frame_times: VecDeque::with_capacity(64),
            window,
        }
    }

    /// Register a frame shown at `now` and return the current FPS
    pub fn tick_at(&mut self, now: Instant) -> f64 {
        self.frame_times.push_back(now);
        while let Some(&oldest) = self.frame_times.front() {
            if now.duration_since(oldest) > self.window {
                self.frame_times.pop_front();
            } else {
                break;
            }
        }
        self.fps_at(now)
    }

    pub fn tick(&mut self) -> f64 {
        self.tick_at(Instant::now())
    }

    fn fps_at(&self, now: Instant) -> f64 {
        match self.frame_times.front() {
            Some(&oldest) if self.frame_times.len() >= 2 => {
                let elapsed = now.duration_since(oldest).as_secs_f64();
                if elapsed > 0.0 {
                    (self.frame_times.len() - 1) as f64 / elapsed
                } else {
                    0.0
                }
            }
            _ => 0.0,
        }
    }
}

impl Default for FpsCalculator {
    fn default() -> Self {
        Self::new()
    }
}

/// Frame timing helper
pub struct FrameTimer {
    start_time: Instant,
    metrics: Arc<Metrics>,
}

impl FrameTimer {
    pub fn start(metrics: Arc<Metrics>) -> Self {
        Self {
            start_time: Instant::now(),
            metrics,
        }
    }

    /// Mark frame as complete and record its latency
    pub fn complete(self) -> f64 {
        let elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        self.metrics.record_frame(elapsed_ms);
        elapsed_ms
    }

    /// Mark frame as failed
    pub fn fail(self) {
        self.metrics.record_failure();
    }
}
