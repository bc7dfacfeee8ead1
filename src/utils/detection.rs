//! Detection data structures and utilities

use crate::preprocessing::LetterboxInfo;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A detected object with bounding box and class id
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Left X coordinate
    pub x1: f32,
    /// Top Y coordinate
    pub y1: f32,
    /// Right X coordinate
    pub x2: f32,
    /// Bottom Y coordinate
    pub y2: f32,
    /// Confidence score (0.0 to 1.0)
    pub score: f32,
    /// Index into the model's class table
    pub class_id: usize,
}

impl Detection {
    /// Create a new detection
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, score: f32, class_id: usize) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            score,
            class_id,
        }
    }

    /// Build from YOLO centre/size format
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32, score: f32, class_id: usize) -> Self {
        Self::new(
            cx - w * 0.5,
            cy - h * 0.5,
            cx + w * 0.5,
            cy + h * 0.5,
            score,
            class_id,
        )
    }

    /// Calculate the area of the bounding box
    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// Get the center point of the bounding box
    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// Calculate Intersection over Union (IoU) with another detection
    pub fn iou(&self, other: &Detection) -> f32 {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);

        if x2 <= x1 || y2 <= y1 {
            return 0.0;
        }

        let intersection = (x2 - x1) * (y2 - y1);
        let union = self.area() + other.area() - intersection;

        if union <= 0.0 {
            return 0.0;
        }
        intersection / union
    }

    /// Check if this detection overlaps with another
    pub fn overlaps_with(&self, other: &Detection, threshold: f32) -> bool {
        self.iou(other) > threshold
    }

    /// Map a box from letterboxed model input back onto the original frame
    pub fn scale_to_original(&self, info: &LetterboxInfo) -> Detection {
        let max_x = info.original_width as f32;
        let max_y = info.original_height as f32;
        let unmap_x = |x: f32| ((x - info.pad_x) / info.scale).clamp(0.0, max_x);
        let unmap_y = |y: f32| ((y - info.pad_y) / info.scale).clamp(0.0, max_y);

        Detection {
            x1: unmap_x(self.x1),
            y1: unmap_y(self.y1),
            x2: unmap_x(self.x2),
            y2: unmap_y(self.y2),
            score: self.score,
            class_id: self.class_id,
        }
    }
}

impl fmt::Display for Detection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Detection(class={}, score={:.2}, bbox=({:.1}, {:.1}, {:.1}, {:.1}))",
            self.class_id,
            self.score,
            self.x1,
            self.y1,
            self.width(),
            self.height()
        )
    }
}

/// Class-aware Non-Maximum Suppression: boxes only suppress boxes of their own class
pub fn apply_nms(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    // Highest confidence first
    detections.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppress = vec![false; detections.len()];

    for i in 0..detections.len() {
        if suppress[i] {
            continue;
        }

        keep.push(detections[i].clone());

        for j in (i + 1)..detections.len() {
            if suppress[j] || detections[j].class_id != detections[i].class_id {
                continue;
            }

            if detections[i].overlaps_with(&detections[j], iou_threshold) {
                suppress[j] = true;
            }
        }
    }

    keep
}

/// Filter detections by confidence threshold
pub fn filter_by_confidence(detections: Vec<Detection>, threshold: f32) -> Vec<Detection> {
    detections
        .into_iter()
        .filter(|d| d.score >= threshold)
        .collect()
}
