//! YOLO head decoding on realistically shaped outputs

use billetes::inference::{InferenceError, ModelPostProcessor, YoloPostProcessor};

const ANCHORS: usize = 8400;
const CLASSES: usize = 7;

/// Channel-major `[1, 11, 8400]` output with the given anchors filled in
fn head_output(boxes: &[(usize, [f32; 4], usize, f32)]) -> Vec<f32> {
    let mut output = vec![0.0f32; (4 + CLASSES) * ANCHORS];
    for &(anchor, [cx, cy, w, h], class, score) in boxes {
        output[anchor] = cx;
        output[ANCHORS + anchor] = cy;
        output[2 * ANCHORS + anchor] = w;
        output[3 * ANCHORS + anchor] = h;
        output[(4 + class) * ANCHORS + anchor] = score;
    }
    output
}

#[test]
fn test_decodes_pixel_space_boxes() {
    let processor = YoloPostProcessor::banknote_default();
    let output = head_output(&[(17, [320.0, 320.0, 100.0, 60.0], 3, 0.95)]);

    let detections = processor
        .process_raw_output(&output, &[1, 4 + CLASSES, ANCHORS])
        .unwrap();

    assert_eq!(detections.len(), 1);
    let det = &detections[0];
    assert_eq!(det.class_id, 3);
    assert_eq!(det.center(), (320.0, 320.0));
    assert_eq!(det.width(), 100.0);
    assert_eq!(det.height(), 60.0);
}

#[test]
fn test_full_pipeline_filters_and_suppresses() {
    let processor = YoloPostProcessor::banknote_default();
    let output = head_output(&[
        // Two overlapping boxes on the same 10000 note
        (0, [200.0, 200.0, 120.0, 80.0], 3, 0.90),
        (1, [204.0, 202.0, 120.0, 80.0], 3, 0.70),
        // Same place, different class: kept
        (2, [200.0, 200.0, 120.0, 80.0], 5, 0.65),
        // Below threshold
        (3, [500.0, 500.0, 50.0, 50.0], 0, 0.10),
    ]);

    let detections = processor
        .process_raw_output(&output, &[1, 4 + CLASSES, ANCHORS])
        .unwrap();
    let detections = processor.filter_by_confidence(detections, 0.25);
    let detections = processor.apply_nms(detections, processor.iou_threshold());

    assert_eq!(detections.len(), 2);
    assert_eq!(detections[0].score, 0.90);
    assert_eq!(detections[1].class_id, 5);
}

#[test]
fn test_transposed_export() {
    let processor = YoloPostProcessor::banknote_default();
    let mut output = vec![0.0f32; 3 * (4 + CLASSES)];
    output[11..15].copy_from_slice(&[100.0, 50.0, 40.0, 20.0]);
    output[11 + 4 + 6] = 0.8;

    let detections = processor
        .process_raw_output(&output, &[1, 3, 4 + CLASSES])
        .unwrap();

    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].class_id, 6);
    assert_eq!(detections[0].x1, 80.0);
}

#[test]
fn test_rejects_truncated_tensor() {
    let processor = YoloPostProcessor::banknote_default();
    let result = processor.process_raw_output(&[0.0; 100], &[1, 4 + CLASSES, ANCHORS]);
    assert!(matches!(result, Err(InferenceError::InvalidOutputFormat(_))));
}
