//! Criterion-based performance benchmarks
//!
//! Per-frame costs around the detector: letterboxing, tensor layout,
//! head decoding with NMS, overlay drawing and JPEG encoding.

use billetes::codec;
use billetes::inference::{ModelPostProcessor, YoloPostProcessor};
use billetes::predictor::{annotate, BanknoteDetection, PanelStyle};
use billetes::Preprocessor;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use image::{Rgb, RgbImage};

/// Benchmark letterbox + normalisation + CHW conversion
fn bench_preprocessing(c: &mut Criterion) {
    let mut group = c.benchmark_group("preprocessing");
    let preprocessor = Preprocessor::default();

    let test_cases = vec![("VGA", 640, 480), ("HD", 1280, 720), ("FullHD", 1920, 1080)];

    for (name, width, height) in test_cases {
        let src = RgbImage::from_pixel(width, height, Rgb([128, 96, 64]));

        group.throughput(Throughput::Elements((width * height) as u64));
        group.bench_with_input(BenchmarkId::new("process", name), &src, |b, src| {
            b.iter(|| {
                let _result = preprocessor.process(black_box(src)).unwrap();
            });
        });
    }
    group.finish();
}

/// Benchmark decoding a full 8400-anchor head followed by NMS
fn bench_detection_postprocessing(c: &mut Criterion) {
    let mut group = c.benchmark_group("detection_postprocessing");
    let processor = YoloPostProcessor::banknote_default();
    let anchors = 8400;
    let attributes = 11;

    for candidates in [10usize, 100, 1000] {
        let mut output = vec![0.0f32; attributes * anchors];
        for i in 0..candidates {
            let anchor = i * (anchors / candidates);
            output[anchor] = 40.0 + (i % 20) as f32 * 30.0;
            output[anchors + anchor] = 40.0 + (i / 20 % 20) as f32 * 30.0;
            output[2 * anchors + anchor] = 60.0;
            output[3 * anchors + anchor] = 30.0;
            output[(4 + i % 7) * anchors + anchor] = 0.3 + (i % 7) as f32 * 0.1;
        }

        group.bench_with_input(
            BenchmarkId::new("decode_nms", candidates),
            &output,
            |b, output| {
                b.iter(|| {
                    let detections = processor
                        .process_raw_output(black_box(output), &[1, attributes, anchors])
                        .unwrap();
                    let detections = processor.filter_by_confidence(detections, 0.25);
                    processor.apply_nms(detections, processor.iou_threshold())
                });
            },
        );
    }
    group.finish();
}

/// Benchmark annotation and the JPEG data URL returned to clients
fn bench_annotation(c: &mut Criterion) {
    let mut group = c.benchmark_group("annotation");
    let frame = RgbImage::from_pixel(640, 480, Rgb([30, 30, 30]));

    let detections: Vec<BanknoteDetection> = ["1000", "20000", "50000", "100000"]
        .iter()
        .enumerate()
        .map(|(i, class)| BanknoteDetection {
            class: class.to_string(),
            confidence: 90.0,
            is_colombian: true,
            message: format!("Billete colombiano de ${} COP", class),
            bbox: [
                20.0 + i as f32 * 150.0,
                100.0,
                140.0 + i as f32 * 150.0,
                200.0,
            ],
        })
        .collect();

    group.bench_function("annotate", |b| {
        b.iter(|| {
            let mut image = frame.clone();
            annotate(&mut image, black_box(&detections), 171_000, PanelStyle::Api);
            image
        });
    });

    group.bench_function("jpeg_data_url", |b| {
        b.iter(|| codec::encode_jpeg_data_url(black_box(&frame), 90).unwrap());
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_preprocessing,
    bench_detection_postprocessing,
    bench_annotation
);
criterion_main!(benches);
