use super::*;
use crate::camera::CameraSession;
use crate::config::SentryConfig;
use crate::event::BoundingBox;
use crate::testing::{gray_frame, person, ScriptedSource};
use image::{GrayImage, Luma};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

fn scene_with_square(x0: u32, y0: u32, side: u32) -> GrayImage {
    let mut image = GrayImage::from_pixel(64, 48, Luma([20]));
    for y in y0..y0 + side {
        for x in x0..x0 + side {
            image.put_pixel(x, y, Luma([230]));
        }
    }
    image
}

fn session() -> CameraSession {
    CameraSession::new(
        Box::new(ScriptedSource::new(Vec::new())),
        Duration::from_millis(100),
    )
}

#[test]
fn test_motion_confidence_curve() {
    assert_eq!(motion_confidence(10.0, 10.0), 0.5);
    assert!(motion_confidence(1000.0, 10.0) > 0.98);
    assert_eq!(motion_confidence(0.0, 10.0), 0.0);
    assert_eq!(motion_confidence(5.0, 0.0), 1.0);
}

#[test]
fn test_policy_drops_low_confidence_and_ignored_labels() {
    let policy = DetectionPolicy::new(0.5, ["Cat"]);
    let detections = vec![
        person(),
        Detection::new("cat", 0.99, BoundingBox::full_frame()),
        Detection::new("deer", 0.3, BoundingBox::full_frame()),
        Detection::new("deer", 0.5, BoundingBox::full_frame()),
    ];
    let kept = policy.apply(detections);
    let labels: Vec<&str> = kept.iter().map(|d| d.label.as_str()).collect();
    assert_eq!(labels, vec!["person", "deer"]);
}

#[test]
fn test_histogram_first_frame_primes_only() {
    let mut model = HistogramModel::new(5.0, false);
    assert!(model.observe(&scene_with_square(0, 0, 1)).is_empty());
    // Identical frame: no difference
    assert!(model.observe(&scene_with_square(0, 0, 1)).is_empty());
}

#[test]
fn test_histogram_detects_brightness_shift() {
    // 400 pixels move from bin 20 to bin 230: (400 + 400) / 256 = 3.125
    let mut model = HistogramModel::new(1.0, false);
    model.observe(&GrayImage::from_pixel(64, 48, Luma([20])));
    let detections = model.observe(&scene_with_square(10, 10, 20));

    assert_eq!(detections.len(), 1);
    assert_eq!(detections[0].label, MOTION_LABEL);
    assert_eq!(detections[0].bbox, BoundingBox::full_frame());
    assert!(detections[0].confidence > 0.5);
}

#[test]
fn test_pixel_difference_box_covers_changed_area() {
    let mut model = PixelDifferenceModel::new(10.0, 25, false);
    model.observe(&GrayImage::from_pixel(64, 48, Luma([20])));
    let detections = model.observe(&scene_with_square(16, 12, 16));

    assert_eq!(detections.len(), 1);
    let bbox = detections[0].bbox;
    assert_eq!(bbox, BoundingBox::from_pixels(16, 12, 31, 27, 64, 48));
}

#[test]
fn test_pixel_difference_reprimes_on_resolution_change() {
    let mut model = PixelDifferenceModel::new(1.0, 25, false);
    model.observe(&GrayImage::from_pixel(64, 48, Luma([20])));
    assert!(model
        .observe(&GrayImage::from_pixel(32, 24, Luma([200])))
        .is_empty());
}

#[test]
fn test_adaptive_threshold_finds_moved_block() {
    // Only a 2-pixel ring inside the block exceeds its local mean: 112 of 3072 pixels
    let mut model = AdaptiveThresholdModel::new(1.0, false);
    assert!(model.observe(&GrayImage::from_pixel(64, 48, Luma([20]))).is_empty());

    let detections = model.observe(&scene_with_square(16, 12, 16));
    assert_eq!(detections.len(), 1);
    let bbox = detections[0].bbox;
    assert!(bbox.xmin >= 15.0 / 64.0 && bbox.xmax <= 33.0 / 64.0);
    assert!(bbox.ymin >= 11.0 / 48.0 && bbox.ymax <= 29.0 / 48.0);
}

#[test]
fn test_adaptive_threshold_ignores_static_scene() {
    let mut model = AdaptiveThresholdModel::new(1.0, true);
    model.observe(&scene_with_square(16, 12, 16));
    assert!(model.observe(&scene_with_square(16, 12, 16)).is_empty());
}

#[test]
fn test_contour_orders_regions_by_area() {
    let mut model = ContourModel::new(25, 20.0);
    let background = GrayImage::from_pixel(64, 48, Luma([20]));
    assert!(model.observe(&background).is_empty());

    let mut scene = background.clone();
    for y in 4..14 {
        for x in 4..14 {
            scene.put_pixel(x, y, Luma([240]));
        }
    }
    for y in 24..44 {
        for x in 36..60 {
            scene.put_pixel(x, y, Luma([240]));
        }
    }

    let detections = model.observe(&scene);
    assert_eq!(detections.len(), 2);
    // The large block sits in the lower-right quadrant
    assert!(detections[0].bbox.xmin > 0.4);
    assert!(detections[1].bbox.xmax < 0.4);
    assert!(detections[0].confidence >= detections[1].confidence);
    assert_eq!(model.frame_count(), 2);
}

#[test]
fn test_contour_ignores_small_regions() {
    let mut model = ContourModel::new(25, 500.0);
    model.observe(&GrayImage::from_pixel(64, 48, Luma([20])));
    assert!(model.observe(&scene_with_square(10, 10, 8)).is_empty());
}

#[tokio::test]
async fn test_factory_builds_configured_kind() {
    let mut config = SentryConfig::default().detector;
    for (kind, name) in [
        (DetectorKind::Histogram, "histogram"),
        (DetectorKind::PixelDifference, "pixel_difference"),
        (DetectorKind::AdaptiveThreshold, "adaptive_threshold"),
        (DetectorKind::Contour, "contour"),
    ] {
        config.kind = kind;
        let detector = build_detector(&config, session()).unwrap();
        assert_eq!(detector.name(), name);
    }
}

#[tokio::test]
async fn test_detector_owns_camera_lifecycle() {
    let mut detector = build_detector(&SentryConfig::default().detector, session()).unwrap();
    let handle = detector.configure_camera(0).await.unwrap();
    let frame = detector.acquire_frame(&handle).await.unwrap();

    // First frame primes the model
    assert!(detector.detect(&frame.main).unwrap().is_empty());

    detector.release(handle.clone()).await;
    assert!(detector.acquire_frame(&handle).await.is_err());
}

#[tokio::test]
async fn test_confidence_threshold_applied_by_detector() {
    let mut config = SentryConfig::default().detector;
    config.kind = DetectorKind::Histogram;
    config.blur = false;
    config.histogram_min_diff = 1.0;
    config.confidence_threshold = 1.0;

    let mut detector = build_detector(&config, session()).unwrap();
    detector.detect(&gray_frame(64, 48, 20)).unwrap();
    let changed = FrameData::from_gray(1, std::time::SystemTime::now(), scene_with_square(0, 0, 30));
    // Score is finite so confidence stays below 1.0
    assert!(detector.detect(&changed).unwrap().is_empty());
}

const COCO_LABELS: &str = "0 person\n17 cat\n\n18  dog\n";

fn ssd_outputs(count: Option<usize>) -> SsdOutputs {
    SsdOutputs {
        // (top, left, bottom, right)
        boxes: vec![
            0.0, 0.0, 1.0, 1.0, //
            0.1, 0.2, 0.5, 0.6, //
            0.3, 0.3, 0.4, 0.4,
        ],
        classes: vec![17.0, 0.0, 88.0],
        scores: vec![0.9, 0.6, 0.2],
        count,
    }
}

/// Engine that replays fixed outputs and records the image sizes it saw
struct FixedEngine {
    input_size: (u32, u32),
    outputs: SsdOutputs,
    seen: Arc<Mutex<Vec<(u32, u32)>>>,
}

impl InferenceEngine for FixedEngine {
    fn input_size(&self) -> (u32, u32) {
        self.input_size
    }

    fn infer(&mut self, image: &image::RgbImage) -> Result<SsdOutputs, DetectionFault> {
        self.seen.lock().push(image.dimensions());
        Ok(self.outputs.clone())
    }
}

#[test]
fn test_label_map_parsing() {
    let labels = LabelMap::parse(COCO_LABELS);
    assert_eq!(labels.len(), 3);
    assert_eq!(labels.label(0), "person");
    assert_eq!(labels.label(18), "dog");
    assert_eq!(labels.label(5), "class_5");

    // Files without ids are indexed by line
    let bare = LabelMap::parse("person\nbicycle\n");
    assert_eq!(bare.label(1), "bicycle");
}

#[test]
fn test_label_map_missing_file() {
    let dir = tempfile::TempDir::new().unwrap();
    assert!(matches!(
        LabelMap::load(dir.path().join("labels.txt")),
        Err(ConfigurationError::Model { .. })
    ));
}

#[test]
fn test_ssd_outputs_map_to_normalized_boxes_in_network_order() {
    let labels = LabelMap::parse(COCO_LABELS);
    let detections = decode_ssd_outputs(&ssd_outputs(Some(2)), &labels);

    assert_eq!(
        detections,
        vec![
            Detection::new("cat", 0.9, BoundingBox::full_frame()),
            Detection::new("person", 0.6, BoundingBox::new(0.2, 0.1, 0.6, 0.5)),
        ]
    );
}

#[test]
fn test_ssd_outputs_without_count_use_every_row() {
    let labels = LabelMap::parse(COCO_LABELS);
    let detections = decode_ssd_outputs(&ssd_outputs(None), &labels);
    assert_eq!(detections.len(), 3);
    assert_eq!(detections[2].label, "class_88");

    // A count beyond the tensors is capped
    assert_eq!(decode_ssd_outputs(&ssd_outputs(Some(50)), &labels).len(), 3);
}

#[test]
fn test_object_detector_resizes_and_applies_policy() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let engine = FixedEngine {
        input_size: (30, 20),
        outputs: ssd_outputs(None),
        seen: seen.clone(),
    };
    let mut detector = ObjectDetector::new(
        Box::new(engine),
        LabelMap::parse(COCO_LABELS),
        session(),
        DetectionPolicy::new(0.5, ["cat"]),
    );

    let detections = detector.detect(&gray_frame(64, 48, 90)).unwrap();
    assert_eq!(detector.name(), "object");
    assert_eq!(*seen.lock(), vec![(30, 20)]);
    let labels: Vec<&str> = detections.iter().map(|d| d.label.as_str()).collect();
    assert_eq!(labels, vec!["person"]);
}

#[test]
fn test_object_kind_needs_loadable_model() {
    let mut config = SentryConfig::default().detector;
    config.kind = DetectorKind::Object;
    assert!(matches!(
        build_detector(&config, session()),
        Err(ConfigurationError::Model { .. })
    ));

    let dir = tempfile::TempDir::new().unwrap();
    config.object_model_path = Some(dir.path().join("missing.onnx").display().to_string());
    assert!(matches!(
        build_detector(&config, session()),
        Err(ConfigurationError::Model { .. })
    ));
}
