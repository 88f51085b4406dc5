//! Pluggable frame detectors.
//!
//! A detector owns the camera it reads from and turns frames into a list of
//! [`Detection`]s. The motion variants are models wrapped in
//! [`MotionDetector`], which handles grayscale conversion and the confidence
//! and label policy. [`ObjectDetector`] runs a neural network instead.

mod adaptive;
mod contour;
mod histogram;
mod object;
mod pixel;
mod policy;
#[cfg(test)]
mod tests;

pub use adaptive::AdaptiveThresholdModel;
pub use contour::ContourModel;
pub use histogram::HistogramModel;
pub use object::{decode_ssd_outputs, InferenceEngine, LabelMap, ObjectDetector, SsdOutputs};
#[cfg(feature = "object")]
pub use object::OnnxEngine;
pub use pixel::PixelDifferenceModel;
pub use policy::DetectionPolicy;

use async_trait::async_trait;
use image::GrayImage;
use tracing::{debug, info};

use crate::camera::{CameraHandle, CameraSession};
use crate::config::{DetectorConfig, DetectorKind};
use crate::error::{AcquisitionError, ConfigurationError, DetectionFault};
use crate::event::Detection;
use crate::frame::{Frame, FrameData};

pub const MOTION_LABEL: &str = "motion";

#[async_trait]
pub trait Detector: Send {
    fn name(&self) -> &str;

    /// Camera owned by this detector
    fn camera(&mut self) -> &mut CameraSession;

    async fn configure_camera(
        &mut self,
        camera_index: u32,
    ) -> Result<CameraHandle, ConfigurationError> {
        self.camera().configure(camera_index).await
    }

    async fn acquire_frame(&mut self, handle: &CameraHandle) -> Result<Frame, AcquisitionError> {
        self.camera().acquire(handle).await
    }

    /// Detections for `frame` that passed the confidence and label policy,
    /// in the detector's own order
    fn detect(&mut self, frame: &FrameData) -> Result<Vec<Detection>, DetectionFault>;

    async fn release(&mut self, handle: CameraHandle) {
        self.camera().release(handle).await
    }
}

/// Frame-to-frame comparison run on grayscale images
pub trait MotionModel: Send {
    fn name(&self) -> &'static str;

    /// Compare against the model's reference and update it. The first frame
    /// only primes the reference.
    fn observe(&mut self, frame: &GrayImage) -> Vec<Detection>;
}

/// Confidence for a score measured against its trigger level: 0.5 at the
/// trigger, approaching 1 as the score grows
pub(crate) fn motion_confidence(score: f64, trigger: f64) -> f32 {
    if trigger <= 0.0 {
        return 1.0;
    }
    (score / (score + trigger)).clamp(0.0, 1.0) as f32
}

pub struct MotionDetector<M: MotionModel> {
    model: M,
    camera: CameraSession,
    policy: DetectionPolicy,
}

impl<M: MotionModel> MotionDetector<M> {
    pub fn new(model: M, camera: CameraSession, policy: DetectionPolicy) -> Self {
        Self {
            model,
            camera,
            policy,
        }
    }
}

#[async_trait]
impl<M: MotionModel> Detector for MotionDetector<M> {
    fn name(&self) -> &str {
        self.model.name()
    }

    fn camera(&mut self) -> &mut CameraSession {
        &mut self.camera
    }

    fn detect(&mut self, frame: &FrameData) -> Result<Vec<Detection>, DetectionFault> {
        let gray = frame.to_gray_image()?;
        let raw = self.model.observe(&gray);
        let kept = self.policy.apply(raw);
        debug!(
            "{} detector: {} detections on frame {} ({}x{})",
            self.model.name(),
            kept.len(),
            frame.id,
            frame.width,
            frame.height
        );
        Ok(kept)
    }
}

/// Build the detector selected by `config.kind` around `camera`
pub fn build_detector(
    config: &DetectorConfig,
    camera: CameraSession,
) -> Result<Box<dyn Detector>, ConfigurationError> {
    let policy = DetectionPolicy::from_config(config);
    info!(
        "Building {:?} detector (confidence >= {}, ignoring {:?})",
        config.kind, config.confidence_threshold, config.ignored_labels
    );
    let detector: Box<dyn Detector> = match config.kind {
        DetectorKind::Histogram => Box::new(MotionDetector::new(
            HistogramModel::new(config.histogram_min_diff, config.blur),
            camera,
            policy,
        )),
        DetectorKind::PixelDifference => Box::new(MotionDetector::new(
            PixelDifferenceModel::new(config.pixel_min_diff, config.delta_threshold, config.blur),
            camera,
            policy,
        )),
        DetectorKind::AdaptiveThreshold => Box::new(MotionDetector::new(
            AdaptiveThresholdModel::new(config.adaptive_min_percent, config.blur),
            camera,
            policy,
        )),
        DetectorKind::Contour => Box::new(MotionDetector::new(
            ContourModel::new(config.delta_threshold, config.contour_minimum_area),
            camera,
            policy,
        )),
        DetectorKind::Object => {
            let model_path = config.object_model_path.as_deref().ok_or_else(|| {
                ConfigurationError::Model {
                    path: String::new(),
                    details: "detector.object_model_path is not set".to_string(),
                }
            })?;
            let labels = match &config.object_labels_path {
                Some(path) => LabelMap::load(path)?,
                None => LabelMap::default(),
            };
            let size = config.object_input_size;
            let engine = object::load_engine(model_path, (size, size))?;
            Box::new(ObjectDetector::new(engine, labels, camera, policy))
        }
    };
    Ok(detector)
}
