//! Neural object detection over SSD-style networks.
//!
//! The network sees an RGB frame resized to its input size and answers with
//! four tensors: boxes `[1, N, 4]` as normalized `(top, left, bottom, right)`,
//! class ids `[1, N]`, scores `[1, N]` and the valid count `[1]`.

use async_trait::async_trait;
use image::imageops::FilterType;
use image::RgbImage;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use super::{DetectionPolicy, Detector};
use crate::camera::CameraSession;
use crate::error::{ConfigurationError, DetectionFault};
use crate::event::{BoundingBox, Detection};
use crate::frame::FrameData;

/// Class id to label lookup read from a labels file
#[derive(Debug, Clone, Default)]
pub struct LabelMap {
    labels: HashMap<u32, String>,
}

impl LabelMap {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigurationError::Model {
            path: path.display().to_string(),
            details: format!("Failed to read labels file: {}", e),
        })?;
        let labels = Self::parse(&text);
        info!("Loaded {} class labels from {}", labels.len(), path.display());
        Ok(labels)
    }

    /// Lines are `<id> <label>`; a line without a leading id takes its
    /// zero-based position among non-empty lines
    pub fn parse(text: &str) -> Self {
        let mut labels = HashMap::new();
        let lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
        for (position, line) in lines.enumerate() {
            let mut parts = line.splitn(2, char::is_whitespace);
            let first = parts.next().unwrap_or_default();
            match (first.parse::<u32>(), parts.next().map(str::trim)) {
                (Ok(id), Some(label)) if !label.is_empty() => {
                    labels.insert(id, label.to_string());
                }
                _ => {
                    labels.insert(position as u32, line.to_string());
                }
            }
        }
        Self { labels }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn label(&self, class_id: u32) -> String {
        self.labels
            .get(&class_id)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", class_id))
    }
}

/// Raw output tensors of one inference, flattened
#[derive(Debug, Clone, Default)]
pub struct SsdOutputs {
    pub boxes: Vec<f32>,
    pub classes: Vec<f32>,
    pub scores: Vec<f32>,
    pub count: Option<usize>,
}

/// Map SSD outputs to detections in the network's ranking order
pub fn decode_ssd_outputs(outputs: &SsdOutputs, labels: &LabelMap) -> Vec<Detection> {
    let available = (outputs.boxes.len() / 4)
        .min(outputs.classes.len())
        .min(outputs.scores.len());
    let count = outputs.count.map_or(available, |c| c.min(available));

    (0..count)
        .map(|i| {
            let b = &outputs.boxes[i * 4..i * 4 + 4];
            let class_id = outputs.classes[i].max(0.0).round() as u32;
            Detection::new(
                labels.label(class_id),
                outputs.scores[i],
                BoundingBox::new(b[1], b[0], b[3], b[2]),
            )
        })
        .collect()
}

/// Runs the network on an already resized RGB image
pub trait InferenceEngine: Send {
    /// Network input size as (width, height)
    fn input_size(&self) -> (u32, u32);

    fn infer(&mut self, image: &RgbImage) -> Result<SsdOutputs, DetectionFault>;
}

pub struct ObjectDetector {
    engine: Box<dyn InferenceEngine>,
    labels: LabelMap,
    camera: CameraSession,
    policy: DetectionPolicy,
}

impl ObjectDetector {
    pub fn new(
        engine: Box<dyn InferenceEngine>,
        labels: LabelMap,
        camera: CameraSession,
        policy: DetectionPolicy,
    ) -> Self {
        Self {
            engine,
            labels,
            camera,
            policy,
        }
    }
}

#[async_trait]
impl Detector for ObjectDetector {
    fn name(&self) -> &str {
        "object"
    }

    fn camera(&mut self) -> &mut CameraSession {
        &mut self.camera
    }

    fn detect(&mut self, frame: &FrameData) -> Result<Vec<Detection>, DetectionFault> {
        let (width, height) = self.engine.input_size();
        let rgb = frame.to_rgb_image()?;
        let input = if rgb.dimensions() == (width, height) {
            rgb
        } else {
            image::imageops::resize(&rgb, width, height, FilterType::Triangle)
        };
        let outputs = self.engine.infer(&input)?;
        let kept = self.policy.apply(decode_ssd_outputs(&outputs, &self.labels));
        debug!(
            "object detector: {} detections on frame {} ({}x{})",
            kept.len(),
            frame.id,
            frame.width,
            frame.height
        );
        Ok(kept)
    }
}

#[cfg(feature = "object")]
pub use onnx::OnnxEngine;

#[cfg(feature = "object")]
mod onnx {
    use image::RgbImage;
    use ndarray::Array4;
    use ort::session::builder::GraphOptimizationLevel;
    use ort::session::Session;
    use ort::tensor::TensorElementType;
    use ort::value::{DynValue, Tensor};
    use std::path::Path;
    use tracing::info;

    use super::{InferenceEngine, SsdOutputs};
    use crate::error::{ConfigurationError, DetectionFault};

    /// ONNX Runtime session for an NHWC SSD model
    pub struct OnnxEngine {
        session: Session,
        input_size: (u32, u32),
        quantized: bool,
        has_count: bool,
    }

    fn inference_fault(e: impl std::fmt::Display) -> DetectionFault {
        DetectionFault::FrameProcessing {
            details: format!("Inference failed: {}", e),
        }
    }

    impl OnnxEngine {
        pub fn load<P: AsRef<Path>>(
            path: P,
            input_size: (u32, u32),
        ) -> Result<Self, ConfigurationError> {
            let path = path.as_ref();
            let model_error = |e: &dyn std::fmt::Display| ConfigurationError::Model {
                path: path.display().to_string(),
                details: e.to_string(),
            };
            let session = Session::builder()
                .map_err(|e| model_error(&e))?
                .with_optimization_level(GraphOptimizationLevel::Level3)
                .map_err(|e| model_error(&e))?
                .commit_from_file(path)
                .map_err(|e| model_error(&e))?;
            let output_count = session.outputs.len();
            if output_count < 3 {
                return Err(model_error(&format!(
                    "expected boxes, classes and scores outputs, model has {}",
                    output_count
                )));
            }
            let quantized = session.inputs.first().map_or(false, |input| {
                input.input_type.tensor_type() == Some(TensorElementType::Uint8)
            });
            info!(
                "Loaded object model {} ({}x{}, {} input)",
                path.display(),
                input_size.0,
                input_size.1,
                if quantized { "uint8" } else { "float" }
            );
            Ok(Self {
                session,
                input_size,
                quantized,
                has_count: output_count > 3,
            })
        }
    }

    fn extract(value: &DynValue) -> Result<Vec<f32>, DetectionFault> {
        let view = value.try_extract_array::<f32>().map_err(inference_fault)?;
        Ok(view.iter().copied().collect())
    }

    impl InferenceEngine for OnnxEngine {
        fn input_size(&self) -> (u32, u32) {
            self.input_size
        }

        fn infer(&mut self, image: &RgbImage) -> Result<SsdOutputs, DetectionFault> {
            let (width, height) = image.dimensions();
            let shape = (1, height as usize, width as usize, 3);
            let raw = image.as_raw().clone();

            let outputs = if self.quantized {
                let input = Array4::from_shape_vec(shape, raw).map_err(inference_fault)?;
                let tensor = Tensor::from_array(input).map_err(inference_fault)?;
                self.session.run(ort::inputs![tensor]).map_err(inference_fault)?
            } else {
                let scaled: Vec<f32> = raw
                    .into_iter()
                    .map(|v| (v as f32 - 127.5) / 127.5)
                    .collect();
                let input = Array4::from_shape_vec(shape, scaled).map_err(inference_fault)?;
                let tensor = Tensor::from_array(input).map_err(inference_fault)?;
                self.session.run(ort::inputs![tensor]).map_err(inference_fault)?
            };

            let count = if self.has_count {
                extract(&outputs[3])?.first().map(|c| c.max(0.0) as usize)
            } else {
                None
            };
            Ok(SsdOutputs {
                boxes: extract(&outputs[0])?,
                classes: extract(&outputs[1])?,
                scores: extract(&outputs[2])?,
                count,
            })
        }
    }
}

/// Build the configured engine; needs the `object` feature
#[cfg(feature = "object")]
pub fn load_engine(
    model_path: &str,
    input_size: (u32, u32),
) -> Result<Box<dyn InferenceEngine>, ConfigurationError> {
    Ok(Box::new(OnnxEngine::load(model_path, input_size)?))
}

#[cfg(not(feature = "object"))]
pub fn load_engine(
    model_path: &str,
    _input_size: (u32, u32),
) -> Result<Box<dyn InferenceEngine>, ConfigurationError> {
    Err(ConfigurationError::Model {
        path: model_path.to_string(),
        details: "built without the `object` feature".to_string(),
    })
}
