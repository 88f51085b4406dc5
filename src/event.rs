use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Box in normalized frame coordinates, all edges within [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
}

impl BoundingBox {
    /// Build a box, clamping every edge into [0, 1] and ordering min <= max
    pub fn new(xmin: f32, ymin: f32, xmax: f32, ymax: f32) -> Self {
        let clamp = |v: f32| if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) };
        let (x0, x1) = (clamp(xmin), clamp(xmax));
        let (y0, y1) = (clamp(ymin), clamp(ymax));
        Self {
            xmin: x0.min(x1),
            ymin: y0.min(y1),
            xmax: x0.max(x1),
            ymax: y0.max(y1),
        }
    }

    pub fn full_frame() -> Self {
        Self::new(0.0, 0.0, 1.0, 1.0)
    }

    /// Normalize an inclusive pixel extent against the frame size
    pub fn from_pixels(x0: u32, y0: u32, x1: u32, y1: u32, width: u32, height: u32) -> Self {
        let w = width.max(1) as f32;
        let h = height.max(1) as f32;
        Self::new(
            x0 as f32 / w,
            y0 as f32 / h,
            (x1 + 1) as f32 / w,
            (y1 + 1) as f32 / h,
        )
    }

    /// True when every edge lies in [0, 1] and min <= max on both axes
    pub fn is_normalized(&self) -> bool {
        let unit = |v: f32| (0.0..=1.0).contains(&v);
        unit(self.xmin)
            && unit(self.ymin)
            && unit(self.xmax)
            && unit(self.ymax)
            && self.xmin <= self.xmax
            && self.ymin <= self.ymax
    }

    /// Pixel rectangle (x, y, width, height) for a frame of the given size
    pub fn to_pixels(&self, width: u32, height: u32) -> (i32, i32, u32, u32) {
        let x = (self.xmin * width as f32).round() as i32;
        let y = (self.ymin * height as f32).round() as i32;
        let w = ((self.xmax - self.xmin) * width as f32).round().max(1.0) as u32;
        let h = ((self.ymax - self.ymin) * height as f32).round().max(1.0) as u32;
        (x, y, w, h)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(rename = "class_label")]
    pub label: String,
    pub confidence: f32,
    #[serde(rename = "bounding_box")]
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            confidence: if confidence.is_nan() {
                0.0
            } else {
                confidence.clamp(0.0, 1.0)
            },
            bbox,
        }
    }
}

/// Why a frame was persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveReason {
    Object,
    Presence,
    Silence,
    Manual,
}

impl fmt::Display for SaveReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SaveReason::Object => "object",
            SaveReason::Presence => "presence",
            SaveReason::Silence => "silence",
            SaveReason::Manual => "manual",
        };
        f.write_str(s)
    }
}

/// Normalized record of one camera's tick.
///
/// `object_detected` is derived from `detections` when the event is built and
/// re-checked when one is parsed, so the two can never disagree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "EventRecord")]
pub struct CaptureEvent {
    capture_time: DateTime<Utc>,
    node_identity: String,
    camera_index: u32,
    presence_triggered: Option<bool>,
    object_detected: bool,
    detections: Vec<Detection>,
    detector: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    save_reason: Option<SaveReason>,
}

impl CaptureEvent {
    pub fn new(
        capture_time: DateTime<Utc>,
        node_identity: impl Into<String>,
        camera_index: u32,
        presence_triggered: Option<bool>,
        detector: impl Into<String>,
        detections: Vec<Detection>,
    ) -> Self {
        Self {
            capture_time: capture_time.trunc_subsecs(3),
            node_identity: node_identity.into(),
            camera_index,
            presence_triggered,
            object_detected: !detections.is_empty(),
            detections,
            detector: detector.into(),
            save_reason: None,
        }
    }

    pub fn with_save_reason(mut self, reason: SaveReason) -> Self {
        self.save_reason = Some(reason);
        self
    }

    pub fn capture_time(&self) -> DateTime<Utc> {
        self.capture_time
    }

    pub fn node_identity(&self) -> &str {
        &self.node_identity
    }

    pub fn camera_index(&self) -> u32 {
        self.camera_index
    }

    pub fn presence_triggered(&self) -> Option<bool> {
        self.presence_triggered
    }

    /// Presence collapsed to a flag; unknown counts as absent
    pub fn presence(&self) -> bool {
        self.presence_triggered.unwrap_or(false)
    }

    pub fn object_detected(&self) -> bool {
        self.object_detected
    }

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    pub fn detector(&self) -> &str {
        &self.detector
    }

    pub fn save_reason(&self) -> Option<SaveReason> {
        self.save_reason
    }

    /// One-line form used in logs, e.g. `PIR - Object - Classes: [person]`
    pub fn summary(&self) -> String {
        let pir = match self.presence_triggered {
            Some(true) => "PIR",
            Some(false) => "No PIR",
            None => "PIR n/a",
        };
        let object = if self.object_detected {
            "Object"
        } else {
            "No Object"
        };
        let labels: Vec<&str> = self.detections.iter().map(|d| d.label.as_str()).collect();
        format!("{} - {} - Classes: [{}]", pir, object, labels.join(", "))
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[derive(Deserialize)]
struct EventRecord {
    capture_time: DateTime<Utc>,
    node_identity: String,
    camera_index: u32,
    presence_triggered: Option<bool>,
    object_detected: bool,
    #[serde(default)]
    detections: Vec<Detection>,
    #[serde(default)]
    detector: String,
    #[serde(default)]
    save_reason: Option<SaveReason>,
}

impl TryFrom<EventRecord> for CaptureEvent {
    type Error = String;

    fn try_from(record: EventRecord) -> Result<Self, Self::Error> {
        if record.object_detected != !record.detections.is_empty() {
            return Err(format!(
                "object_detected={} disagrees with {} detections",
                record.object_detected,
                record.detections.len()
            ));
        }
        for (i, detection) in record.detections.iter().enumerate() {
            if !(0.0..=1.0).contains(&detection.confidence) {
                return Err(format!(
                    "detection {} confidence {} outside [0, 1]",
                    i, detection.confidence
                ));
            }
            if !detection.bbox.is_normalized() {
                return Err(format!(
                    "detection {} bounding box {:?} is not normalized",
                    i, detection.bbox
                ));
            }
        }
        Ok(Self {
            capture_time: record.capture_time,
            node_identity: record.node_identity,
            camera_index: record.camera_index,
            presence_triggered: record.presence_triggered,
            object_detected: record.object_detected,
            detections: record.detections,
            detector: record.detector,
            save_reason: record.save_reason,
        })
    }
}
