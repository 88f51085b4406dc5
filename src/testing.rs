//! Scripted doubles shared by unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::camera::{CameraSession, FrameSource};
use crate::detector::Detector;
use crate::error::{
    AcquisitionError, ConfigurationError, DetectionFault, PersistenceError, PresenceError,
};
use crate::event::{BoundingBox, CaptureEvent, Detection};
use crate::frame::{Frame, FrameData, FrameFormat};
use crate::presence::PresenceSensor;
use crate::sink::ImageSink;

pub fn gray_frame(width: u32, height: u32, value: u8) -> FrameData {
    FrameData::new(
        0,
        SystemTime::now(),
        vec![value; (width * height) as usize],
        width,
        height,
        FrameFormat::Gray8,
    )
}

pub fn person() -> Detection {
    Detection::new("person", 0.92, BoundingBox::new(0.1, 0.2, 0.4, 0.6))
}

pub enum SourceStep {
    Frame(FrameData),
    Fail,
    Stall,
}

/// Size of the filler frame a `ScriptedSource` returns once its script runs out
pub const SCRIPTED_WIDTH: u32 = 32;
pub const SCRIPTED_HEIGHT: u32 = 24;

/// Frame source replaying a fixed script, then a flat gray frame forever
pub struct ScriptedSource {
    steps: VecDeque<SourceStep>,
    fail_open: bool,
    opened: bool,
}

impl ScriptedSource {
    pub fn new(steps: Vec<SourceStep>) -> Self {
        Self {
            steps: steps.into(),
            fail_open: false,
            opened: false,
        }
    }

    pub fn failing_open() -> Self {
        Self {
            steps: VecDeque::new(),
            fail_open: true,
            opened: false,
        }
    }
}

#[async_trait]
impl FrameSource for ScriptedSource {
    fn kind(&self) -> &'static str {
        "scripted"
    }

    async fn open(&mut self, camera_index: u32) -> Result<(), ConfigurationError> {
        if self.fail_open {
            return Err(ConfigurationError::Device {
                device: format!("scripted{}", camera_index),
                details: "scripted failure".to_string(),
            });
        }
        self.opened = true;
        Ok(())
    }

    async fn grab(&mut self, timeout: Duration) -> Result<Frame, AcquisitionError> {
        match self.steps.pop_front() {
            Some(SourceStep::Frame(frame)) => Ok(Frame::new(frame)),
            Some(SourceStep::Fail) => Err(AcquisitionError::Stream {
                details: "scripted failure".to_string(),
            }),
            Some(SourceStep::Stall) => {
                tokio::time::sleep(timeout * 10).await;
                Ok(Frame::new(gray_frame(32, 24, 0)))
            }
            None => Ok(Frame::new(gray_frame(SCRIPTED_WIDTH, SCRIPTED_HEIGHT, 100))),
        }
    }

    async fn close(&mut self) {
        self.opened = false;
    }
}

pub enum DetectStep {
    Found(Vec<Detection>),
    Fail,
    Panic,
}

/// Detector that returns scripted results, counts calls and records input sizes
pub struct ScriptedDetector {
    camera: CameraSession,
    steps: VecDeque<DetectStep>,
    pub calls: Arc<AtomicUsize>,
    pub frame_sizes: Arc<Mutex<Vec<(u32, u32)>>>,
}

impl ScriptedDetector {
    pub fn new(source: ScriptedSource, steps: Vec<DetectStep>) -> Self {
        Self {
            camera: CameraSession::new(Box::new(source), Duration::from_millis(100)),
            steps: steps.into(),
            calls: Arc::new(AtomicUsize::new(0)),
            frame_sizes: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn quiet() -> Self {
        Self::new(ScriptedSource::new(Vec::new()), Vec::new())
    }
}

#[async_trait]
impl Detector for ScriptedDetector {
    fn name(&self) -> &str {
        "scripted"
    }

    fn camera(&mut self) -> &mut CameraSession {
        &mut self.camera
    }

    fn detect(&mut self, frame: &FrameData) -> Result<Vec<Detection>, DetectionFault> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.frame_sizes.lock().push((frame.width, frame.height));
        match self.steps.pop_front() {
            Some(DetectStep::Found(detections)) => Ok(detections),
            Some(DetectStep::Fail) => Err(DetectionFault::FrameProcessing {
                details: "scripted failure".to_string(),
            }),
            Some(DetectStep::Panic) => panic!("scripted detector panic"),
            None => Ok(Vec::new()),
        }
    }
}

/// Sink that records every event instead of writing files
#[derive(Clone, Default)]
pub struct RecordingSink {
    pub saved: Arc<Mutex<Vec<CaptureEvent>>>,
    pub fail: Arc<std::sync::atomic::AtomicBool>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<CaptureEvent> {
        self.saved.lock().clone()
    }
}

#[async_trait]
impl ImageSink for RecordingSink {
    async fn save(
        &mut self,
        _frame: &FrameData,
        event: CaptureEvent,
    ) -> Result<PathBuf, PersistenceError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PersistenceError::Encode {
                details: "scripted failure".to_string(),
            });
        }
        let path = PathBuf::from(format!("recorded-{}.jpg", self.saved.lock().len()));
        self.saved.lock().push(event);
        Ok(path)
    }
}

/// Presence sensor replaying readings; repeats the last one when exhausted
pub struct ScriptedSensor {
    readings: VecDeque<Option<bool>>,
    last: Option<bool>,
}

impl ScriptedSensor {
    /// `None` entries produce a read error
    pub fn new(readings: Vec<Option<bool>>) -> Self {
        Self {
            readings: readings.into(),
            last: None,
        }
    }
}

#[async_trait]
impl PresenceSensor for ScriptedSensor {
    fn name(&self) -> String {
        "scripted".to_string()
    }

    async fn read(&mut self) -> Result<bool, PresenceError> {
        let reading = match self.readings.pop_front() {
            Some(r) => r,
            None => self.last,
        };
        match reading {
            Some(value) => {
                self.last = Some(value);
                Ok(value)
            }
            None => Err(PresenceError::InvalidValue {
                device: "scripted".to_string(),
                value: "error".to_string(),
            }),
        }
    }
}
