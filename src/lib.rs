pub mod app;
pub mod burst;
pub mod camera;
pub mod capture_loop;
pub mod config;
pub mod detector;
pub mod error;
pub mod event;
pub mod frame;
pub mod presence;
pub mod sink;
pub mod telemetry;

#[cfg(test)]
mod testing;

pub use app::{ComponentState, KeyboardInputHandler, SentryOrchestrator, ShutdownReason};
pub use burst::BurstController;
pub use camera::{CameraHandle, CameraSession, CameraSessionBuilder, FrameSource};
pub use capture_loop::{CameraOutcome, CaptureLoop, LoopSettings, TickReport};
pub use config::SentryConfig;
pub use detector::{build_detector, Detector, DetectionPolicy, MotionModel};
pub use error::{Result, SentryError};
pub use event::{BoundingBox, CaptureEvent, Detection, SaveReason};
pub use frame::{Frame, FrameData, FrameFormat, Rotation};
pub use presence::{PresenceMonitor, PresenceSensor, SysfsGpioSensor};
pub use sink::{ImageSink, JpegImageSink};
pub use telemetry::{LoopTelemetry, StatsWriter};
