use async_trait::async_trait;
use std::time::Duration;

use crate::error::{AcquisitionError, ConfigurationError};
use crate::frame::Frame;

/// Camera acquisition primitive.
///
/// A source is opened once for a camera index, then polled for the most recent
/// frame. `grab` may block up to `timeout`; the session enforces the bound as
/// well, so an implementation that ignores it still cannot stall the loop.
#[async_trait]
pub trait FrameSource: Send {
    /// Short name used in logs ("gstreamer", "synthetic", ...)
    fn kind(&self) -> &'static str;

    async fn open(&mut self, camera_index: u32) -> Result<(), ConfigurationError>;

    async fn grab(&mut self, timeout: Duration) -> Result<Frame, AcquisitionError>;

    /// Release the device. Safe to call on a source that is not open.
    async fn close(&mut self);
}

/// Token for an opened camera. Stale after `release`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraHandle {
    camera_index: u32,
    generation: u64,
}

impl CameraHandle {
    pub(crate) fn new(camera_index: u32, generation: u64) -> Self {
        Self {
            camera_index,
            generation,
        }
    }

    pub fn camera_index(&self) -> u32 {
        self.camera_index
    }
}
