use std::time::Duration;
use tracing::{debug, info, warn};

use super::source::{CameraHandle, FrameSource};
use crate::error::{AcquisitionError, ConfigurationError};
use crate::frame::{Frame, Rotation};

/// Owns one frame source and hands out handles for it
pub struct CameraSession {
    source: Box<dyn FrameSource>,
    timeout: Duration,
    rotation: Option<Rotation>,
    current: Option<CameraHandle>,
    generation: u64,
}

impl CameraSession {
    pub fn new(source: Box<dyn FrameSource>, timeout: Duration) -> Self {
        Self {
            source,
            timeout,
            rotation: None,
            current: None,
            generation: 0,
        }
    }

    pub fn with_rotation(mut self, rotation: Option<Rotation>) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn source_kind(&self) -> &'static str {
        self.source.kind()
    }

    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }

    pub async fn configure(&mut self, camera_index: u32) -> Result<CameraHandle, ConfigurationError> {
        if let Some(handle) = self.current.take() {
            debug!(
                "Reconfiguring camera {}; closing previous handle",
                handle.camera_index()
            );
            self.source.close().await;
        }

        self.source.open(camera_index).await?;
        self.generation += 1;
        let handle = CameraHandle::new(camera_index, self.generation);
        self.current = Some(handle.clone());

        info!(
            "Camera {} configured using {} source",
            camera_index,
            self.source.kind()
        );
        Ok(handle)
    }

    pub async fn acquire(&mut self, handle: &CameraHandle) -> Result<Frame, AcquisitionError> {
        if self.current.as_ref() != Some(handle) {
            return Err(AcquisitionError::InvalidHandle {
                camera_index: handle.camera_index(),
            });
        }

        let frame = match tokio::time::timeout(self.timeout, self.source.grab(self.timeout)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(AcquisitionError::Timeout {
                    camera_index: handle.camera_index(),
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
        };

        match self.rotation {
            Some(rotation) => rotate(frame, rotation),
            None => Ok(frame),
        }
    }

    /// Close the source if `handle` is the live one; stale handles are ignored
    pub async fn release(&mut self, handle: CameraHandle) {
        if self.current.as_ref() == Some(&handle) {
            self.source.close().await;
            self.current = None;
            info!("Camera {} released", handle.camera_index());
        } else {
            warn!(
                "Ignoring release of stale handle for camera {}",
                handle.camera_index()
            );
        }
    }
}

fn rotate(frame: Frame, rotation: Rotation) -> Result<Frame, AcquisitionError> {
    let to_stream = |e: crate::error::FrameError| AcquisitionError::Stream {
        details: format!("rotation by {} degrees failed: {}", rotation.degrees(), e),
    };
    let main = frame.main.rotated(rotation).map_err(to_stream)?;
    let lores = match frame.lores {
        Some(lores) => Some(lores.rotated(rotation).map_err(to_stream)?),
        None => None,
    };
    Ok(Frame { main, lores })
}
