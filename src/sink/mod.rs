mod core;
mod filename;
mod metadata;
mod overlay;
#[cfg(test)]
mod tests;

pub use self::core::JpegImageSink;
pub use filename::{capture_filename, resolve_timezone};
pub use metadata::{embed_event, extract_event, read_embedded_event};
pub use overlay::{draw_detections, TimestampFont};

use async_trait::async_trait;
use std::path::PathBuf;

use crate::error::PersistenceError;
use crate::event::CaptureEvent;
use crate::frame::FrameData;

/// Persistence boundary for frames the loop decided to keep
#[async_trait]
pub trait ImageSink: Send {
    /// Encode `frame`, embed `event`, write it and return the path written
    async fn save(
        &mut self,
        frame: &FrameData,
        event: CaptureEvent,
    ) -> Result<PathBuf, PersistenceError>;
}
