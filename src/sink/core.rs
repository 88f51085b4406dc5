use async_trait::async_trait;
use chrono_tz::Tz;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use super::filename::{capture_filename, resolve_timezone};
use super::metadata::{embed_event, write_sidecar};
use super::overlay::{draw_detections, TimestampFont};
use super::ImageSink;
use crate::config::CaptureConfig;
use crate::error::PersistenceError;
use crate::event::CaptureEvent;
use crate::frame::{encode_rgb_jpeg, FrameData};

/// Writes one JPEG per saved tick into a flat output directory
pub struct JpegImageSink {
    output_dir: PathBuf,
    quality: u8,
    timezone: Tz,
    sidecar_metadata: bool,
    timestamp_font: Option<TimestampFont>,
    draw_detections: bool,
}

impl JpegImageSink {
    pub fn new<P: AsRef<Path>>(output_dir: P, quality: u8, timezone: Tz) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            quality,
            timezone,
            sidecar_metadata: false,
            timestamp_font: None,
            draw_detections: false,
        }
    }

    /// Build from configuration. A font that cannot be loaded disables the
    /// timestamp overlay rather than failing startup.
    pub fn from_config(config: &CaptureConfig) -> Self {
        let mut sink = Self::new(
            &config.output_dir,
            config.jpeg_quality,
            resolve_timezone(&config.timezone),
        )
        .with_sidecar(config.sidecar_metadata)
        .with_detection_boxes(config.draw_detections);

        if config.timestamp_overlay {
            match TimestampFont::load(&config.timestamp_font_path, config.timestamp_font_size) {
                Ok(font) => sink = sink.with_timestamp_font(font),
                Err(e) => warn!("Timestamp overlay disabled: {}", e),
            }
        }
        sink
    }

    pub fn with_sidecar(mut self, enabled: bool) -> Self {
        self.sidecar_metadata = enabled;
        self
    }

    pub fn with_timestamp_font(mut self, font: TimestampFont) -> Self {
        self.timestamp_font = Some(font);
        self
    }

    pub fn with_detection_boxes(mut self, enabled: bool) -> Self {
        self.draw_detections = enabled;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn needs_overlay(&self, event: &CaptureEvent) -> bool {
        self.timestamp_font.is_some() || (self.draw_detections && event.object_detected())
    }

    fn encode(&self, frame: &FrameData, event: &CaptureEvent) -> Result<Vec<u8>, PersistenceError> {
        if !self.needs_overlay(event) {
            return Ok(frame.encode_jpeg(self.quality)?);
        }

        let mut image = frame.to_rgb_image()?;
        if self.draw_detections {
            draw_detections(&mut image, event.detections());
        }
        if let Some(font) = &self.timestamp_font {
            let text = event
                .capture_time()
                .with_timezone(&self.timezone)
                .format("%Y-%m-%d %H:%M:%S%.3f %Z")
                .to_string();
            font.draw(&mut image, &text);
        }
        Ok(encode_rgb_jpeg(&image, self.quality)?)
    }
}

#[async_trait]
impl ImageSink for JpegImageSink {
    async fn save(
        &mut self,
        frame: &FrameData,
        event: CaptureEvent,
    ) -> Result<PathBuf, PersistenceError> {
        fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|source| PersistenceError::DirectoryCreation {
                path: self.output_dir.display().to_string(),
                source,
            })?;

        let jpeg = self.encode(frame, &event)?;
        let bytes = embed_event(&jpeg, &event)?;

        let path = self.output_dir.join(capture_filename(&event));
        fs::write(&path, &bytes)
            .await
            .map_err(|source| PersistenceError::Write {
                path: path.display().to_string(),
                source,
            })?;

        if self.sidecar_metadata {
            write_sidecar(&path, &event).await?;
        }

        info!("Saved {} ({} bytes): {}", path.display(), bytes.len(), event.summary());
        debug!("Save reason: {:?}", event.save_reason());
        Ok(path)
    }
}
