use super::directory::DirectorySource;
use super::session::CameraSession;
use super::source::FrameSource;
use super::synthetic::SyntheticSource;
use crate::config::{CameraConfig, CameraSourceKind};
use crate::error::ConfigurationError;
use crate::frame::FrameFormat;

/// Builds a camera session for the configured source kind
pub struct CameraSessionBuilder {
    config: Option<CameraConfig>,
    source: Option<Box<dyn FrameSource>>,
}

impl CameraSessionBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            source: None,
        }
    }

    pub fn config(mut self, config: CameraConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use an explicit source instead of the one named in the config
    pub fn source(mut self, source: Box<dyn FrameSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn build(self) -> Result<CameraSession, ConfigurationError> {
        let config = self.config.ok_or_else(|| ConfigurationError::Pipeline {
            details: "Camera configuration must be specified".to_string(),
        })?;

        let source = match self.source {
            Some(source) => source,
            None => source_for(&config)?,
        };

        Ok(CameraSession::new(source, config.acquire_timeout()).with_rotation(config.rotation))
    }
}

impl Default for CameraSessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn source_for(config: &CameraConfig) -> Result<Box<dyn FrameSource>, ConfigurationError> {
    let (width, height) = config.resolution;
    match config.source {
        CameraSourceKind::Synthetic => Ok(Box::new(SyntheticSource::new(width, height))),
        CameraSourceKind::Directory => Ok(Box::new(DirectorySource::new(
            &config.replay_dir,
            config.replay_loop,
        ))),
        CameraSourceKind::Gstreamer => gstreamer_source(config),
    }
}

#[cfg(all(target_os = "linux", feature = "camera"))]
fn gstreamer_source(config: &CameraConfig) -> Result<Box<dyn FrameSource>, ConfigurationError> {
    let format =
        FrameFormat::from_name(&config.format).ok_or_else(|| ConfigurationError::UnsupportedFormat {
            format: config.format.clone(),
        })?;
    Ok(Box::new(super::v4l2::GStreamerSource::new(
        config.resolution,
        config.fps,
        format,
    )))
}

#[cfg(not(all(target_os = "linux", feature = "camera")))]
fn gstreamer_source(config: &CameraConfig) -> Result<Box<dyn FrameSource>, ConfigurationError> {
    if FrameFormat::from_name(&config.format).is_none() {
        return Err(ConfigurationError::UnsupportedFormat {
            format: config.format.clone(),
        });
    }
    Err(ConfigurationError::Pipeline {
        details: "GStreamer camera support requires Linux and the `camera` feature".to_string(),
    })
}
