use async_trait::async_trait;
use gstreamer::prelude::*;
use gstreamer::Pipeline;
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, trace, warn};

use super::source::FrameSource;
use crate::error::{AcquisitionError, ConfigurationError};
use crate::frame::{Frame, FrameData, FrameFormat};

/// V4L2 camera read through a GStreamer appsink.
///
/// The sink keeps only the newest buffer (`max-buffers=1 drop=true`) so a grab
/// always returns the most recent frame rather than a queued one.
pub struct GStreamerSource {
    resolution: (u32, u32),
    fps: u32,
    format: FrameFormat,
    pipeline: Option<Pipeline>,
    appsink: Option<AppSink>,
    frame_counter: u64,
    camera_index: Option<u32>,
}

impl GStreamerSource {
    pub fn new(resolution: (u32, u32), fps: u32, format: FrameFormat) -> Self {
        Self {
            resolution,
            fps,
            format,
            pipeline: None,
            appsink: None,
            frame_counter: 0,
            camera_index: None,
        }
    }

    fn build_pipeline_string(&self, camera_index: u32) -> Result<String, ConfigurationError> {
        let (width, height) = self.resolution;
        let caps = match self.format {
            FrameFormat::Mjpeg => format!(
                "image/jpeg,width={},height={},framerate={}/1",
                width, height, self.fps
            ),
            FrameFormat::Yuyv => format!(
                "video/x-raw,format=YUY2,width={},height={},framerate={}/1",
                width, height, self.fps
            ),
            FrameFormat::Rgb24 => format!(
                "video/x-raw,format=RGB,width={},height={},framerate={}/1",
                width, height, self.fps
            ),
            FrameFormat::Gray8 => format!(
                "video/x-raw,format=GRAY8,width={},height={},framerate={}/1",
                width, height, self.fps
            ),
        };
        let convert = if self.format == FrameFormat::Mjpeg {
            ""
        } else {
            "videoconvert ! "
        };

        Ok(format!(
            "v4l2src device=/dev/video{} io-mode=mmap do-timestamp=true ! {}{} ! \
             appsink name=sink sync=false max-buffers=1 drop=true enable-last-sample=false emit-signals=false",
            camera_index, convert, caps
        ))
    }

    fn sample_to_frame(
        sample: &gstreamer::Sample,
        frame_id: u64,
        format: FrameFormat,
    ) -> Result<FrameData, AcquisitionError> {
        let buffer = sample.buffer().ok_or_else(|| AcquisitionError::Stream {
            details: "No buffer in sample".to_string(),
        })?;

        let caps = sample.caps().ok_or_else(|| AcquisitionError::Stream {
            details: "No caps in sample".to_string(),
        })?;

        let (width, height) = match VideoInfo::from_caps(caps) {
            Ok(info) => (info.width(), info.height()),
            // image/jpeg caps are not raw video; read the structure directly
            Err(_) => {
                let structure = caps.structure(0).ok_or_else(|| AcquisitionError::Stream {
                    details: "Sample caps have no structure".to_string(),
                })?;
                let width = structure.get::<i32>("width").unwrap_or(0).max(0) as u32;
                let height = structure.get::<i32>("height").unwrap_or(0).max(0) as u32;
                (width, height)
            }
        };

        let map = buffer
            .map_readable()
            .map_err(|e| AcquisitionError::Stream {
                details: format!("Failed to map buffer: {}", e),
            })?;

        trace!(
            "Pulled frame {} ({}x{}, {} bytes)",
            frame_id,
            width,
            height,
            map.len()
        );

        Ok(FrameData::new(
            frame_id,
            SystemTime::now(),
            map.as_slice().to_vec(),
            width,
            height,
            format,
        ))
    }
}

#[async_trait]
impl FrameSource for GStreamerSource {
    fn kind(&self) -> &'static str {
        "gstreamer"
    }

    async fn open(&mut self, camera_index: u32) -> Result<(), ConfigurationError> {
        let (width, height) = self.resolution;
        if width == 0 || height == 0 || width % 2 != 0 {
            return Err(ConfigurationError::UnsupportedResolution { width, height });
        }

        let device = format!("/dev/video{}", camera_index);
        if !Path::new(&device).exists() {
            return Err(ConfigurationError::Device {
                device,
                details: "device node does not exist".to_string(),
            });
        }

        gstreamer::init().map_err(|e| ConfigurationError::Pipeline {
            details: format!("Failed to initialize GStreamer: {}", e),
        })?;

        let pipeline_desc = self.build_pipeline_string(camera_index)?;
        info!("Creating GStreamer pipeline: {}", pipeline_desc);

        let pipeline = gstreamer::parse::launch(&pipeline_desc)
            .map_err(|e| ConfigurationError::Pipeline {
                details: format!("Failed to create pipeline: {}", e),
            })?
            .downcast::<Pipeline>()
            .map_err(|_| ConfigurationError::Pipeline {
                details: "Failed to downcast to Pipeline".to_string(),
            })?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| ConfigurationError::Pipeline {
                details: "Failed to get appsink element".to_string(),
            })?
            .downcast::<AppSink>()
            .map_err(|_| ConfigurationError::Pipeline {
                details: "Failed to downcast to AppSink".to_string(),
            })?;

        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| ConfigurationError::Device {
                device: device.clone(),
                details: format!("Failed to start pipeline: {}", e),
            })?;

        info!("GStreamer pipeline started for {}", device);
        self.pipeline = Some(pipeline);
        self.appsink = Some(appsink);
        self.camera_index = Some(camera_index);
        Ok(())
    }

    async fn grab(&mut self, timeout: Duration) -> Result<Frame, AcquisitionError> {
        let camera_index = self.camera_index.ok_or_else(|| AcquisitionError::Stream {
            details: "GStreamer source is not open".to_string(),
        })?;
        let appsink = self.appsink.clone().ok_or_else(|| AcquisitionError::Stream {
            details: "Pipeline not initialized".to_string(),
        })?;

        let frame_id = self.frame_counter;
        let format = self.format;
        let timeout_ms = timeout.as_millis() as u64;

        let pulled = tokio::task::spawn_blocking(move || {
            appsink
                .try_pull_sample(gstreamer::ClockTime::from_mseconds(timeout_ms))
                .map(|sample| Self::sample_to_frame(&sample, frame_id, format))
        })
        .await
        .map_err(|e| AcquisitionError::Stream {
            details: format!("Capture task failed: {}", e),
        })?;

        match pulled {
            Some(frame) => {
                self.frame_counter += 1;
                Ok(Frame::new(frame?))
            }
            None => Err(AcquisitionError::Timeout {
                camera_index,
                timeout_ms,
            }),
        }
    }

    async fn close(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            debug!("Stopping GStreamer pipeline");
            if let Err(e) = pipeline.set_state(gstreamer::State::Null) {
                warn!("Failed to stop GStreamer pipeline cleanly: {}", e);
            }
        }
        self.appsink = None;
        self.camera_index = None;
    }
}

impl Drop for GStreamerSource {
    fn drop(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            let _ = pipeline.set_state(gstreamer::State::Null);
        }
    }
}
