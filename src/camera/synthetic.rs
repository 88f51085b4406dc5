use async_trait::async_trait;
use image::{GrayImage, Luma};
use std::time::{Duration, SystemTime};
use tracing::{info, trace};

use super::source::FrameSource;
use crate::error::{AcquisitionError, ConfigurationError};
use crate::frame::{Frame, FrameData};

/// Test-pattern source used when no camera hardware is present.
///
/// Produces a static gradient; every `motion_period` frames a bright square is
/// drawn at a position that moves with the frame counter.
pub struct SyntheticSource {
    width: u32,
    height: u32,
    motion_period: u64,
    frame_counter: u64,
    camera_index: Option<u32>,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            motion_period: 10,
            frame_counter: 0,
            camera_index: None,
        }
    }

    pub fn with_motion_period(mut self, period: u64) -> Self {
        self.motion_period = period;
        self
    }

    fn render(&self, frame_id: u64) -> GrayImage {
        let mut image = GrayImage::from_fn(self.width, self.height, |x, y| {
            Luma([(((x + y) * 64) / (self.width + self.height).max(1)) as u8 + 32])
        });

        if self.motion_period > 0 && frame_id > 0 && frame_id % self.motion_period == 0 {
            let side = (self.width.min(self.height) / 4).max(1);
            let span = self.width.saturating_sub(side).max(1);
            let x0 = ((frame_id / self.motion_period) * side as u64 % span as u64) as u32;
            let y0 = (self.height - side) / 2;
            for y in y0..(y0 + side).min(self.height) {
                for x in x0..(x0 + side).min(self.width) {
                    image.put_pixel(x, y, Luma([250]));
                }
            }
        }

        image
    }
}

#[async_trait]
impl FrameSource for SyntheticSource {
    fn kind(&self) -> &'static str {
        "synthetic"
    }

    async fn open(&mut self, camera_index: u32) -> Result<(), ConfigurationError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigurationError::UnsupportedResolution {
                width: self.width,
                height: self.height,
            });
        }
        self.camera_index = Some(camera_index);
        info!(
            "Synthetic source opened for camera {} ({}x{})",
            camera_index, self.width, self.height
        );
        Ok(())
    }

    async fn grab(&mut self, _timeout: Duration) -> Result<Frame, AcquisitionError> {
        if self.camera_index.is_none() {
            return Err(AcquisitionError::Stream {
                details: "synthetic source is not open".to_string(),
            });
        }

        let frame_id = self.frame_counter;
        self.frame_counter += 1;

        let image = self.render(frame_id);
        trace!("Generated synthetic frame {}", frame_id);
        Ok(Frame::new(FrameData::from_gray(
            frame_id,
            SystemTime::now(),
            image,
        )))
    }

    async fn close(&mut self) {
        self.camera_index = None;
    }
}
