use image::GrayImage;
use imageproc::filter::gaussian_blur_f32;
use tracing::{debug, trace};

use super::{motion_confidence, MotionModel, MOTION_LABEL};
use crate::event::{BoundingBox, Detection};

const BLUR_SIGMA: f32 = 1.0;

/// Mean squared pixel difference against the previous frame
pub struct PixelDifferenceModel {
    min_diff: f64,
    delta_threshold: u8,
    blur: bool,
    previous: Option<GrayImage>,
}

impl PixelDifferenceModel {
    pub fn new(min_diff: f64, delta_threshold: u8, blur: bool) -> Self {
        Self {
            min_diff,
            delta_threshold,
            blur,
            previous: None,
        }
    }

    /// Mean squared difference plus the extent of pixels whose delta exceeds
    /// the threshold, as (x0, y0, x1, y1) inclusive
    fn compare(&self, previous: &GrayImage, current: &GrayImage) -> (f64, Option<(u32, u32, u32, u32)>) {
        let mut sum_sq = 0u64;
        let mut extent: Option<(u32, u32, u32, u32)> = None;

        for (x, y, cur) in current.enumerate_pixels() {
            let prev = previous.get_pixel(x, y)[0];
            let delta = (cur[0] as i32 - prev as i32).unsigned_abs();
            sum_sq += (delta * delta) as u64;
            if delta > self.delta_threshold as u32 {
                extent = Some(match extent {
                    None => (x, y, x, y),
                    Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
                });
            }
        }

        let pixels = (current.width() as u64 * current.height() as u64).max(1);
        (sum_sq as f64 / pixels as f64, extent)
    }
}

impl MotionModel for PixelDifferenceModel {
    fn name(&self) -> &'static str {
        "pixel_difference"
    }

    fn observe(&mut self, frame: &GrayImage) -> Vec<Detection> {
        let current = if self.blur {
            gaussian_blur_f32(frame, BLUR_SIGMA)
        } else {
            frame.clone()
        };

        let previous = match self.previous.take() {
            Some(prev) if prev.dimensions() == current.dimensions() => prev,
            _ => {
                debug!(
                    "Pixel reference primed at {}x{}",
                    current.width(),
                    current.height()
                );
                self.previous = Some(current);
                return Vec::new();
            }
        };

        let (mse, extent) = self.compare(&previous, &current);
        trace!("Mean squared difference {:.2} (trigger {:.2})", mse, self.min_diff);

        let (width, height) = current.dimensions();
        self.previous = Some(current);

        if mse <= self.min_diff {
            return Vec::new();
        }

        let bbox = match extent {
            Some((x0, y0, x1, y1)) => BoundingBox::from_pixels(x0, y0, x1, y1, width, height),
            None => BoundingBox::full_frame(),
        };
        vec![Detection::new(
            MOTION_LABEL,
            motion_confidence(mse, self.min_diff),
            bbox,
        )]
    }
}
