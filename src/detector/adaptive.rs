use image::{GrayImage, Luma};
use imageproc::filter::{box_filter, gaussian_blur_f32};
use imageproc::map::map_colors2;
use tracing::{debug, trace};

use super::{motion_confidence, MotionModel, MOTION_LABEL};
use crate::event::{BoundingBox, Detection};

const BLUR_SIGMA: f32 = 1.0;
/// Neighbourhood radius for the local mean (5x5 block)
const BLOCK_RADIUS: u32 = 2;
/// A pixel counts as changed when its delta exceeds the local mean by this much
const MEAN_OFFSET: u8 = 2;

/// Frame delta thresholded against its own local mean. Triggers on the
/// percentage of changed pixels, so it tolerates global brightness drift
/// better than a fixed threshold.
pub struct AdaptiveThresholdModel {
    min_percent: f64,
    blur: bool,
    previous: Option<GrayImage>,
}

impl AdaptiveThresholdModel {
    pub fn new(min_percent: f64, blur: bool) -> Self {
        Self {
            min_percent,
            blur,
            previous: None,
        }
    }

    /// Percentage of changed pixels and their extent (x0, y0, x1, y1)
    fn changed(&self, previous: &GrayImage, current: &GrayImage) -> (f64, Option<(u32, u32, u32, u32)>) {
        let diff = map_colors2(previous, current, |p, c| Luma([p[0].abs_diff(c[0])]));
        let local_mean = box_filter(&diff, BLOCK_RADIUS, BLOCK_RADIUS);

        let mut changed = 0u64;
        let mut extent: Option<(u32, u32, u32, u32)> = None;
        for (x, y, delta) in diff.enumerate_pixels() {
            let mean = local_mean.get_pixel(x, y)[0];
            if delta[0] > mean.saturating_add(MEAN_OFFSET) {
                changed += 1;
                extent = Some(match extent {
                    None => (x, y, x, y),
                    Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
                });
            }
        }

        let pixels = (diff.width() as u64 * diff.height() as u64).max(1);
        (changed as f64 * 100.0 / pixels as f64, extent)
    }
}

impl MotionModel for AdaptiveThresholdModel {
    fn name(&self) -> &'static str {
        "adaptive_threshold"
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
                    "Adaptive reference primed at {}x{}",
                    current.width(),
                    current.height()
                );
                self.previous = Some(current);
                return Vec::new();
            }
        };

        let (percent, extent) = self.changed(&previous, &current);
        trace!("Changed pixels {:.3}% (trigger {:.3}%)", percent, self.min_percent);

        let (width, height) = current.dimensions();
        self.previous = Some(current);

        match extent {
            Some((x0, y0, x1, y1)) if percent > self.min_percent => vec![Detection::new(
                MOTION_LABEL,
                motion_confidence(percent, self.min_percent),
                BoundingBox::from_pixels(x0, y0, x1, y1, width, height),
            )],
            _ => Vec::new(),
        }
    }
}
