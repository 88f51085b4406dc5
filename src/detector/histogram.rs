use image::GrayImage;
use imageproc::filter::gaussian_blur_f32;
use tracing::{debug, trace};

use super::{motion_confidence, MotionModel, MOTION_LABEL};
use crate::event::{BoundingBox, Detection};

const BINS: usize = 256;
const BLUR_SIGMA: f32 = 1.0;

/// Compares 256-bin luma histograms of consecutive frames
pub struct HistogramModel {
    min_diff: f64,
    blur: bool,
    previous: Option<[u32; BINS]>,
}

impl HistogramModel {
    pub fn new(min_diff: f64, blur: bool) -> Self {
        Self {
            min_diff,
            blur,
            previous: None,
        }
    }

    fn histogram(image: &GrayImage) -> [u32; BINS] {
        let mut bins = [0u32; BINS];
        for pixel in image.pixels() {
            bins[pixel[0] as usize] += 1;
        }
        bins
    }

    /// Mean absolute bin difference
    pub fn difference(current: &[u32; BINS], previous: &[u32; BINS]) -> f64 {
        let total: u64 = current
            .iter()
            .zip(previous.iter())
            .map(|(&c, &p)| (c as i64 - p as i64).unsigned_abs())
            .sum();
        total as f64 / BINS as f64
    }
}

impl MotionModel for HistogramModel {
    fn name(&self) -> &'static str {
        "histogram"
    }

    fn observe(&mut self, frame: &GrayImage) -> Vec<Detection> {
        let current = if self.blur {
            Self::histogram(&gaussian_blur_f32(frame, BLUR_SIGMA))
        } else {
            Self::histogram(frame)
        };

        let Some(previous) = self.previous.replace(current) else {
            debug!("Histogram reference primed");
            return Vec::new();
        };

        let diff = Self::difference(&current, &previous);
        trace!("Histogram difference {:.2} (trigger {:.2})", diff, self.min_diff);

        if diff > self.min_diff {
            vec![Detection::new(
                MOTION_LABEL,
                motion_confidence(diff, self.min_diff),
                BoundingBox::full_frame(),
            )]
        } else {
            Vec::new()
        }
    }
}
