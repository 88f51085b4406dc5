use image::{GrayImage, ImageBuffer, Luma};
use imageproc::{
    contrast::threshold,
    distance_transform::Norm,
    filter::gaussian_blur_f32,
    morphology::{dilate, erode},
    region_labelling::{connected_components, Connectivity},
};
use std::collections::HashMap;
use tracing::{debug, info};

use super::{motion_confidence, MotionModel, MOTION_LABEL};
use crate::event::{BoundingBox, Detection};

const BLUR_SIGMA: f32 = 2.0;
const LEARNING_RATE: f32 = 0.05;
const KERNEL_SIZE: u8 = 3;

/// Pixel count and inclusive extent of one labelled region
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub area: u32,
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

/// Background-subtraction motion model.
///
/// Keeps a running-average background, thresholds the absolute difference,
/// cleans the mask with erode/dilate and reports every 8-connected region at
/// least `minimum_area` pixels large, biggest first.
pub struct ContourModel {
    delta_threshold: u8,
    minimum_area: f64,
    background: Option<GrayImage>,
    frame_count: u64,
}

impl ContourModel {
    pub fn new(delta_threshold: u8, minimum_area: f64) -> Self {
        Self {
            delta_threshold,
            minimum_area,
            background: None,
            frame_count: 0,
        }
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn frame_difference(background: &GrayImage, current: &GrayImage) -> GrayImage {
        let (width, height) = background.dimensions();
        let mut diff = GrayImage::new(width, height);
        for (x, y, bg) in background.enumerate_pixels() {
            let cur = current.get_pixel(x, y);
            diff.put_pixel(x, y, Luma([(bg[0] as i16 - cur[0] as i16).unsigned_abs() as u8]));
        }
        diff
    }

    /// Regions of a labelled image, keyed by label
    pub fn regions(components: &ImageBuffer<Luma<u32>, Vec<u32>>) -> Vec<Region> {
        let mut regions: HashMap<u32, Region> = HashMap::new();
        for (x, y, label) in components.enumerate_pixels() {
            let id = label[0];
            if id == 0 {
                continue;
            }
            regions
                .entry(id)
                .and_modify(|r| {
                    r.area += 1;
                    r.x0 = r.x0.min(x);
                    r.y0 = r.y0.min(y);
                    r.x1 = r.x1.max(x);
                    r.y1 = r.y1.max(y);
                })
                .or_insert(Region {
                    area: 1,
                    x0: x,
                    y0: y,
                    x1: x,
                    y1: y,
                });
        }
        regions.into_values().collect()
    }

    fn update_background(&mut self, current: &GrayImage) {
        if let Some(ref mut background) = self.background {
            for (bg, cur) in background.pixels_mut().zip(current.pixels()) {
                let value = bg[0] as f32 * (1.0 - LEARNING_RATE) + cur[0] as f32 * LEARNING_RATE;
                bg[0] = value as u8;
            }
        }
    }
}

impl MotionModel for ContourModel {
    fn name(&self) -> &'static str {
        "contour"
    }

    fn observe(&mut self, frame: &GrayImage) -> Vec<Detection> {
        let blurred = gaussian_blur_f32(frame, BLUR_SIGMA);

        let primed = matches!(&self.background, Some(bg) if bg.dimensions() == blurred.dimensions());
        if !primed {
            info!(
                "Initializing background model at {}x{}",
                blurred.width(),
                blurred.height()
            );
            self.background = Some(blurred);
            self.frame_count = 1;
            return Vec::new();
        }

        let mask = match &self.background {
            Some(background) => threshold(
                &Self::frame_difference(background, &blurred),
                self.delta_threshold,
            ),
            None => return Vec::new(),
        };
        let cleaned = dilate(
            &erode(&mask, Norm::LInf, KERNEL_SIZE),
            Norm::LInf,
            KERNEL_SIZE,
        );
        let components = connected_components(&cleaned, Connectivity::Eight, Luma([0u8]));

        let mut regions: Vec<Region> = Self::regions(&components)
            .into_iter()
            .filter(|r| r.area as f64 >= self.minimum_area)
            .collect();
        regions.sort_by(|a, b| b.area.cmp(&a.area));

        self.update_background(&blurred);
        self.frame_count += 1;

        let (width, height) = blurred.dimensions();
        debug!(
            "Contour analysis: {} regions over {:.0} px (largest {})",
            regions.len(),
            self.minimum_area,
            regions.first().map(|r| r.area).unwrap_or(0)
        );

        regions
            .into_iter()
            .map(|r| {
                Detection::new(
                    MOTION_LABEL,
                    motion_confidence(r.area as f64, self.minimum_area),
                    BoundingBox::from_pixels(r.x0, r.y0, r.x1, r.y1, width, height),
                )
            })
            .collect()
    }
}
