use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use rusttype::{Font, Scale};
use std::path::Path;

use crate::error::PersistenceError;
use crate::event::Detection;

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// Font loaded once for timestamp text
pub struct TimestampFont {
    font: Font<'static>,
    size: f32,
}

impl TimestampFont {
    pub fn load<P: AsRef<Path>>(path: P, size: f32) -> Result<Self, PersistenceError> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| PersistenceError::Metadata {
            details: format!("Failed to read font file '{}': {}", path.display(), e),
        })?;
        let font = Font::try_from_vec(data).ok_or_else(|| PersistenceError::Metadata {
            details: format!("Failed to parse font file '{}'", path.display()),
        })?;
        Ok(Self { font, size })
    }

    /// Draw `text` bottom-left on a darkened backing box
    pub fn draw(&self, image: &mut RgbImage, text: &str) {
        let scale = Scale::uniform(self.size);
        let x: u32 = 10;
        let y: u32 = image.height().saturating_sub((self.size * 1.5) as u32);
        let (text_width, text_height) = text_size(scale, &self.font, text);

        for dy in 0..(text_height.max(0) as u32 + 10) {
            for dx in 0..(text_width.max(0) as u32 + 10) {
                let px = x.saturating_sub(5) + dx;
                let py = y.saturating_sub(5) + dy;
                if px < image.width() && py < image.height() {
                    let p = image.get_pixel(px, py);
                    image.put_pixel(px, py, Rgb([p[0] / 3, p[1] / 3, p[2] / 3]));
                }
            }
        }

        draw_text_mut(
            image,
            TEXT_COLOR,
            x as i32,
            y as i32,
            scale,
            &self.font,
            text,
        );
    }
}

/// Outline every detection box
pub fn draw_detections(image: &mut RgbImage, detections: &[Detection]) {
    let (width, height) = image.dimensions();
    for detection in detections {
        let (x, y, w, h) = detection.bbox.to_pixels(width, height);
        draw_hollow_rect_mut(image, Rect::at(x, y).of_size(w, h), BOX_COLOR);
        // Second outline one pixel in for visibility on large frames
        if w > 2 && h > 2 {
            draw_hollow_rect_mut(image, Rect::at(x + 1, y + 1).of_size(w - 2, h - 2), BOX_COLOR);
        }
    }
}
