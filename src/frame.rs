use std::borrow::Cow;
use std::sync::Arc;
use std::time::SystemTime;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, GrayImage, Luma, RgbImage};
use serde::{Deserialize, Serialize};

use crate::config::ProcessStream;
use crate::error::FrameError;

/// Frame format enumeration supporting different video formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameFormat {
    /// Motion JPEG format - compressed JPEG frames
    Mjpeg,
    /// YUV 4:2:2 format - uncompressed YUV data
    Yuyv,
    /// RGB24 format - uncompressed RGB data
    Rgb24,
    /// Single channel luma, one byte per pixel
    Gray8,
}

impl FrameFormat {
    /// Get bytes per pixel for the format
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            FrameFormat::Mjpeg => 0, // Variable size, compressed
            FrameFormat::Yuyv => 2,
            FrameFormat::Rgb24 => 3,
            FrameFormat::Gray8 => 1,
        }
    }

    /// Check if format is compressed
    pub fn is_compressed(&self) -> bool {
        matches!(self, FrameFormat::Mjpeg)
    }

    /// Parse a configured format name ("MJPG", "YUYV", "RGB", "GRAY8")
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "MJPG" | "MJPEG" | "JPEG" => Some(FrameFormat::Mjpeg),
            "YUYV" | "YUY2" => Some(FrameFormat::Yuyv),
            "RGB" | "RGB24" | "RGB3" => Some(FrameFormat::Rgb24),
            "GRAY8" | "GREY" | "GRAY" => Some(FrameFormat::Gray8),
            _ => None,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            FrameFormat::Mjpeg => "MJPEG",
            FrameFormat::Yuyv => "YUYV",
            FrameFormat::Rgb24 => "RGB24",
            FrameFormat::Gray8 => "GRAY8",
        }
    }
}

/// Rotation options for frame processing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rotation {
    /// Rotate 90 degrees clockwise
    Rotate90,
    /// Rotate 180 degrees
    Rotate180,
    /// Rotate 270 degrees clockwise (90 degrees counter-clockwise)
    Rotate270,
}

impl Rotation {
    /// Get rotation angle in degrees
    pub fn degrees(&self) -> u16 {
        match self {
            Rotation::Rotate90 => 90,
            Rotation::Rotate180 => 180,
            Rotation::Rotate270 => 270,
        }
    }

    fn apply(&self, image: DynamicImage) -> DynamicImage {
        match self {
            Rotation::Rotate90 => image.rotate90(),
            Rotation::Rotate180 => image.rotate180(),
            Rotation::Rotate270 => image.rotate270(),
        }
    }
}

/// Frame data structure containing raw frame data and metadata
#[derive(Debug, Clone)]
pub struct FrameData {
    /// Per-source frame sequence number
    pub id: u64,
    /// Timestamp when frame was captured
    pub timestamp: SystemTime,
    /// Raw frame data (shared ownership for efficiency)
    pub data: Arc<Vec<u8>>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Frame format
    pub format: FrameFormat,
}

impl FrameData {
    pub fn new(
        id: u64,
        timestamp: SystemTime,
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: FrameFormat,
    ) -> Self {
        Self {
            id,
            timestamp,
            data: Arc::new(data),
            width,
            height,
            format,
        }
    }

    pub fn from_gray(id: u64, timestamp: SystemTime, image: GrayImage) -> Self {
        let (width, height) = image.dimensions();
        Self::new(id, timestamp, image.into_raw(), width, height, FrameFormat::Gray8)
    }

    pub fn from_rgb(id: u64, timestamp: SystemTime, image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self::new(id, timestamp, image.into_raw(), width, height, FrameFormat::Rgb24)
    }

    /// Get the expected frame size for uncompressed formats
    pub fn expected_size(&self) -> Option<usize> {
        if self.format.is_compressed() {
            None
        } else {
            Some(self.width as usize * self.height as usize * self.format.bytes_per_pixel())
        }
    }

    /// Exact size match; decoding itself tolerates trailing stride padding
    #[cfg(test)]
    pub fn validate_size(&self) -> bool {
        match self.expected_size() {
            Some(expected) => self.data.len() == expected,
            None => true,
        }
    }

    fn check_size(&self) -> Result<(), FrameError> {
        match self.expected_size() {
            Some(expected) if self.data.len() < expected => Err(FrameError::InvalidSize {
                expected,
                actual: self.data.len(),
            }),
            _ => Ok(()),
        }
    }

    fn decode(&self) -> Result<DynamicImage, FrameError> {
        image::load_from_memory(&self.data).map_err(|e| FrameError::Decode {
            format: self.format.label().to_string(),
            details: e.to_string(),
        })
    }

    /// Convert to an 8-bit grayscale image
    pub fn to_gray_image(&self) -> Result<GrayImage, FrameError> {
        self.check_size()?;
        match self.format {
            FrameFormat::Mjpeg => Ok(self.decode()?.to_luma8()),
            FrameFormat::Gray8 => self.raw_gray(),
            FrameFormat::Rgb24 => {
                let rgb = self.raw_rgb()?;
                let mut gray = GrayImage::new(self.width, self.height);
                for (x, y, px) in rgb.enumerate_pixels() {
                    let value =
                        (0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32) as u8;
                    gray.put_pixel(x, y, Luma([value]));
                }
                Ok(gray)
            }
            FrameFormat::Yuyv => {
                // Y0 U Y1 V: luma is every other byte
                let mut gray = GrayImage::new(self.width, self.height);
                for y in 0..self.height {
                    for x in 0..(self.width / 2) {
                        let base = ((y * self.width / 2 + x) * 4) as usize;
                        gray.put_pixel(x * 2, y, Luma([self.data[base]]));
                        gray.put_pixel(x * 2 + 1, y, Luma([self.data[base + 2]]));
                    }
                }
                Ok(gray)
            }
        }
    }

    /// Convert to an RGB image, expanding luma and YUYV as needed
    pub fn to_rgb_image(&self) -> Result<RgbImage, FrameError> {
        self.check_size()?;
        match self.format {
            FrameFormat::Mjpeg => Ok(self.decode()?.to_rgb8()),
            FrameFormat::Rgb24 => self.raw_rgb(),
            FrameFormat::Gray8 => Ok(DynamicImage::ImageLuma8(self.raw_gray()?).to_rgb8()),
            FrameFormat::Yuyv => {
                let mut rgb = RgbImage::new(self.width, self.height);
                for y in 0..self.height {
                    for x in 0..(self.width / 2) {
                        let base = ((y * self.width / 2 + x) * 4) as usize;
                        let u = self.data[base + 1];
                        let v = self.data[base + 3];
                        rgb.put_pixel(x * 2, y, image::Rgb(yuv_to_rgb(self.data[base], u, v)));
                        rgb.put_pixel(
                            x * 2 + 1,
                            y,
                            image::Rgb(yuv_to_rgb(self.data[base + 2], u, v)),
                        );
                    }
                }
                Ok(rgb)
            }
        }
    }

    fn raw_gray(&self) -> Result<GrayImage, FrameError> {
        let expected = self.width as usize * self.height as usize;
        GrayImage::from_raw(self.width, self.height, self.data[..expected].to_vec()).ok_or(
            FrameError::InvalidSize {
                expected,
                actual: self.data.len(),
            },
        )
    }

    fn raw_rgb(&self) -> Result<RgbImage, FrameError> {
        let expected = self.width as usize * self.height as usize * 3;
        RgbImage::from_raw(self.width, self.height, self.data[..expected].to_vec()).ok_or(
            FrameError::InvalidSize {
                expected,
                actual: self.data.len(),
            },
        )
    }

    /// Grayscale copy reduced by `factor` in each dimension
    pub fn downscale(&self, factor: u32) -> Result<FrameData, FrameError> {
        let gray = self.to_gray_image()?;
        let factor = factor.max(1);
        let width = (self.width / factor).max(1);
        let height = (self.height / factor).max(1);
        let small = if factor == 1 {
            gray
        } else {
            image::imageops::resize(&gray, width, height, FilterType::Triangle)
        };
        Ok(FrameData::from_gray(self.id, self.timestamp, small))
    }

    /// Rotated copy; MJPEG frames come back as RGB24
    pub fn rotated(&self, rotation: Rotation) -> Result<FrameData, FrameError> {
        let image = match self.format {
            FrameFormat::Gray8 => DynamicImage::ImageLuma8(self.raw_gray()?),
            _ => DynamicImage::ImageRgb8(self.to_rgb_image()?),
        };
        let rotated = rotation.apply(image);
        Ok(match rotated {
            DynamicImage::ImageLuma8(gray) => FrameData::from_gray(self.id, self.timestamp, gray),
            other => FrameData::from_rgb(self.id, self.timestamp, other.to_rgb8()),
        })
    }

    /// JPEG bytes for this frame. MJPEG data is passed through untouched.
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, FrameError> {
        match self.format {
            FrameFormat::Mjpeg => Ok(self.data.as_ref().clone()),
            FrameFormat::Gray8 => encode_jpeg_raw(
                self.raw_gray()?.as_raw(),
                self.width,
                self.height,
                ColorType::L8,
                quality,
            ),
            _ => {
                let rgb = self.to_rgb_image()?;
                encode_jpeg_raw(rgb.as_raw(), self.width, self.height, ColorType::Rgb8, quality)
            }
        }
    }
}

/// Encode an RGB image to JPEG
pub fn encode_rgb_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, FrameError> {
    encode_jpeg_raw(
        image.as_raw(),
        image.width(),
        image.height(),
        ColorType::Rgb8,
        quality,
    )
}

fn encode_jpeg_raw(
    data: &[u8],
    width: u32,
    height: u32,
    color: ColorType,
    quality: u8,
) -> Result<Vec<u8>, FrameError> {
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
    encoder
        .encode(data, width, height, color)
        .map_err(|e| FrameError::Encode {
            details: e.to_string(),
        })?;
    Ok(buf)
}

fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = y as f32;
    let u = u as f32 - 128.0;
    let v = v as f32 - 128.0;
    let r = y + 1.402 * v;
    let g = y - 0.344 * u - 0.714 * v;
    let b = y + 1.772 * u;
    [
        r.clamp(0.0, 255.0) as u8,
        g.clamp(0.0, 255.0) as u8,
        b.clamp(0.0, 255.0) as u8,
    ]
}

/// One acquisition: the full-resolution frame plus an optional native low-res companion
#[derive(Debug, Clone)]
pub struct Frame {
    pub main: FrameData,
    pub lores: Option<FrameData>,
}

impl Frame {
    pub fn new(main: FrameData) -> Self {
        Self { main, lores: None }
    }

    pub fn with_lores(main: FrameData, lores: FrameData) -> Self {
        Self {
            main,
            lores: Some(lores),
        }
    }

    /// Frame that should feed the detector for the selected stream
    pub fn for_stream(
        &self,
        stream: ProcessStream,
        lores_scale: u32,
    ) -> Result<Cow<'_, FrameData>, FrameError> {
        match stream {
            ProcessStream::Main => Ok(Cow::Borrowed(&self.main)),
            ProcessStream::Lores => match &self.lores {
                Some(lores) => Ok(Cow::Borrowed(lores)),
                None => Ok(Cow::Owned(self.main.downscale(lores_scale)?)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_frame(width: u32, height: u32, value: u8) -> FrameData {
        FrameData::new(
            1,
            SystemTime::now(),
            vec![value; (width * height) as usize],
            width,
            height,
            FrameFormat::Gray8,
        )
    }

    #[test]
    fn test_frame_format_properties() {
        assert_eq!(FrameFormat::Mjpeg.bytes_per_pixel(), 0);
        assert_eq!(FrameFormat::Yuyv.bytes_per_pixel(), 2);
        assert_eq!(FrameFormat::Rgb24.bytes_per_pixel(), 3);
        assert_eq!(FrameFormat::Gray8.bytes_per_pixel(), 1);

        assert!(FrameFormat::Mjpeg.is_compressed());
        assert!(!FrameFormat::Gray8.is_compressed());

        assert_eq!(FrameFormat::from_name("mjpg"), Some(FrameFormat::Mjpeg));
        assert_eq!(FrameFormat::from_name("YUYV"), Some(FrameFormat::Yuyv));
        assert_eq!(FrameFormat::from_name("H264"), None);
    }

    #[test]
    fn test_frame_size_validation() {
        let valid = FrameData::new(1, SystemTime::now(), vec![0u8; 64 * 48 * 2], 64, 48, FrameFormat::Yuyv);
        assert!(valid.validate_size());

        let short = FrameData::new(2, SystemTime::now(), vec![0u8; 100], 64, 48, FrameFormat::Yuyv);
        assert!(!short.validate_size());
        assert!(matches!(
            short.to_gray_image(),
            Err(FrameError::InvalidSize { .. })
        ));
    }

    #[test]
    fn test_rgb_to_gray_conversion() {
        let frame = FrameData::new(
            1,
            SystemTime::now(),
            vec![200u8; 8 * 4 * 3],
            8,
            4,
            FrameFormat::Rgb24,
        );
        let gray = frame.to_gray_image().unwrap();
        assert_eq!(gray.dimensions(), (8, 4));
        // 0.299 + 0.587 + 0.114 = 1.0, allow for float truncation
        assert!(gray.get_pixel(3, 2)[0] >= 199);
    }

    #[test]
    fn test_downscale_produces_gray_frame() {
        let frame = gray_frame(64, 48, 90);
        let small = frame.downscale(4).unwrap();
        assert_eq!((small.width, small.height), (16, 12));
        assert_eq!(small.format, FrameFormat::Gray8);
        assert!(small.validate_size());
    }

    #[test]
    fn test_jpeg_round_trip_preserves_dimensions() {
        let frame = gray_frame(32, 24, 128);
        let jpeg = frame.encode_jpeg(85).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let decoded = FrameData::new(2, SystemTime::now(), jpeg, 32, 24, FrameFormat::Mjpeg);
        let gray = decoded.to_gray_image().unwrap();
        assert_eq!(gray.dimensions(), (32, 24));
    }

    #[test]
    fn test_rotation_swaps_dimensions() {
        let frame = gray_frame(32, 24, 10);
        let rotated = frame.rotated(Rotation::Rotate90).unwrap();
        assert_eq!((rotated.width, rotated.height), (24, 32));
        assert_eq!(Rotation::Rotate270.degrees(), 270);
    }

    #[test]
    fn test_stream_selection() {
        let main = gray_frame(64, 48, 50);
        let frame = Frame::new(main.clone());
        assert_eq!(frame.for_stream(ProcessStream::Main, 4).unwrap().width, 64);
        assert_eq!(frame.for_stream(ProcessStream::Lores, 4).unwrap().width, 16);

        let native = Frame::with_lores(main, gray_frame(20, 15, 50));
        assert_eq!(native.for_stream(ProcessStream::Lores, 4).unwrap().width, 20);
    }
}
