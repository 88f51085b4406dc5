use async_trait::async_trait;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info};

use super::source::FrameSource;
use crate::error::{AcquisitionError, ConfigurationError};
use crate::frame::{Frame, FrameData, FrameFormat};

const REPLAY_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Replays image files from a directory in file-name order
pub struct DirectorySource {
    dir: PathBuf,
    loop_playback: bool,
    files: Vec<PathBuf>,
    position: usize,
    frame_counter: u64,
    camera_index: Option<u32>,
}

impl DirectorySource {
    pub fn new<P: AsRef<Path>>(dir: P, loop_playback: bool) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            loop_playback,
            files: Vec::new(),
            position: 0,
            frame_counter: 0,
            camera_index: None,
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    async fn scan(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| REPLAY_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if is_image {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn load(&self, path: &Path, bytes: Vec<u8>) -> Result<FrameData, AcquisitionError> {
        let stream_error = |e: image::ImageError| AcquisitionError::Stream {
            details: format!("{}: {}", path.display(), e),
        };
        let reader = image::io::Reader::new(Cursor::new(&bytes))
            .with_guessed_format()
            .map_err(|e| AcquisitionError::Stream {
                details: format!("{}: {}", path.display(), e),
            })?;

        if reader.format() == Some(image::ImageFormat::Jpeg) {
            let (width, height) = reader.into_dimensions().map_err(stream_error)?;
            return Ok(FrameData::new(
                self.frame_counter,
                SystemTime::now(),
                bytes,
                width,
                height,
                FrameFormat::Mjpeg,
            ));
        }

        let image = reader.decode().map_err(stream_error)?;
        Ok(FrameData::from_rgb(
            self.frame_counter,
            SystemTime::now(),
            image.to_rgb8(),
        ))
    }
}

#[async_trait]
impl FrameSource for DirectorySource {
    fn kind(&self) -> &'static str {
        "directory"
    }

    async fn open(&mut self, camera_index: u32) -> Result<(), ConfigurationError> {
        let files = self.scan().await.map_err(|e| ConfigurationError::Device {
            device: self.dir.display().to_string(),
            details: e.to_string(),
        })?;

        if files.is_empty() {
            return Err(ConfigurationError::Device {
                device: self.dir.display().to_string(),
                details: "no .jpg/.jpeg/.png files to replay".to_string(),
            });
        }

        info!(
            "Replaying {} images from {} for camera {}",
            files.len(),
            self.dir.display(),
            camera_index
        );
        self.files = files;
        self.position = 0;
        self.camera_index = Some(camera_index);
        Ok(())
    }

    async fn grab(&mut self, _timeout: Duration) -> Result<Frame, AcquisitionError> {
        let camera_index = self.camera_index.ok_or_else(|| AcquisitionError::Stream {
            details: "directory source is not open".to_string(),
        })?;

        if self.position >= self.files.len() {
            if self.loop_playback && !self.files.is_empty() {
                debug!("Replay of {} wrapped around", self.dir.display());
                self.position = 0;
            } else {
                return Err(AcquisitionError::Exhausted { camera_index });
            }
        }

        let path = self.files[self.position].clone();
        self.position += 1;

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| AcquisitionError::Stream {
                details: format!("{}: {}", path.display(), e),
            })?;
        let frame = self.load(&path, bytes)?;
        self.frame_counter += 1;

        debug!("Replayed {} as frame {}", path.display(), frame.id);
        Ok(Frame::new(frame))
    }

    async fn close(&mut self) {
        self.camera_index = None;
        self.position = 0;
    }
}
