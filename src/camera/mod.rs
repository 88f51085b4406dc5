mod builder;
mod directory;
#[cfg(all(target_os = "linux", feature = "camera"))]
mod v4l2;
mod session;
mod source;
mod synthetic;

pub use builder::CameraSessionBuilder;
pub use directory::DirectorySource;
#[cfg(all(target_os = "linux", feature = "camera"))]
pub use v4l2::GStreamerSource;
pub use session::CameraSession;
pub use source::{CameraHandle, FrameSource};
pub use synthetic::SyntheticSource;
