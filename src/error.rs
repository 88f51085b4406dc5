use thiserror::Error;

#[derive(Error, Debug)]
pub enum SentryError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] toml::de::Error),

    #[error("Camera configuration error: {0}")]
    CameraConfiguration(#[from] ConfigurationError),

    #[error("Frame acquisition error: {0}")]
    Acquisition(#[from] AcquisitionError),

    #[error("Detection fault: {0}")]
    Detection(#[from] DetectionFault),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Presence sensor error: {0}")]
    Presence(#[from] PresenceError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl SentryError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Camera or model setup failures. Fatal at startup only.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Unsupported resolution {width}x{height}")]
    UnsupportedResolution { width: u32, height: u32 },

    #[error("Unsupported frame format '{format}'")]
    UnsupportedFormat { format: String },

    #[error("Camera device {device} unavailable: {details}")]
    Device { device: String, details: String },

    #[error("Capture pipeline setup failed: {details}")]
    Pipeline { details: String },

    #[error("Object model '{path}' unusable: {details}")]
    Model { path: String, details: String },
}

/// Frame source failures. Recovered by skipping the tick.
#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("Camera handle for camera {camera_index} is not open")]
    InvalidHandle { camera_index: u32 },

    #[error("No frame from camera {camera_index} within {timeout_ms} ms")]
    Timeout { camera_index: u32, timeout_ms: u64 },

    #[error("Capture stream error: {details}")]
    Stream { details: String },

    #[error("Frame source for camera {camera_index} has no more frames")]
    Exhausted { camera_index: u32 },
}

/// Pixel buffer conversion failures shared by detectors and sinks.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Failed to decode {format} frame: {details}")]
    Decode { format: String, details: String },

    #[error("Frame buffer holds {actual} bytes, expected {expected}")]
    InvalidSize { expected: usize, actual: usize },

    #[error("Failed to encode frame: {details}")]
    Encode { details: String },
}

/// Anything going wrong inside a detector. Recovered as "no detections".
#[derive(Error, Debug)]
pub enum DetectionFault {
    #[error("Frame processing failed: {details}")]
    FrameProcessing { details: String },

    #[error("Detector {detector} panicked: {message}")]
    Panicked { detector: String, message: String },

    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Encoding or filesystem failures while saving a frame.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Failed to encode frame: {details}")]
    Encode { details: String },

    #[error("Failed to create directory {path}: {source}")]
    DirectoryCreation {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Metadata error: {details}")]
    Metadata { details: String },

    #[error(transparent)]
    Frame(#[from] FrameError),
}

#[derive(Error, Debug)]
pub enum PresenceError {
    #[error("Failed to read presence sensor {device}: {source}")]
    Read {
        device: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unexpected value '{value}' from presence sensor {device}")]
    InvalidValue { device: String, value: String },
}

pub type Result<T> = std::result::Result<T, SentryError>;
