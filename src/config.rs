use config::{Config, ConfigError, Environment, File};

pub use crate::frame::Rotation;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SentryConfig {
    pub node: NodeConfig,
    pub camera: CameraConfig,
    pub detector: DetectorConfig,
    pub capture: CaptureConfig,
    pub pir: PirConfig,
    pub stats: StatsConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NodeConfig {
    /// Device identity used in filenames and embedded metadata
    #[serde(default = "default_node_name")]
    pub name: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Camera indices to sample each tick (e.g. 0 for /dev/video0)
    #[serde(default = "default_camera_indices")]
    pub indices: Vec<u32>,

    /// Where frames come from
    #[serde(default = "default_camera_source")]
    pub source: CameraSourceKind,

    /// Capture resolution (width, height)
    #[serde(default = "default_camera_resolution")]
    pub resolution: (u32, u32),

    /// Frames per second requested from the sensor
    #[serde(default = "default_camera_fps")]
    pub fps: u32,

    /// Video format (MJPG, YUYV, RGB, GRAY8)
    #[serde(default = "default_camera_format")]
    pub format: String,

    /// Upper bound on a single frame acquisition
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,

    /// Directory of images replayed by the `directory` source
    #[serde(default = "default_replay_dir")]
    pub replay_dir: String,

    /// Restart the replay from the first image once exhausted
    #[serde(default = "default_replay_loop")]
    pub replay_loop: bool,

    /// Sensor rotation applied before frames reach the detector
    pub rotation: Option<Rotation>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DetectorConfig {
    /// Detection algorithm
    #[serde(default = "default_detector_kind")]
    pub kind: DetectorKind,

    /// Detections below this confidence are dropped
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,

    /// Class labels that never count as a detection
    #[serde(default)]
    pub ignored_labels: Vec<String>,

    /// Which acquired stream feeds the detector
    #[serde(default = "default_process_stream")]
    pub process_stream: ProcessStream,

    /// Downscale divisor used when the lores stream has to be derived from main
    #[serde(default = "default_lores_scale")]
    pub lores_scale: u32,

    /// Blur frames before comparing them
    #[serde(default = "default_blur")]
    pub blur: bool,

    /// Mean absolute histogram bin difference that counts as motion
    #[serde(default = "default_histogram_min_diff")]
    pub histogram_min_diff: f64,

    /// Mean squared pixel difference that counts as motion
    #[serde(default = "default_pixel_min_diff")]
    pub pixel_min_diff: f64,

    /// Percentage of locally changed pixels that counts as motion
    #[serde(default = "default_adaptive_min_percent")]
    pub adaptive_min_percent: f64,

    /// Per-pixel delta considered changed
    #[serde(default = "default_delta_threshold")]
    pub delta_threshold: u8,

    /// Minimum connected area (pixels) reported by the contour detector
    #[serde(default = "default_contour_area")]
    pub contour_minimum_area: f64,

    /// ONNX model run by the object detector
    pub object_model_path: Option<String>,

    /// Class labels file, one `<id> <label>` per line
    pub object_labels_path: Option<String>,

    /// Square input edge the object model expects
    #[serde(default = "default_object_input_size")]
    pub object_input_size: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CaptureConfig {
    /// Normal sleep between ticks
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Ticks that stay in burst mode after the last positive tick
    #[serde(default = "default_burst_length")]
    pub burst_length: u32,

    /// How a positive tick during a burst affects the remaining ticks
    #[serde(default = "default_burst_policy")]
    pub burst_policy: BurstPolicy,

    /// Sleep between ticks while burst mode is active
    #[serde(default = "default_burst_interval_ms")]
    pub burst_interval_ms: u64,

    /// Save a frame anyway once this long has passed without a save
    #[serde(default = "default_max_silence_seconds")]
    pub max_silence_seconds: u64,

    /// Directory receiving saved frames and stats files
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Persist qualifying frames
    #[serde(default = "default_save_enabled")]
    pub save_enabled: bool,

    /// JPEG quality (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Timezone used for filenames and overlays
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Write a JSON sidecar next to each saved frame
    #[serde(default = "default_sidecar_metadata")]
    pub sidecar_metadata: bool,

    /// Draw the capture timestamp onto saved frames
    #[serde(default = "default_timestamp_overlay")]
    pub timestamp_overlay: bool,

    /// Path to TrueType font file for timestamp overlay
    #[serde(default = "default_timestamp_font_path")]
    pub timestamp_font_path: String,

    /// Font size for timestamp overlay
    #[serde(default = "default_timestamp_font_size")]
    pub timestamp_font_size: f32,

    /// Draw detection boxes onto saved frames
    #[serde(default = "default_draw_detections")]
    pub draw_detections: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PirConfig {
    /// Poll the PIR sensor
    #[serde(default = "default_pir_enabled")]
    pub enabled: bool,

    /// GPIO value file of the PIR line
    #[serde(default = "default_pir_device")]
    pub device: String,

    /// Treat a low line as presence
    #[serde(default = "default_pir_active_low")]
    pub active_low: bool,

    /// Time between sensor reads
    #[serde(default = "default_pir_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StatsConfig {
    /// Write the periodic stats file
    #[serde(default = "default_stats_enabled")]
    pub enabled: bool,

    /// Seconds between stats lines
    #[serde(default = "default_stats_interval_seconds")]
    pub interval_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CameraSourceKind {
    Gstreamer,
    Synthetic,
    Directory,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    Histogram,
    PixelDifference,
    AdaptiveThreshold,
    Contour,
    Object,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStream {
    Main,
    Lores,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BurstPolicy {
    Reset,
    Accumulate,
}

impl CameraConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

impl CaptureConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn burst_interval(&self) -> Duration {
        Duration::from_millis(self.burst_interval_ms)
    }

    pub fn max_silence(&self) -> Duration {
        Duration::from_secs(self.max_silence_seconds)
    }
}

impl PirConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl SentryConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("sentrycam.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("node.name", default_node_name())?
            .set_default("camera.indices", default_camera_indices())?
            .set_default("camera.source", "synthetic")?
            .set_default(
                "camera.resolution",
                vec![default_camera_resolution().0, default_camera_resolution().1],
            )?
            .set_default("camera.fps", default_camera_fps())?
            .set_default("camera.format", default_camera_format())?
            .set_default(
                "camera.acquire_timeout_ms",
                default_acquire_timeout_ms() as i64,
            )?
            .set_default("camera.replay_dir", default_replay_dir())?
            .set_default("camera.replay_loop", default_replay_loop())?
            .set_default("detector.kind", "histogram")?
            .set_default(
                "detector.confidence_threshold",
                default_confidence_threshold() as f64,
            )?
            .set_default("detector.ignored_labels", Vec::<String>::new())?
            .set_default("detector.process_stream", "lores")?
            .set_default("detector.lores_scale", default_lores_scale())?
            .set_default("detector.blur", default_blur())?
            .set_default("detector.histogram_min_diff", default_histogram_min_diff())?
            .set_default("detector.pixel_min_diff", default_pixel_min_diff())?
            .set_default("detector.adaptive_min_percent", default_adaptive_min_percent())?
            .set_default("detector.delta_threshold", default_delta_threshold() as u32)?
            .set_default("detector.contour_minimum_area", default_contour_area())?
            .set_default("detector.object_input_size", default_object_input_size())?
            .set_default("capture.interval_ms", default_interval_ms() as i64)?
            .set_default("capture.burst_length", default_burst_length())?
            .set_default("capture.burst_policy", "reset")?
            .set_default(
                "capture.burst_interval_ms",
                default_burst_interval_ms() as i64,
            )?
            .set_default(
                "capture.max_silence_seconds",
                default_max_silence_seconds() as i64,
            )?
            .set_default("capture.output_dir", default_output_dir())?
            .set_default("capture.save_enabled", default_save_enabled())?
            .set_default("capture.jpeg_quality", default_jpeg_quality() as u32)?
            .set_default("capture.timezone", default_timezone())?
            .set_default("capture.sidecar_metadata", default_sidecar_metadata())?
            .set_default("capture.timestamp_overlay", default_timestamp_overlay())?
            .set_default("capture.timestamp_font_path", default_timestamp_font_path())?
            .set_default(
                "capture.timestamp_font_size",
                default_timestamp_font_size() as f64,
            )?
            .set_default("capture.draw_detections", default_draw_detections())?
            .set_default("pir.enabled", default_pir_enabled())?
            .set_default("pir.device", default_pir_device())?
            .set_default("pir.active_low", default_pir_active_low())?
            .set_default(
                "pir.poll_interval_ms",
                default_pir_poll_interval_ms() as i64,
            )?
            .set_default("stats.enabled", default_stats_enabled())?
            .set_default(
                "stats.interval_seconds",
                default_stats_interval_seconds() as i64,
            )?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // SENTRYCAM__CAPTURE__INTERVAL_MS=500
            .add_source(
                Environment::with_prefix("SENTRYCAM")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("camera.indices")
                    .with_list_parse_key("detector.ignored_labels"),
            )
            .build()?;

        let config: SentryConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Render as TOML, the format read by [`load_from_file`](Self::load_from_file)
    pub fn to_toml(&self) -> crate::error::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node.name.trim().is_empty() {
            return Err(ConfigError::Message(
                "Node name must not be empty".to_string(),
            ));
        }

        if self.camera.indices.is_empty() {
            return Err(ConfigError::Message(
                "At least one camera index must be configured".to_string(),
            ));
        }

        if self.camera.resolution.0 == 0 || self.camera.resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Camera resolution must be greater than 0".to_string(),
            ));
        }

        if self.camera.fps == 0 {
            return Err(ConfigError::Message(
                "Camera fps must be greater than 0".to_string(),
            ));
        }

        if self.camera.acquire_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Camera acquire_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.detector.confidence_threshold) {
            return Err(ConfigError::Message(
                "Detector confidence_threshold must be within [0, 1]".to_string(),
            ));
        }

        if self.detector.kind == DetectorKind::Object
            && self.detector.object_model_path.is_none()
        {
            return Err(ConfigError::Message(
                "Detector object_model_path is required for the object detector".to_string(),
            ));
        }

        if self.detector.object_input_size == 0 {
            return Err(ConfigError::Message(
                "Detector object_input_size must be greater than 0".to_string(),
            ));
        }

        if self.detector.lores_scale == 0 {
            return Err(ConfigError::Message(
                "Detector lores_scale must be greater than 0".to_string(),
            ));
        }

        if self.capture.interval_ms == 0 {
            return Err(ConfigError::Message(
                "Capture interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.capture.jpeg_quality == 0 || self.capture.jpeg_quality > 100 {
            return Err(ConfigError::Message(
                "Capture jpeg_quality must be within 1..=100".to_string(),
            ));
        }

        if self.pir.enabled && self.pir.poll_interval_ms == 0 {
            return Err(ConfigError::Message(
                "PIR poll_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.stats.enabled && self.stats.interval_seconds == 0 {
            return Err(ConfigError::Message(
                "Stats interval_seconds must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for SentryConfig {
    fn default() -> Self {
        Self {
            node: NodeConfig {
                name: default_node_name(),
            },
            camera: CameraConfig {
                indices: default_camera_indices(),
                source: default_camera_source(),
                resolution: default_camera_resolution(),
                fps: default_camera_fps(),
                format: default_camera_format(),
                acquire_timeout_ms: default_acquire_timeout_ms(),
                replay_dir: default_replay_dir(),
                replay_loop: default_replay_loop(),
                rotation: None,
            },
            detector: DetectorConfig {
                kind: default_detector_kind(),
                confidence_threshold: default_confidence_threshold(),
                ignored_labels: Vec::new(),
                process_stream: default_process_stream(),
                lores_scale: default_lores_scale(),
                blur: default_blur(),
                histogram_min_diff: default_histogram_min_diff(),
                pixel_min_diff: default_pixel_min_diff(),
                adaptive_min_percent: default_adaptive_min_percent(),
                delta_threshold: default_delta_threshold(),
                contour_minimum_area: default_contour_area(),
                object_model_path: None,
                object_labels_path: None,
                object_input_size: default_object_input_size(),
            },
            capture: CaptureConfig {
                interval_ms: default_interval_ms(),
                burst_length: default_burst_length(),
                burst_policy: default_burst_policy(),
                burst_interval_ms: default_burst_interval_ms(),
                max_silence_seconds: default_max_silence_seconds(),
                output_dir: default_output_dir(),
                save_enabled: default_save_enabled(),
                jpeg_quality: default_jpeg_quality(),
                timezone: default_timezone(),
                sidecar_metadata: default_sidecar_metadata(),
                timestamp_overlay: default_timestamp_overlay(),
                timestamp_font_path: default_timestamp_font_path(),
                timestamp_font_size: default_timestamp_font_size(),
                draw_detections: default_draw_detections(),
            },
            pir: PirConfig {
                enabled: default_pir_enabled(),
                device: default_pir_device(),
                active_low: default_pir_active_low(),
                poll_interval_ms: default_pir_poll_interval_ms(),
            },
            stats: StatsConfig {
                enabled: default_stats_enabled(),
                interval_seconds: default_stats_interval_seconds(),
            },
        }
    }
}

/// Host name of the machine, if the platform reports one
#[cfg(unix)]
fn host_name() -> Option<String> {
    let mut buf = [0u8; 256];
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
    if rc != 0 {
        return None;
    }
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    let name = String::from_utf8_lossy(&buf[..end]).trim().to_string();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

#[cfg(not(unix))]
fn host_name() -> Option<String> {
    None
}

// Default value functions
fn default_node_name() -> String {
    host_name().unwrap_or_else(|| "sentry".to_string())
}

fn default_camera_indices() -> Vec<u32> {
    vec![0]
}
fn default_camera_source() -> CameraSourceKind {
    CameraSourceKind::Synthetic
}
fn default_camera_resolution() -> (u32, u32) {
    (1280, 720)
}
fn default_camera_fps() -> u32 {
    15
}
fn default_camera_format() -> String {
    "MJPG".to_string()
}
fn default_acquire_timeout_ms() -> u64 {
    2000
}
fn default_replay_dir() -> String {
    "./replay".to_string()
}
fn default_replay_loop() -> bool {
    false
}

fn default_detector_kind() -> DetectorKind {
    DetectorKind::Histogram
}
fn default_confidence_threshold() -> f32 {
    0.5
}
fn default_process_stream() -> ProcessStream {
    ProcessStream::Lores
}
fn default_lores_scale() -> u32 {
    4
}
fn default_blur() -> bool {
    true
}
fn default_histogram_min_diff() -> f64 {
    50.0
}
fn default_pixel_min_diff() -> f64 {
    30.0
}
fn default_adaptive_min_percent() -> f64 {
    1.0
}
fn default_object_input_size() -> u32 {
    300
}
fn default_delta_threshold() -> u8 {
    25
}
fn default_contour_area() -> f64 {
    500.0
}

fn default_interval_ms() -> u64 {
    1000
}
fn default_burst_length() -> u32 {
    3
}
fn default_burst_policy() -> BurstPolicy {
    BurstPolicy::Reset
}
fn default_burst_interval_ms() -> u64 {
    0
}
fn default_max_silence_seconds() -> u64 {
    3600
}
fn default_output_dir() -> String {
    "./captures".to_string()
}
fn default_save_enabled() -> bool {
    true
}
fn default_jpeg_quality() -> u8 {
    90
}
fn default_timezone() -> String {
    "UTC".to_string()
}
fn default_sidecar_metadata() -> bool {
    false
}
fn default_timestamp_overlay() -> bool {
    false
}
fn default_timestamp_font_path() -> String {
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf".to_string()
}
fn default_timestamp_font_size() -> f32 {
    24.0
}
fn default_draw_detections() -> bool {
    false
}

fn default_pir_enabled() -> bool {
    false
}
fn default_pir_device() -> String {
    "/sys/class/gpio/gpio17/value".to_string()
}
fn default_pir_active_low() -> bool {
    false
}
fn default_pir_poll_interval_ms() -> u64 {
    1000
}

fn default_stats_enabled() -> bool {
    true
}
fn default_stats_interval_seconds() -> u64 {
    300
}
