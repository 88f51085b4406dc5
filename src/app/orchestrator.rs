use super::keyboard_input::KeyboardInputHandler;
use super::types::{ComponentState, ShutdownReason};
use crate::capture_loop::CaptureLoop;
use crate::config::SentryConfig;
use crate::error::Result;
use crate::presence::PresenceMonitor;
use crate::telemetry::LoopTelemetry;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Owns every long-lived piece of a running node and drives their lifecycle
pub struct SentryOrchestrator {
    pub(super) config: SentryConfig,
    pub(super) presence: Arc<PresenceMonitor>,
    pub(super) telemetry: Arc<LoopTelemetry>,

    // Components
    pub(super) capture_loop: Option<CaptureLoop>,
    pub(super) capture_task: Option<JoinHandle<CaptureLoop>>,
    pub(super) stats_task: Option<JoinHandle<()>>,
    pub(super) keyboard_handler: Option<KeyboardInputHandler>,
    pub(super) keyboard_enabled: bool,

    // Lifecycle management
    pub(super) component_states: Arc<Mutex<HashMap<String, ComponentState>>>,
    pub(super) shutdown_sender: mpsc::Sender<ShutdownReason>,
    pub(super) shutdown_receiver: Option<mpsc::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
}

impl SentryOrchestrator {
    /// Validate `config` and prepare the shared state. Cameras are opened by
    /// [`initialize`](Self::initialize).
    pub async fn new(config: SentryConfig) -> Result<Self> {
        config.validate()?;

        let presence = Arc::new(PresenceMonitor::from_config(&config.pir));
        let (shutdown_sender, shutdown_receiver) = mpsc::channel(4);

        info!(
            "Node '{}' with {} camera(s), {:?} detector",
            config.node.name,
            config.camera.indices.len(),
            config.detector.kind
        );

        Ok(Self {
            config,
            presence,
            telemetry: Arc::new(LoopTelemetry::new()),
            capture_loop: None,
            capture_task: None,
            stats_task: None,
            keyboard_handler: None,
            keyboard_enabled: false,
            component_states: Arc::new(Mutex::new(HashMap::new())),
            shutdown_sender,
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token: CancellationToken::new(),
        })
    }

    /// Enable or disable the keyboard input handler
    pub fn set_keyboard_enabled(&mut self, enabled: bool) {
        self.keyboard_enabled = enabled;
    }

    /// Sender that makes [`run`](Self::run) return with the given reason
    pub fn shutdown_handle(&self) -> mpsc::Sender<ShutdownReason> {
        self.shutdown_sender.clone()
    }

    pub fn telemetry(&self) -> Arc<LoopTelemetry> {
        Arc::clone(&self.telemetry)
    }

    pub fn config(&self) -> &SentryConfig {
        &self.config
    }
}
