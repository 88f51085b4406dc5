use super::keyboard_input::KeyboardInputHandler;
use super::{ComponentState, SentryOrchestrator};
use crate::burst::BurstController;
use crate::camera::CameraSessionBuilder;
use crate::capture_loop::{CaptureLoop, LoopSettings};
use crate::detector::build_detector;
use crate::error::{Result, SentryError};
use crate::sink::JpegImageSink;
use crate::telemetry::StatsWriter;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

impl SentryOrchestrator {
    /// Open every configured camera and assemble the capture loop.
    /// Any camera that cannot be configured aborts startup.
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Initializing sentrycam components");

        let mut states = self.component_states.lock().await;
        states.insert("presence".to_string(), ComponentState::Stopped);
        states.insert("capture".to_string(), ComponentState::Stopped);
        if self.config.stats.enabled {
            states.insert("stats".to_string(), ComponentState::Stopped);
        }
        if self.keyboard_enabled {
            states.insert("keyboard".to_string(), ComponentState::Stopped);
        }
        drop(states);

        let mut capture = CaptureLoop::new(
            LoopSettings::from_config(&self.config),
            Arc::clone(&self.presence),
            Box::new(JpegImageSink::from_config(&self.config.capture)),
            BurstController::from_config(&self.config.capture),
            Arc::clone(&self.telemetry),
        );

        for &camera_index in &self.config.camera.indices {
            let session = CameraSessionBuilder::new()
                .config(self.config.camera.clone())
                .build()
                .map_err(|e| {
                    error!("Failed to build camera {}: {}", camera_index, e);
                    e
                })?;
            let added = match build_detector(&self.config.detector, session) {
                Ok(detector) => capture.add_camera(camera_index, detector).await,
                Err(e) => Err(e),
            };
            if let Err(e) = added {
                error!("Failed to configure camera {}: {}", camera_index, e);
                // Cameras opened so far must not stay held
                capture.shutdown().await;
                self.set_component_state("capture", ComponentState::Failed)
                    .await;
                return Err(e.into());
            }
        }

        if self.keyboard_enabled {
            self.keyboard_handler = Some(KeyboardInputHandler::new(
                capture.manual_trigger(),
                self.shutdown_sender.clone(),
            ));
        }

        info!("{} camera(s) ready", capture.camera_count());
        self.capture_loop = Some(capture);
        Ok(())
    }

    /// Start the presence poller, the stats writer and the capture loop
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting sentrycam");

        let capture = self
            .capture_loop
            .take()
            .ok_or_else(|| SentryError::system("Capture loop not initialized"))?;

        self.set_component_state("presence", ComponentState::Starting)
            .await;
        self.presence.start();
        self.set_component_state("presence", ComponentState::Running)
            .await;

        if self.config.stats.enabled {
            self.set_component_state("stats", ComponentState::Starting)
                .await;
            let writer = StatsWriter::new(
                &self.config.capture.output_dir,
                Duration::from_secs(self.config.stats.interval_seconds),
                Arc::clone(&self.telemetry),
            );
            info!("Stats file: {}", writer.path().display());
            self.stats_task = Some(writer.spawn(self.cancellation_token.child_token()));
            self.set_component_state("stats", ComponentState::Running)
                .await;
        }

        if self.keyboard_enabled {
            if let Some(keyboard_handler) = &self.keyboard_handler {
                self.set_component_state("keyboard", ComponentState::Starting)
                    .await;
                keyboard_handler.start().await.map_err(|e| {
                    error!("Failed to start keyboard handler: {}", e);
                    e
                })?;
                self.set_component_state("keyboard", ComponentState::Running)
                    .await;
                info!("Keyboard input handler started - press SPACE to force a capture");
            }
        }

        self.set_component_state("capture", ComponentState::Starting)
            .await;
        let token = self.cancellation_token.child_token();
        self.capture_task = Some(tokio::spawn(async move {
            let mut capture = capture;
            capture.run(token).await;
            capture
        }));
        self.set_component_state("capture", ComponentState::Running)
            .await;

        info!("sentrycam started successfully");
        Ok(())
    }
}
