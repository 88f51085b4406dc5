use super::{ComponentState, SentryOrchestrator};
use crate::error::{Result, SentryError};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, warn};

const CAPTURE_STOP_TIMEOUT: Duration = Duration::from_secs(10);
const STATS_STOP_TIMEOUT: Duration = Duration::from_secs(5);

impl SentryOrchestrator {
    /// Stop everything in reverse start order and release the cameras.
    /// Safe to call whether or not [`start`](Self::start) ran.
    pub async fn shutdown(&mut self) -> Result<i32> {
        info!("Beginning graceful shutdown");

        self.cancellation_token.cancel();
        let mut exit_code = 0;

        if let Some(keyboard_handler) = self.keyboard_handler.take() {
            self.set_component_state("keyboard", ComponentState::Stopping)
                .await;
            match keyboard_handler.stop().await {
                Ok(()) => {
                    self.set_component_state("keyboard", ComponentState::Stopped)
                        .await
                }
                Err(e) => {
                    error!("Error stopping keyboard: {}", e);
                    self.set_component_state("keyboard", ComponentState::Failed)
                        .await;
                    exit_code = 1;
                }
            }
        }

        if !self.stop_capture().await {
            exit_code = 1;
        }

        if let Some(task) = self.stats_task.take() {
            self.set_component_state("stats", ComponentState::Stopping)
                .await;
            match timeout(STATS_STOP_TIMEOUT, task).await {
                Ok(Ok(())) => {
                    self.set_component_state("stats", ComponentState::Stopped)
                        .await
                }
                Ok(Err(e)) => {
                    error!("Stats writer task failed: {}", e);
                    self.set_component_state("stats", ComponentState::Failed)
                        .await;
                    exit_code = 1;
                }
                Err(_) => {
                    warn!("Stats writer did not stop within {:?}", STATS_STOP_TIMEOUT);
                    self.set_component_state("stats", ComponentState::Failed)
                        .await;
                }
            }
        }

        self.set_component_state("presence", ComponentState::Stopping)
            .await;
        self.presence.stop();
        self.set_component_state("presence", ComponentState::Stopped)
            .await;

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }

    /// Wait for the loop to leave its tick, then release its cameras
    async fn stop_capture(&mut self) -> bool {
        info!("Stopping capture component");
        self.set_component_state("capture", ComponentState::Stopping)
            .await;

        let capture = match self.capture_task.take() {
            Some(task) => match timeout(CAPTURE_STOP_TIMEOUT, task).await {
                Ok(Ok(capture)) => Some(capture),
                Ok(Err(e)) => {
                    error!("Capture loop task failed: {}", e);
                    self.set_component_state("capture", ComponentState::Failed)
                        .await;
                    return false;
                }
                Err(_) => {
                    let err = SentryError::component(
                        "capture".to_string(),
                        format!("loop did not stop within {:?}", CAPTURE_STOP_TIMEOUT),
                    );
                    error!("{}", err);
                    self.set_component_state("capture", ComponentState::Failed)
                        .await;
                    return false;
                }
            },
            // Initialized but never started
            None => self.capture_loop.take(),
        };

        if let Some(mut capture) = capture {
            capture.shutdown().await;
        }
        self.set_component_state("capture", ComponentState::Stopped)
            .await;
        true
    }
}
