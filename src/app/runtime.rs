use super::{SentryOrchestrator, ShutdownReason};
use crate::error::{Result, SentryError};
use tokio::sync::mpsc;
use tracing::{error, info};

impl SentryOrchestrator {
    /// Block until a shutdown is requested, then shut down. Returns the
    /// process exit code.
    pub async fn run(&mut self) -> Result<i32> {
        info!("sentrycam is running");

        let mut shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| SentryError::system("Shutdown receiver already taken"))?;

        self.setup_signal_handlers(self.shutdown_sender.clone());

        let shutdown_reason = shutdown_receiver.recv().await.ok_or_else(|| {
            SentryError::system("Shutdown channel closed unexpectedly")
        })?;

        info!("Shutdown initiated: {:?}", shutdown_reason);

        let exit_code = self.shutdown().await?.max(shutdown_reason.exit_code());

        info!("sentrycam shutdown complete");
        Ok(exit_code)
    }

    fn setup_signal_handlers(&self, shutdown_sender: mpsc::Sender<ShutdownReason>) {
        // SIGTERM (systemd stop)
        #[cfg(unix)]
        {
            let sender = shutdown_sender.clone();
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                match signal(SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        if sigterm.recv().await.is_some() {
                            info!("Received SIGTERM signal");
                            let _ = sender.send(ShutdownReason::Signal("SIGTERM".to_string())).await;
                        }
                    }
                    Err(e) => error!("Failed to register SIGTERM handler: {}", e),
                }
            });
        }

        // SIGINT (Ctrl+C)
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                info!("Received SIGINT signal (Ctrl+C)");
                let _ = shutdown_sender
                    .send(ShutdownReason::Signal("SIGINT".to_string()))
                    .await;
            }
        });
    }
}
