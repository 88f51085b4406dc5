use super::ShutdownReason;
use crate::error::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Operator keys for an attended node: SPACE forces a capture on the next
/// tick, `q` or ESC requests shutdown
pub struct KeyboardInputHandler {
    manual_trigger: Arc<AtomicBool>,
    shutdown_sender: mpsc::Sender<ShutdownReason>,
    cancellation_token: CancellationToken,
}

impl KeyboardInputHandler {
    pub fn new(
        manual_trigger: Arc<AtomicBool>,
        shutdown_sender: mpsc::Sender<ShutdownReason>,
    ) -> Self {
        Self {
            manual_trigger,
            shutdown_sender,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Start listening for keyboard input on a blocking thread
    pub async fn start(&self) -> Result<()> {
        info!("Starting keyboard input handler - press SPACE to force a capture");

        let manual_trigger = Arc::clone(&self.manual_trigger);
        let shutdown_sender = self.shutdown_sender.clone();
        let cancellation_token = self.cancellation_token.clone();

        task::spawn_blocking(move || {
            if let Err(e) = enable_raw_mode() {
                error!("Failed to enable raw mode for keyboard input: {}", e);
                return;
            }

            loop {
                if cancellation_token.is_cancelled() {
                    debug!("Keyboard input handler stopping");
                    break;
                }

                match event::poll(Duration::from_millis(100)) {
                    Ok(true) => {
                        let Ok(Event::Key(key_event)) = event::read() else {
                            continue;
                        };
                        if key_event.kind != KeyEventKind::Press {
                            continue;
                        }
                        match key_event.code {
                            KeyCode::Char(' ') => {
                                info!("Space bar pressed - forcing a capture");
                                manual_trigger.store(true, Ordering::Release);
                            }
                            KeyCode::Char('q') | KeyCode::Esc => {
                                info!("Quit key pressed - requesting shutdown");
                                if shutdown_sender
                                    .blocking_send(ShutdownReason::UserRequest)
                                    .is_err()
                                {
                                    warn!("Shutdown channel closed");
                                }
                                break;
                            }
                            other => debug!("Key pressed: {:?}", other),
                        }
                    }
                    Ok(false) => {}
                    Err(e) => warn!("Error polling for keyboard events: {}", e),
                }
            }

            if let Err(e) = disable_raw_mode() {
                error!("Failed to disable raw mode: {}", e);
            }
            debug!("Keyboard input handler task exited");
        });

        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        info!("Stopping keyboard input handler");
        self.cancellation_token.cancel();

        // Let the poll loop notice the token and restore the terminal
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = disable_raw_mode();

        Ok(())
    }
}
