//! PIR presence sensing.
//!
//! A background task polls a [`PresenceSensor`] and stores the latest reading
//! in one atomic byte; the capture loop reads it without blocking.

mod sensor;
#[cfg(test)]
mod tests;

pub use sensor::{PresenceSensor, SysfsGpioSensor};

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PirConfig;

const UNKNOWN: u8 = 0;
const ABSENT: u8 = 1;
const PRESENT: u8 = 2;

fn decode(raw: u8) -> Option<bool> {
    match raw {
        PRESENT => Some(true),
        ABSENT => Some(false),
        _ => None,
    }
}

fn encode(present: bool) -> u8 {
    if present {
        PRESENT
    } else {
        ABSENT
    }
}

pub struct PresenceMonitor {
    state: Arc<AtomicU8>,
    poll_interval: Duration,
    sensor: Mutex<Option<Box<dyn PresenceSensor>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    token: CancellationToken,
}

impl PresenceMonitor {
    pub fn new(sensor: Box<dyn PresenceSensor>, poll_interval: Duration) -> Self {
        Self {
            state: Arc::new(AtomicU8::new(UNKNOWN)),
            poll_interval,
            sensor: Mutex::new(Some(sensor)),
            task: Mutex::new(None),
            token: CancellationToken::new(),
        }
    }

    /// Monitor that never starts a poller and always reports no presence
    pub fn disabled() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(UNKNOWN)),
            poll_interval: Duration::ZERO,
            sensor: Mutex::new(None),
            task: Mutex::new(None),
            token: CancellationToken::new(),
        }
    }

    pub fn from_config(config: &PirConfig) -> Self {
        if !config.enabled {
            return Self::disabled();
        }
        Self::new(
            Box::new(SysfsGpioSensor::new(&config.device, config.active_low)),
            config.poll_interval(),
        )
    }

    /// Spawn the poller. Does nothing when disabled or already started.
    pub fn start(&self) {
        let Some(mut sensor) = self.sensor.lock().take() else {
            debug!("Presence monitor has no sensor to poll");
            return;
        };

        info!(
            "Starting presence poller on {} every {:?}",
            sensor.name(),
            self.poll_interval
        );

        let state = Arc::clone(&self.state);
        let token = self.token.clone();
        let poll_interval = self.poll_interval.max(Duration::from_millis(1));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        match sensor.read().await {
                            Ok(present) => {
                                let previous = decode(state.swap(encode(present), Ordering::AcqRel));
                                if previous != Some(present) {
                                    debug!("Presence changed: {:?} -> {}", previous, present);
                                }
                            }
                            Err(e) => warn!("Presence read failed: {}", e),
                        }
                    }
                }
            }

            debug!("Presence poller stopped");
        });

        *self.task.lock() = Some(handle);
    }

    /// Latest reading; false until the first successful poll
    pub fn current(&self) -> bool {
        self.state() == Some(true)
    }

    /// Latest reading, `None` while unknown
    pub fn state(&self) -> Option<bool> {
        decode(self.state.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Signal the poller to exit. Returns immediately.
    pub fn stop(&self) {
        self.token.cancel();
        if self.task.lock().take().is_some() {
            info!("Presence poller stop requested");
        }
    }
}

impl Drop for PresenceMonitor {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
