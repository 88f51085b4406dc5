use chrono::{DateTime, Utc};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::decision::{decide, SaveInputs};
use crate::burst::BurstController;
use crate::camera::CameraHandle;
use crate::config::{ProcessStream, SentryConfig};
use crate::detector::Detector;
use crate::error::{ConfigurationError, DetectionFault};
use crate::event::{CaptureEvent, Detection, SaveReason};
use crate::presence::PresenceMonitor;
use crate::sink::ImageSink;
use crate::telemetry::LoopTelemetry;

/// Loop parameters that do not change while running
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub node: String,
    pub process_stream: ProcessStream,
    pub lores_scale: u32,
    pub max_silence: Duration,
    pub save_enabled: bool,
}

impl LoopSettings {
    pub fn from_config(config: &SentryConfig) -> Self {
        Self {
            node: config.node.name.clone(),
            process_stream: config.detector.process_stream,
            lores_scale: config.detector.lores_scale,
            max_silence: config.capture.max_silence(),
            save_enabled: config.capture.save_enabled,
        }
    }
}

/// What happened to one camera during one tick
#[derive(Debug, Clone, PartialEq)]
pub enum CameraOutcome {
    /// No frame could be acquired
    Skipped { error: String },
    /// Frame analysed, nothing warranted a save
    NothingFound,
    /// Frame written
    Saved { path: PathBuf, reason: SaveReason },
    /// A save was warranted but saving is turned off
    SaveDisabled { reason: SaveReason },
    /// A save was attempted and failed
    SaveFailed { reason: SaveReason, error: String },
}

#[derive(Debug, Clone)]
pub struct CameraReport {
    pub camera_index: u32,
    pub outcome: CameraOutcome,
    /// Absent when the camera was skipped
    pub event: Option<CaptureEvent>,
}

#[derive(Debug, Clone)]
pub struct TickReport {
    pub capture_time: DateTime<Utc>,
    pub cameras: Vec<CameraReport>,
    /// Whether any camera saw an object or presence
    pub event_detected: bool,
    pub next_interval: Duration,
}

impl TickReport {
    pub fn camera(&self, camera_index: u32) -> Option<&CameraReport> {
        self.cameras.iter().find(|c| c.camera_index == camera_index)
    }
}

struct CameraSlot {
    index: u32,
    detector: Box<dyn Detector>,
    handle: CameraHandle,
    last_save: Instant,
}

/// The foreground control loop: acquire, detect, fuse, decide, persist, sleep
pub struct CaptureLoop {
    settings: LoopSettings,
    cameras: Vec<CameraSlot>,
    presence: Arc<PresenceMonitor>,
    sink: Box<dyn ImageSink>,
    burst: BurstController,
    telemetry: Arc<LoopTelemetry>,
    manual_trigger: Arc<AtomicBool>,
}

impl CaptureLoop {
    pub fn new(
        settings: LoopSettings,
        presence: Arc<PresenceMonitor>,
        sink: Box<dyn ImageSink>,
        burst: BurstController,
        telemetry: Arc<LoopTelemetry>,
    ) -> Self {
        Self {
            settings,
            cameras: Vec::new(),
            presence,
            sink,
            burst,
            telemetry,
            manual_trigger: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Configure `detector`'s camera and add it to the tick. Cameras are
    /// visited in ascending index order.
    pub async fn add_camera(
        &mut self,
        camera_index: u32,
        mut detector: Box<dyn Detector>,
    ) -> Result<(), ConfigurationError> {
        let handle = detector.configure_camera(camera_index).await?;
        info!(
            "Camera {} attached with {} detector",
            camera_index,
            detector.name()
        );
        self.cameras.push(CameraSlot {
            index: camera_index,
            detector,
            handle,
            last_save: Instant::now(),
        });
        self.cameras.sort_by_key(|slot| slot.index);
        Ok(())
    }

    pub fn camera_count(&self) -> usize {
        self.cameras.len()
    }

    /// Flag that forces a save on the next tick
    pub fn manual_trigger(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.manual_trigger)
    }

    pub fn telemetry(&self) -> Arc<LoopTelemetry> {
        Arc::clone(&self.telemetry)
    }

    /// One pass over every camera. Never fails; problems are reported per camera.
    pub async fn tick(&mut self) -> TickReport {
        let started = Instant::now();
        let capture_time = Utc::now();
        let manual = self.manual_trigger.swap(false, Ordering::AcqRel);
        if manual {
            info!("Manual capture requested");
        }

        let mut reports = Vec::with_capacity(self.cameras.len());
        let mut event_detected = false;
        let mut detections = 0usize;

        for slot in self.cameras.iter_mut() {
            let report = tick_camera(
                slot,
                self.sink.as_mut(),
                &self.settings,
                &self.telemetry,
                self.presence.state(),
                capture_time,
                manual,
            )
            .await;

            if let Some(event) = &report.event {
                event_detected |= event.object_detected() || event.presence();
                detections += event.detections().len();
            }
            reports.push(report);
        }

        let next_interval = self.burst.observe(event_detected);
        self.telemetry.record_tick(started.elapsed(), detections);

        debug!(
            "Tick at {} done in {:?}; event={} burst_remaining={} next in {:?}",
            capture_time,
            started.elapsed(),
            event_detected,
            self.burst.remaining_ticks(),
            next_interval
        );

        TickReport {
            capture_time,
            cameras: reports,
            event_detected,
            next_interval,
        }
    }

    /// Tick until `token` is cancelled. The inter-tick sleep is interruptible.
    pub async fn run(&mut self, token: CancellationToken) {
        info!(
            "Capture loop running for {} camera(s) on node {}",
            self.cameras.len(),
            self.settings.node
        );

        while !token.is_cancelled() {
            let report = self.tick().await;

            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(report.next_interval) => {}
            }
        }

        info!("Capture loop stopped");
    }

    /// Release every camera handle
    pub async fn shutdown(&mut self) {
        for slot in self.cameras.iter_mut() {
            slot.detector.release(slot.handle.clone()).await;
        }
        info!("Released {} camera(s)", self.cameras.len());
    }
}

async fn tick_camera(
    slot: &mut CameraSlot,
    sink: &mut dyn ImageSink,
    settings: &LoopSettings,
    telemetry: &LoopTelemetry,
    presence: Option<bool>,
    capture_time: DateTime<Utc>,
    manual: bool,
) -> CameraReport {
    let frame = match slot.detector.acquire_frame(&slot.handle).await {
        Ok(frame) => frame,
        Err(e) => {
            warn!(
                "Tick {}: camera {} skipped: {}",
                capture_time, slot.index, e
            );
            telemetry.record_skip();
            return CameraReport {
                camera_index: slot.index,
                outcome: CameraOutcome::Skipped {
                    error: e.to_string(),
                },
                event: None,
            };
        }
    };

    let detections = match run_detector(slot.detector.as_mut(), &frame, settings) {
        Ok(detections) => detections,
        Err(fault) => {
            warn!(
                "Tick {}: camera {} detection fault: {}",
                capture_time, slot.index, fault
            );
            telemetry.record_fault();
            Vec::new()
        }
    };

    let event = CaptureEvent::new(
        capture_time,
        settings.node.as_str(),
        slot.index,
        presence,
        slot.detector.name(),
        detections,
    );
    debug!("Camera {}: {}", slot.index, event.summary());

    let reason = decide(SaveInputs {
        object_detected: event.object_detected(),
        presence: event.presence(),
        manual,
        since_last_save: slot.last_save.elapsed(),
        max_silence: settings.max_silence,
    });

    let outcome = match reason {
        None => CameraOutcome::NothingFound,
        Some(reason) if !settings.save_enabled => {
            debug!("Camera {}: {} save suppressed, saving disabled", slot.index, reason);
            CameraOutcome::SaveDisabled { reason }
        }
        Some(reason) => {
            slot.last_save = Instant::now();
            let event = event.clone().with_save_reason(reason);
            match sink.save(&frame.main, event).await {
                Ok(path) => {
                    telemetry.record_save();
                    CameraOutcome::Saved { path, reason }
                }
                Err(e) => {
                    warn!(
                        "Tick {}: camera {} save failed: {}",
                        capture_time, slot.index, e
                    );
                    telemetry.record_save_failure();
                    CameraOutcome::SaveFailed {
                        reason,
                        error: e.to_string(),
                    }
                }
            }
        }
    };

    let event = match &outcome {
        CameraOutcome::Saved { reason, .. }
        | CameraOutcome::SaveDisabled { reason }
        | CameraOutcome::SaveFailed { reason, .. } => event.with_save_reason(*reason),
        _ => event,
    };

    CameraReport {
        camera_index: slot.index,
        outcome,
        event: Some(event),
    }
}

/// Run detection on the configured stream inside a panic boundary
fn run_detector(
    detector: &mut dyn Detector,
    frame: &crate::frame::Frame,
    settings: &LoopSettings,
) -> Result<Vec<Detection>, DetectionFault> {
    let input = frame.for_stream(settings.process_stream, settings.lores_scale)?;
    match catch_unwind(AssertUnwindSafe(|| detector.detect(&input))) {
        Ok(result) => result,
        Err(payload) => Err(DetectionFault::Panicked {
            detector: detector.name().to_string(),
            message: panic_message(payload.as_ref()),
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
