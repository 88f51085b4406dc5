use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const THERMAL_PATHS: &[&str] = &[
    "/sys/class/thermal/thermal_zone0/temp",
    "/sys/class/hwmon/hwmon0/temp1_input",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct RunningAverage {
    count: u64,
    sum: f64,
}

impl RunningAverage {
    pub fn add(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

/// Point-in-time copy of the loop counters
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct TelemetrySnapshot {
    pub ticks: u64,
    pub skipped_acquisitions: u64,
    pub detection_faults: u64,
    pub saves: u64,
    pub save_failures: u64,
    pub avg_tick_ms: f64,
    pub avg_detections: f64,
}

#[derive(Debug, Default)]
struct Counters {
    ticks: u64,
    skipped_acquisitions: u64,
    detection_faults: u64,
    saves: u64,
    save_failures: u64,
    tick_ms: RunningAverage,
    detections: RunningAverage,
}

/// Counters written by the capture loop and read by the stats writer
#[derive(Debug, Default)]
pub struct LoopTelemetry {
    counters: Mutex<Counters>,
}

impl LoopTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_tick(&self, elapsed: Duration, detections: usize) {
        let mut c = self.counters.lock();
        c.ticks += 1;
        c.tick_ms.add(elapsed.as_secs_f64() * 1000.0);
        c.detections.add(detections as f64);
    }

    pub fn record_skip(&self) {
        self.counters.lock().skipped_acquisitions += 1;
    }

    pub fn record_fault(&self) {
        self.counters.lock().detection_faults += 1;
    }

    pub fn record_save(&self) {
        self.counters.lock().saves += 1;
    }

    pub fn record_save_failure(&self) {
        self.counters.lock().save_failures += 1;
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let c = self.counters.lock();
        TelemetrySnapshot {
            ticks: c.ticks,
            skipped_acquisitions: c.skipped_acquisitions,
            detection_faults: c.detection_faults,
            saves: c.saves,
            save_failures: c.save_failures,
            avg_tick_ms: c.tick_ms.mean(),
            avg_detections: c.detections.mean(),
        }
    }
}

/// CPU temperature in degrees Celsius, if a thermal sensor is readable
pub async fn read_cpu_temperature() -> Option<f64> {
    for path in THERMAL_PATHS {
        if let Ok(content) = tokio::fs::read_to_string(path).await {
            if let Ok(millidegrees) = content.trim().parse::<i64>() {
                return Some(millidegrees as f64 / 1000.0);
            }
        }
    }
    None
}

pub fn format_stats_line(
    now: DateTime<Utc>,
    cpu_temp: Option<f64>,
    snapshot: &TelemetrySnapshot,
) -> String {
    let temp = cpu_temp
        .map(|t| format!("{:.1}", t))
        .unwrap_or_else(|| "n/a".to_string());
    format!(
        "{} cpu_temp={} ticks={} skipped={} faults={} saves={} save_failures={} avg_tick_ms={:.1} avg_detections={:.2}",
        now.format("%Y-%m-%d %H:%M:%S"),
        temp,
        snapshot.ticks,
        snapshot.skipped_acquisitions,
        snapshot.detection_faults,
        snapshot.saves,
        snapshot.save_failures,
        snapshot.avg_tick_ms,
        snapshot.avg_detections,
    )
}

/// Periodically appends a line of loop statistics to a text file
pub struct StatsWriter {
    path: PathBuf,
    interval: Duration,
    telemetry: Arc<LoopTelemetry>,
}

impl StatsWriter {
    pub fn new<P: AsRef<Path>>(output_dir: P, interval: Duration, telemetry: Arc<LoopTelemetry>) -> Self {
        let name = format!("stats-{}.txt", Utc::now().format("%Y-%m-%d %H%M%S"));
        Self {
            path: output_dir.as_ref().join(name),
            interval,
            telemetry,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.flush().await
    }

    /// Write the header and one line now, then one line per interval until cancelled
    pub async fn run(self, token: CancellationToken) {
        info!("Writing stats to {} every {:?}", self.path.display(), self.interval);

        let header = format!("# sentrycam stats started {}", Utc::now().to_rfc3339());
        if let Err(e) = self.append(&header).await {
            warn!("Failed to create stats file {}: {}", self.path.display(), e);
        }

        let mut ticker = tokio::time::interval(self.interval.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let line = format_stats_line(
                        Utc::now(),
                        read_cpu_temperature().await,
                        &self.telemetry.snapshot(),
                    );
                    match self.append(&line).await {
                        Ok(()) => debug!("Stats: {}", line),
                        Err(e) => warn!("Failed to write stats line: {}", e),
                    }
                }
            }
        }

        debug!("Stats writer stopped");
    }

    pub fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(token))
    }
}
