use super::*;
use crate::config::SentryConfig;
use crate::error::PresenceError;
use crate::testing::ScriptedSensor;
use tempfile::TempDir;

#[tokio::test]
async fn test_disabled_monitor_reports_nothing() {
    let config = SentryConfig::default().pir;
    assert!(!config.enabled);

    let monitor = PresenceMonitor::from_config(&config);
    monitor.start();
    assert!(!monitor.is_running());
    assert!(!monitor.current());
    assert_eq!(monitor.state(), None);
    monitor.stop();
}

#[tokio::test(start_paused = true)]
async fn test_poller_publishes_latest_reading() {
    let monitor = PresenceMonitor::new(
        Box::new(ScriptedSensor::new(vec![Some(false), Some(true)])),
        Duration::from_millis(100),
    );
    assert_eq!(monitor.state(), None);
    assert!(!monitor.current());

    monitor.start();
    assert!(monitor.is_running());

    // First poll happens immediately
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(monitor.state(), Some(false));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(monitor.state(), Some(true));
    assert!(monitor.current());

    monitor.stop();
}

#[tokio::test(start_paused = true)]
async fn test_read_errors_keep_previous_value() {
    let monitor = PresenceMonitor::new(
        Box::new(ScriptedSensor::new(vec![Some(true), None, None])),
        Duration::from_millis(50),
    );
    monitor.start();

    tokio::time::sleep(Duration::from_millis(130)).await;
    assert_eq!(monitor.state(), Some(true));
    monitor.stop();
}

#[tokio::test(start_paused = true)]
async fn test_stop_ends_poller() {
    let monitor = PresenceMonitor::new(
        Box::new(ScriptedSensor::new(vec![Some(true)])),
        Duration::from_millis(50),
    );
    monitor.start();
    tokio::time::sleep(Duration::from_millis(10)).await;

    monitor.stop();
    assert!(!monitor.is_running());
    // Last value remains readable after stop
    assert!(monitor.current());
}

#[tokio::test]
async fn test_sysfs_sensor_reads_value_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("value");

    std::fs::write(&path, "1\n").unwrap();
    let mut sensor = SysfsGpioSensor::new(&path, false);
    assert!(sensor.read().await.unwrap());

    let mut inverted = SysfsGpioSensor::new(&path, true);
    assert!(!inverted.read().await.unwrap());

    std::fs::write(&path, "x").unwrap();
    assert!(matches!(
        sensor.read().await,
        Err(PresenceError::InvalidValue { .. })
    ));

    let mut missing = SysfsGpioSensor::new(dir.path().join("nope"), false);
    assert!(matches!(
        missing.read().await,
        Err(PresenceError::Read { .. })
    ));
}
