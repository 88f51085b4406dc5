use super::*;
use crate::burst::BurstController;
use crate::config::{BurstPolicy, ProcessStream};
use crate::event::SaveReason;
use crate::presence::PresenceMonitor;
use crate::telemetry::LoopTelemetry;
use crate::testing::{
    person, DetectStep, RecordingSink, ScriptedDetector, ScriptedSensor, ScriptedSource,
    SourceStep, SCRIPTED_HEIGHT, SCRIPTED_WIDTH,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const NORMAL: Duration = Duration::from_millis(1000);

fn settings() -> LoopSettings {
    LoopSettings {
        node: "alpha".to_string(),
        process_stream: ProcessStream::Main,
        lores_scale: 4,
        max_silence: Duration::from_secs(3600),
        save_enabled: true,
    }
}

fn build_loop(
    settings: LoopSettings,
    presence: PresenceMonitor,
    sink: RecordingSink,
) -> CaptureLoop {
    CaptureLoop::new(
        settings,
        Arc::new(presence),
        Box::new(sink),
        BurstController::new(3, BurstPolicy::Reset, NORMAL, Duration::ZERO),
        Arc::new(LoopTelemetry::new()),
    )
}

#[tokio::test]
async fn test_object_detection_saves_with_object_flag() {
    let sink = RecordingSink::default();
    let mut capture = build_loop(settings(), PresenceMonitor::disabled(), sink.clone());
    let detector = ScriptedDetector::new(
        ScriptedSource::new(Vec::new()),
        vec![DetectStep::Found(vec![person()])],
    );
    capture.add_camera(0, Box::new(detector)).await.unwrap();

    let report = capture.tick().await;
    let camera = report.camera(0).unwrap();
    assert!(matches!(
        camera.outcome,
        CameraOutcome::Saved {
            reason: SaveReason::Object,
            ..
        }
    ));

    let saved = sink.events();
    assert_eq!(saved.len(), 1);
    assert!(saved[0].object_detected());
    assert_eq!(saved[0].detections()[0].label, "person");
    assert_eq!(saved[0].node_identity(), "alpha");
    assert_eq!(report.next_interval, Duration::ZERO);
}

#[tokio::test]
async fn test_quiet_tick_saves_nothing() {
    let sink = RecordingSink::default();
    let mut capture = build_loop(settings(), PresenceMonitor::disabled(), sink.clone());
    capture
        .add_camera(0, Box::new(ScriptedDetector::quiet()))
        .await
        .unwrap();

    let report = capture.tick().await;
    assert_eq!(report.cameras[0].outcome, CameraOutcome::NothingFound);
    let event = report.cameras[0].event.as_ref().unwrap();
    assert!(!event.object_detected());
    assert_eq!(event.presence_triggered(), None);
    assert!(!report.event_detected);
    assert_eq!(report.next_interval, NORMAL);
    assert!(sink.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_presence_alone_triggers_save() {
    let presence = PresenceMonitor::new(
        Box::new(ScriptedSensor::new(vec![Some(true)])),
        Duration::from_millis(100),
    );
    presence.start();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let sink = RecordingSink::default();
    let mut capture = build_loop(settings(), presence, sink.clone());
    capture
        .add_camera(0, Box::new(ScriptedDetector::quiet()))
        .await
        .unwrap();

    let report = capture.tick().await;
    assert!(matches!(
        report.cameras[0].outcome,
        CameraOutcome::Saved {
            reason: SaveReason::Presence,
            ..
        }
    ));
    let saved = sink.events();
    assert!(!saved[0].object_detected());
    assert_eq!(saved[0].presence_triggered(), Some(true));
    assert!(report.event_detected);
}

#[tokio::test(start_paused = true)]
async fn test_silence_fallback_saves_after_max_silence() {
    let mut loop_settings = settings();
    loop_settings.max_silence = Duration::from_secs(60);
    let sink = RecordingSink::default();
    let mut capture = build_loop(loop_settings, PresenceMonitor::disabled(), sink.clone());
    capture
        .add_camera(0, Box::new(ScriptedDetector::quiet()))
        .await
        .unwrap();

    assert_eq!(capture.tick().await.cameras[0].outcome, CameraOutcome::NothingFound);

    tokio::time::advance(Duration::from_secs(61)).await;
    let report = capture.tick().await;
    assert!(matches!(
        report.cameras[0].outcome,
        CameraOutcome::Saved {
            reason: SaveReason::Silence,
            ..
        }
    ));
    // Silence saves do not start a burst
    assert_eq!(report.next_interval, NORMAL);

    // The save reset the silence clock
    assert_eq!(capture.tick().await.cameras[0].outcome, CameraOutcome::NothingFound);
}

#[tokio::test]
async fn test_detector_failures_do_not_stop_later_ticks() {
    let sink = RecordingSink::default();
    let mut capture = build_loop(settings(), PresenceMonitor::disabled(), sink.clone());
    let detector = ScriptedDetector::new(
        ScriptedSource::new(Vec::new()),
        vec![
            DetectStep::Fail,
            DetectStep::Panic,
            DetectStep::Found(vec![person()]),
        ],
    );
    let calls = Arc::clone(&detector.calls);
    capture.add_camera(0, Box::new(detector)).await.unwrap();

    assert_eq!(capture.tick().await.cameras[0].outcome, CameraOutcome::NothingFound);
    assert_eq!(capture.tick().await.cameras[0].outcome, CameraOutcome::NothingFound);
    let third = capture.tick().await;
    assert!(matches!(third.cameras[0].outcome, CameraOutcome::Saved { .. }));

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(capture.telemetry().snapshot().detection_faults, 2);
}

#[tokio::test]
async fn test_acquisition_failure_skips_only_that_camera() {
    let sink = RecordingSink::default();
    let mut capture = build_loop(settings(), PresenceMonitor::disabled(), sink.clone());

    let failing = ScriptedDetector::new(ScriptedSource::new(vec![SourceStep::Fail]), Vec::new());
    let calls = Arc::clone(&failing.calls);
    let healthy = ScriptedDetector::new(
        ScriptedSource::new(Vec::new()),
        vec![DetectStep::Found(vec![person()])],
    );
    // Added out of order; ticks visit ascending indices
    capture.add_camera(1, Box::new(healthy)).await.unwrap();
    capture.add_camera(0, Box::new(failing)).await.unwrap();

    let report = capture.tick().await;
    assert_eq!(report.cameras[0].camera_index, 0);
    assert!(matches!(
        report.cameras[0].outcome,
        CameraOutcome::Skipped { .. }
    ));
    assert!(report.cameras[0].event.is_none());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    assert!(matches!(
        report.cameras[1].outcome,
        CameraOutcome::Saved { .. }
    ));
    assert_eq!(sink.events()[0].camera_index(), 1);
    assert_eq!(capture.telemetry().snapshot().skipped_acquisitions, 1);

    // Camera 0 recovers on the next tick
    let next = capture.tick().await;
    assert_eq!(next.cameras[0].outcome, CameraOutcome::NothingFound);
}

#[tokio::test]
async fn test_save_failure_is_reported_not_fatal() {
    let sink = RecordingSink::default();
    sink.fail.store(true, Ordering::SeqCst);
    let mut capture = build_loop(settings(), PresenceMonitor::disabled(), sink.clone());
    let detector = ScriptedDetector::new(
        ScriptedSource::new(Vec::new()),
        vec![DetectStep::Found(vec![person()])],
    );
    capture.add_camera(0, Box::new(detector)).await.unwrap();

    let report = capture.tick().await;
    assert!(matches!(
        report.cameras[0].outcome,
        CameraOutcome::SaveFailed {
            reason: SaveReason::Object,
            ..
        }
    ));
    assert_eq!(capture.telemetry().snapshot().save_failures, 1);
    // Burst still follows the detection
    assert_eq!(report.next_interval, Duration::ZERO);
}

#[tokio::test]
async fn test_save_disabled_suppresses_writes() {
    let mut loop_settings = settings();
    loop_settings.save_enabled = false;
    let sink = RecordingSink::default();
    let mut capture = build_loop(loop_settings, PresenceMonitor::disabled(), sink.clone());
    let detector = ScriptedDetector::new(
        ScriptedSource::new(Vec::new()),
        vec![DetectStep::Found(vec![person()])],
    );
    capture.add_camera(0, Box::new(detector)).await.unwrap();

    let report = capture.tick().await;
    assert_eq!(
        report.cameras[0].outcome,
        CameraOutcome::SaveDisabled {
            reason: SaveReason::Object
        }
    );
    assert!(sink.events().is_empty());
}

#[tokio::test]
async fn test_manual_trigger_forces_one_save() {
    let sink = RecordingSink::default();
    let mut capture = build_loop(settings(), PresenceMonitor::disabled(), sink.clone());
    capture
        .add_camera(0, Box::new(ScriptedDetector::quiet()))
        .await
        .unwrap();

    capture.manual_trigger().store(true, Ordering::SeqCst);
    let report = capture.tick().await;
    assert!(matches!(
        report.cameras[0].outcome,
        CameraOutcome::Saved {
            reason: SaveReason::Manual,
            ..
        }
    ));
    assert_eq!(capture.tick().await.cameras[0].outcome, CameraOutcome::NothingFound);
}

#[tokio::test]
async fn test_burst_interval_follows_detections() {
    let sink = RecordingSink::default();
    let mut capture = build_loop(settings(), PresenceMonitor::disabled(), sink.clone());
    let detector = ScriptedDetector::new(
        ScriptedSource::new(Vec::new()),
        vec![DetectStep::Found(vec![person()])],
    );
    capture.add_camera(0, Box::new(detector)).await.unwrap();

    let intervals: Vec<Duration> = {
        let mut out = Vec::new();
        for _ in 0..6 {
            out.push(capture.tick().await.next_interval);
        }
        out
    };
    let z = Duration::ZERO;
    assert_eq!(intervals, vec![z, z, z, z, NORMAL, NORMAL]);
}

#[tokio::test]
async fn test_lores_stream_feeds_detector() {
    let mut loop_settings = settings();
    loop_settings.process_stream = ProcessStream::Lores;
    let sink = RecordingSink::default();
    let mut capture = build_loop(loop_settings, PresenceMonitor::disabled(), sink.clone());
    let detector = ScriptedDetector::quiet();
    let sizes = detector.frame_sizes.clone();
    capture.add_camera(0, Box::new(detector)).await.unwrap();

    assert_eq!(capture.tick().await.cameras[0].outcome, CameraOutcome::NothingFound);
    assert_eq!(
        *sizes.lock(),
        vec![(SCRIPTED_WIDTH / 4, SCRIPTED_HEIGHT / 4)]
    );
}

#[tokio::test]
async fn test_main_stream_feeds_detector_full_size() {
    let sink = RecordingSink::default();
    let mut capture = build_loop(settings(), PresenceMonitor::disabled(), sink.clone());
    let detector = ScriptedDetector::quiet();
    let sizes = detector.frame_sizes.clone();
    capture.add_camera(0, Box::new(detector)).await.unwrap();

    capture.tick().await;
    assert_eq!(*sizes.lock(), vec![(SCRIPTED_WIDTH, SCRIPTED_HEIGHT)]);
}

#[tokio::test(start_paused = true)]
async fn test_run_stops_on_cancel() {
    let sink = RecordingSink::default();
    let mut capture = build_loop(settings(), PresenceMonitor::disabled(), sink.clone());
    capture
        .add_camera(0, Box::new(ScriptedDetector::quiet()))
        .await
        .unwrap();
    let telemetry = capture.telemetry();

    let token = CancellationToken::new();
    let cancel = token.clone();
    let handle = tokio::spawn(async move {
        capture.run(token).await;
        capture.shutdown().await;
    });

    tokio::time::sleep(Duration::from_millis(3500)).await;
    cancel.cancel();
    handle.await.unwrap();

    // Ticks at 0, 1s, 2s and 3s
    assert_eq!(telemetry.snapshot().ticks, 4);
}
