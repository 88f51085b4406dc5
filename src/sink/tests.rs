use super::*;
use crate::error::PersistenceError;
use crate::event::{CaptureEvent, SaveReason};
use crate::testing::{gray_frame, person};
use chrono::{TimeZone, Utc};
use tempfile::TempDir;

fn event_at(presence: Option<bool>, detections: Vec<crate::event::Detection>) -> CaptureEvent {
    let t = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
        + chrono::Duration::milliseconds(42);
    CaptureEvent::new(t, "porch cam", 1, presence, "contour", detections)
}

#[test]
fn test_filename_flags_and_timestamp() {
    let object = event_at(Some(false), vec![person()]);
    assert_eq!(
        capture_filename(&object),
        "porch_cam-2024-03-09_14-05-07.042-c1-O-n.jpg"
    );

    let presence = event_at(Some(true), vec![]);
    assert!(capture_filename(&presence).ends_with("-c1-n-P.jpg"));

    let unknown = event_at(None, vec![]);
    assert!(capture_filename(&unknown).ends_with("-c1-n-n.jpg"));
}

#[test]
fn test_resolve_timezone_falls_back_to_utc() {
    assert_eq!(resolve_timezone("Europe/Berlin"), chrono_tz::Europe::Berlin);
    assert_eq!(resolve_timezone("Mars/Olympus"), chrono_tz::UTC);
}

#[test]
fn test_filenames_distinct_across_dst_fall_back() {
    // 05:30Z and 06:30Z are both 01:30 local in New York on this date
    let first = Utc.with_ymd_and_hms(2024, 11, 3, 5, 30, 0).unwrap();
    let second = Utc.with_ymd_and_hms(2024, 11, 3, 6, 30, 0).unwrap();
    let a = capture_filename(&CaptureEvent::new(first, "alpha", 0, None, "contour", vec![]));
    let b = capture_filename(&CaptureEvent::new(second, "alpha", 0, None, "contour", vec![]));

    assert_eq!(a, "alpha-2024-11-03_05-30-00.000-c0-n-n.jpg");
    assert_eq!(b, "alpha-2024-11-03_06-30-00.000-c0-n-n.jpg");
    assert!(a < b);
}

#[test]
fn test_filenames_sort_by_time() {
    let early = event_at(None, vec![]);
    let late = CaptureEvent::new(
        early.capture_time() + chrono::Duration::milliseconds(900),
        "porch cam",
        1,
        None,
        "contour",
        vec![],
    );
    assert!(capture_filename(&early) < capture_filename(&late));
}

#[test]
fn test_embed_and_extract_event() {
    let jpeg = gray_frame(16, 12, 80).encode_jpeg(80).unwrap();
    let event = event_at(Some(false), vec![person()]).with_save_reason(SaveReason::Object);

    let tagged = embed_event(&jpeg, &event).unwrap();
    assert_eq!(&tagged[..4], &[0xFF, 0xD8, 0xFF, 0xFE]);

    let parsed = extract_event(&tagged).unwrap().unwrap();
    assert_eq!(parsed.capture_time(), event.capture_time());
    assert_eq!(parsed.object_detected(), event.object_detected());
    assert_eq!(parsed.detections(), event.detections());

    // Still decodes as an image
    assert!(image::load_from_memory(&tagged).is_ok());
    assert!(extract_event(&jpeg).unwrap().is_none());
}

#[test]
fn test_embed_rejects_non_jpeg() {
    let event = event_at(None, vec![]);
    assert!(matches!(
        embed_event(b"not a jpeg", &event),
        Err(PersistenceError::Metadata { .. })
    ));
}

#[tokio::test]
async fn test_jpeg_sink_writes_file_with_metadata() {
    let dir = TempDir::new().unwrap();
    let mut sink = JpegImageSink::new(dir.path().join("out"), 85, resolve_timezone("UTC"))
        .with_sidecar(true)
        .with_detection_boxes(true);

    let event = event_at(Some(false), vec![person()]).with_save_reason(SaveReason::Object);
    let path = sink.save(&gray_frame(40, 30, 120), event.clone()).await.unwrap();

    assert!(path
        .file_name()
        .unwrap()
        .to_string_lossy()
        .ends_with("-c1-O-n.jpg"));
    let embedded = read_embedded_event(&path).await.unwrap().unwrap();
    assert_eq!(embedded, event);
    assert_eq!(embedded.save_reason(), Some(SaveReason::Object));

    let sidecar = std::fs::read_to_string(path.with_extension("json")).unwrap();
    assert!(sidecar.contains("\"person\""));
}

#[tokio::test]
async fn test_jpeg_sink_reports_write_failure() {
    let dir = TempDir::new().unwrap();
    // A regular file where the output directory should be
    let blocker = dir.path().join("blocked");
    std::fs::write(&blocker, "x").unwrap();

    let mut sink = JpegImageSink::new(&blocker, 85, resolve_timezone("UTC"));
    let result = sink.save(&gray_frame(8, 8, 0), event_at(None, vec![])).await;
    assert!(matches!(
        result,
        Err(PersistenceError::DirectoryCreation { .. })
    ));
}

#[test]
fn test_missing_font_reported() {
    assert!(TimestampFont::load("/nonexistent/font.ttf", 20.0).is_err());
}
